//! Presence and discovery over the shared known-peers registry.
//!
//! There is no signaling server: every client that ever completes a
//! handshake is remembered in the store's known-peers document, and a
//! freshly started client announces itself by dialing everyone on that
//! list. Dead entries cost a failed dial, nothing more.
//!
//! The source system never expired registry entries; this implementation
//! caps the registry at [`KNOWN_PEERS_CAP`] ids, evicting the oldest.

use tracing::debug;

use crate::error::BoardResult;
use crate::store::Store;
use crate::sync::transport::PeerTransport;

/// Maximum registry size; oldest entries are evicted beyond this.
pub const KNOWN_PEERS_CAP: usize = 256;

/// The known-peers registry, backed by the shared store.
#[derive(Clone)]
pub struct PeerDirectory {
    store: Store,
}

impl PeerDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// All remembered peer ids, oldest first.
    pub fn known_peers(&self) -> BoardResult<Vec<String>> {
        self.store.load_known_peers()
    }

    /// Remember a peer id (idempotent set-add).
    ///
    /// Returns `true` if the id was new. Evicts the oldest entries when the
    /// cap is exceeded.
    pub fn remember(&self, peer_id: &str) -> BoardResult<bool> {
        let mut peers = self.store.load_known_peers()?;
        if peers.iter().any(|p| p == peer_id) {
            return Ok(false);
        }
        peers.push(peer_id.to_string());
        while peers.len() > KNOWN_PEERS_CAP {
            let evicted = peers.remove(0);
            debug!(%evicted, "evicted oldest known peer");
        }
        self.store.save_known_peers(&peers)?;
        Ok(true)
    }

    /// Drop a peer id from the registry.
    pub fn forget(&self, peer_id: &str) -> BoardResult<bool> {
        let mut peers = self.store.load_known_peers()?;
        let before = peers.len();
        peers.retain(|p| p != peer_id);
        if peers.len() == before {
            return Ok(false);
        }
        self.store.save_known_peers(&peers)?;
        Ok(true)
    }

    /// The presence pass: dial every known peer except ourselves.
    ///
    /// Failed dials (stale ids, offline peers) are logged and skipped.
    /// Returns how many connections were opened.
    pub fn connect_known(&self, transport: &PeerTransport) -> usize {
        let peers = match self.known_peers() {
            Ok(peers) => peers,
            Err(e) => {
                debug!(error = %e, "could not load known peers");
                return 0;
            }
        };

        let mut opened = 0;
        for peer in peers {
            if peer == transport.peer_id() {
                continue;
            }
            match transport.connect(&peer) {
                Ok(true) => opened += 1,
                Ok(false) => {}
                Err(e) => debug!(%peer, error = %e, "could not reach known peer"),
            }
        }
        opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::hub::PeerHub;
    use tempfile::TempDir;

    fn test_directory() -> (PeerDirectory, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("test.redb")).unwrap();
        (PeerDirectory::new(store), temp_dir)
    }

    #[test]
    fn test_remember_is_idempotent() {
        let (directory, _temp) = test_directory();

        assert!(directory.remember("u1").unwrap());
        assert!(!directory.remember("u1").unwrap());
        assert_eq!(directory.known_peers().unwrap(), vec!["u1"]);
    }

    #[test]
    fn test_forget() {
        let (directory, _temp) = test_directory();

        directory.remember("u1").unwrap();
        assert!(directory.forget("u1").unwrap());
        assert!(!directory.forget("u1").unwrap());
        assert!(directory.known_peers().unwrap().is_empty());
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let (directory, _temp) = test_directory();

        for i in 0..KNOWN_PEERS_CAP + 3 {
            directory.remember(&format!("peer_{}", i)).unwrap();
        }

        let peers = directory.known_peers().unwrap();
        assert_eq!(peers.len(), KNOWN_PEERS_CAP);
        // The first three registrations were evicted
        assert_eq!(peers[0], "peer_3");
        assert_eq!(peers.last().unwrap(), &format!("peer_{}", KNOWN_PEERS_CAP + 2));
    }

    #[tokio::test]
    async fn test_connect_known_skips_self_and_stale_ids() {
        let (directory, _temp) = test_directory();
        let hub = PeerHub::new();

        let (transport, _events) = PeerTransport::bind("u1", hub.clone()).unwrap();
        let (_other, _other_events) = PeerTransport::bind("u2", hub.clone()).unwrap();

        directory.remember("u1").unwrap(); // ourselves
        directory.remember("u2").unwrap(); // reachable
        directory.remember("ghost").unwrap(); // stale, never registered

        let opened = directory.connect_known(&transport);
        assert_eq!(opened, 1);
        assert!(transport.is_connected("u2"));
        assert!(!transport.is_connected("ghost"));
    }
}
