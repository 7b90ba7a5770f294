//! In-process peer rendezvous.
//!
//! The browser clients rely on a public broker to map peer ids to data
//! channels, and on the shared store for discovery - every peer in a mesh
//! effectively lives on one machine. The hub plays the broker's role for a
//! process: transports register under their peer id, and `connect` brokers
//! a pair of duplex byte channels between two registered peers.
//!
//! Dropping either half of a brokered channel closes the connection; the
//! remote receive loop observes the close and retires the connection. There
//! is no retry or backoff at this layer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{BoardError, BoardResult};

/// An inbound connection delivered to a registered peer's accept queue.
pub struct InboundConnection {
    /// Peer id of the initiator
    pub from: String,
    /// Channel for sending frames back to the initiator
    pub tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Channel of frames arriving from the initiator
    pub rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Rendezvous hub shared by every transport in one process.
#[derive(Clone, Default)]
pub struct PeerHub {
    peers: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<InboundConnection>>>>,
}

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer id and return its accept queue.
    ///
    /// Fails if the id is already taken - at most one live transport per
    /// peer id, the same constraint the public broker enforces.
    pub fn register(&self, peer_id: &str) -> BoardResult<mpsc::UnboundedReceiver<InboundConnection>> {
        let mut peers = self.peers.lock();
        if peers.contains_key(peer_id) {
            return Err(BoardError::Transport(format!(
                "peer id already registered: {}",
                peer_id
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        peers.insert(peer_id.to_string(), tx);
        debug!(%peer_id, "peer registered with hub");
        Ok(rx)
    }

    /// Remove a peer id. Pending connections to it will fail from now on.
    pub fn unregister(&self, peer_id: &str) {
        if self.peers.lock().remove(peer_id).is_some() {
            debug!(%peer_id, "peer unregistered from hub");
        }
    }

    /// Broker a duplex channel pair from `from` to `to`.
    ///
    /// Returns the initiator's halves; the acceptor's halves are delivered
    /// to its accept queue.
    pub fn connect(
        &self,
        from: &str,
        to: &str,
    ) -> BoardResult<(mpsc::UnboundedSender<Vec<u8>>, mpsc::UnboundedReceiver<Vec<u8>>)> {
        let accept_tx = self
            .peers
            .lock()
            .get(to)
            .cloned()
            .ok_or_else(|| BoardError::PeerNotFound(to.to_string()))?;

        // initiator -> acceptor
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        // acceptor -> initiator
        let (back_tx, back_rx) = mpsc::unbounded_channel();

        accept_tx
            .send(InboundConnection {
                from: from.to_string(),
                tx: back_tx,
                rx: out_rx,
            })
            .map_err(|_| BoardError::Transport(format!("peer is gone: {}", to)))?;

        Ok((out_tx, back_rx))
    }

    /// Whether a peer id is currently registered.
    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.lock().contains_key(peer_id)
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_contains() {
        let hub = PeerHub::new();
        let _rx = hub.register("u1").unwrap();
        assert!(hub.contains("u1"));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let hub = PeerHub::new();
        let _rx = hub.register("u1").unwrap();
        assert!(hub.register("u1").is_err());
    }

    #[test]
    fn test_unregister() {
        let hub = PeerHub::new();
        let _rx = hub.register("u1").unwrap();
        hub.unregister("u1");
        assert!(!hub.contains("u1"));
        // Re-registration is allowed after unregister
        assert!(hub.register("u1").is_ok());
    }

    #[test]
    fn test_connect_unknown_peer_fails() {
        let hub = PeerHub::new();
        let _rx = hub.register("u1").unwrap();
        let result = hub.connect("u1", "nobody");
        assert!(matches!(result, Err(BoardError::PeerNotFound(_))));
    }

    #[tokio::test]
    async fn test_connect_delivers_duplex_pair() {
        let hub = PeerHub::new();
        let mut accept_rx = hub.register("u1").unwrap();
        let _visitor_rx = hub.register("visitor_abc123def").unwrap();

        let (tx, mut rx) = hub.connect("visitor_abc123def", "u1").unwrap();

        // The acceptor sees who called
        let inbound = accept_rx.recv().await.unwrap();
        assert_eq!(inbound.from, "visitor_abc123def");

        // Frames flow both ways
        tx.send(b"hello".to_vec()).unwrap();
        let mut inbound_rx = inbound.rx;
        assert_eq!(inbound_rx.recv().await.unwrap(), b"hello");

        inbound.tx.send(b"welcome".to_vec()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"welcome");
    }

    #[tokio::test]
    async fn test_dropped_half_closes_connection() {
        let hub = PeerHub::new();
        let mut accept_rx = hub.register("u1").unwrap();
        let _visitor_rx = hub.register("visitor_abc123def").unwrap();

        let (tx, _rx) = hub.connect("visitor_abc123def", "u1").unwrap();
        let inbound = accept_rx.recv().await.unwrap();

        drop(tx);
        let mut inbound_rx = inbound.rx;
        assert!(inbound_rx.recv().await.is_none());
    }
}
