//! Peer transport: owns the live connection set of one client.
//!
//! Connections are keyed by peer id, at most one per id. Lifecycle is
//! `Connecting -> Open -> Closed`; an error on any transition is logged and
//! the connection is treated as closed for bookkeeping - there is no
//! retry or backoff here. Reconnection only ever happens through the
//! discovery layer's presence pass over the known-peers registry.
//!
//! The transport is deliberately dumb about message content: it moves
//! opaque frames and reports lifecycle changes on its event channel. The
//! engine decodes frames and dispatches on the wire tag.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{BoardError, BoardResult};
use crate::sync::hub::PeerHub;

/// Connection lifecycle state.
///
/// With the in-process hub the rendezvous completes synchronously, so
/// `Connecting` only exists during [`PeerTransport::connect`] itself;
/// observers will see `Open` or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Which side initiated a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Lifecycle and data events reported by the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection completed its handshake and joined the live set
    Opened { peer_id: String, direction: Direction },
    /// A frame arrived from a peer
    Frame { peer_id: String, payload: Vec<u8> },
    /// A connection left the live set (close or error; not distinguished)
    Closed { peer_id: String },
}

struct Connection {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    state: ConnectionState,
}

/// The live connection set of one client.
#[derive(Clone)]
pub struct PeerTransport {
    peer_id: String,
    hub: PeerHub,
    connections: Arc<Mutex<HashMap<String, Connection>>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl PeerTransport {
    /// Register with the hub under `peer_id` and start accepting inbound
    /// connections.
    ///
    /// Returns the transport and its event stream. Must be called within a
    /// tokio runtime (the accept loop is a spawned task).
    pub fn bind(
        peer_id: impl Into<String>,
        hub: PeerHub,
    ) -> BoardResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let peer_id = peer_id.into();
        let accept_rx = hub.register(&peer_id)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let transport = Self {
            peer_id,
            hub,
            connections: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        };

        transport.spawn_accept_loop(accept_rx);
        Ok((transport, event_rx))
    }

    /// Our own peer id.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn spawn_accept_loop(&self, mut accept_rx: mpsc::UnboundedReceiver<super::hub::InboundConnection>) {
        let transport = self.clone();
        tokio::spawn(async move {
            while let Some(inbound) = accept_rx.recv().await {
                transport.install(inbound.from, inbound.tx, inbound.rx, Direction::Inbound);
            }
            debug!(peer_id = %transport.peer_id, "accept loop ended");
        });
    }

    /// Register a freshly opened channel pair as a live connection and
    /// start its receive loop.
    fn install(
        &self,
        remote: String,
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        direction: Direction,
    ) {
        {
            let mut connections = self.connections.lock();
            if connections.contains_key(&remote) {
                // At most one connection per peer id; drop the duplicate
                debug!(%remote, "duplicate connection dropped");
                return;
            }
            connections.insert(
                remote.clone(),
                Connection {
                    tx,
                    state: ConnectionState::Open,
                },
            );
        }

        debug!(local = %self.peer_id, %remote, ?direction, "connection open");
        let _ = self.event_tx.send(TransportEvent::Opened {
            peer_id: remote.clone(),
            direction,
        });
        self.spawn_recv_loop(remote, rx);
    }

    fn spawn_recv_loop(&self, remote: String, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        let transport = self.clone();
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let _ = transport.event_tx.send(TransportEvent::Frame {
                    peer_id: remote.clone(),
                    payload,
                });
            }
            // Channel closed by the remote side (or by our disconnect)
            transport.retire(&remote);
        });
    }

    /// Remove a connection from the live set, emitting `Closed` once.
    fn retire(&self, remote: &str) {
        let removed = self.connections.lock().remove(remote).is_some();
        if removed {
            debug!(local = %self.peer_id, %remote, "connection closed");
            let _ = self.event_tx.send(TransportEvent::Closed {
                peer_id: remote.to_string(),
            });
        }
    }

    /// Open an outbound connection to `remote`.
    ///
    /// Returns `Ok(false)` without connecting if `remote` is ourselves or
    /// already connected.
    pub fn connect(&self, remote: &str) -> BoardResult<bool> {
        if remote == self.peer_id {
            return Ok(false);
        }
        if self.is_connected(remote) {
            return Ok(false);
        }

        let (tx, rx) = self.hub.connect(&self.peer_id, remote)?;
        self.install(remote.to_string(), tx, rx, Direction::Outbound);
        Ok(true)
    }

    /// Send a frame to one peer.
    ///
    /// A send to a dead channel retires the connection and reports a
    /// transport error; the caller decides whether that matters.
    pub fn send_to(&self, remote: &str, payload: Vec<u8>) -> BoardResult<()> {
        let tx = self
            .connections
            .lock()
            .get(remote)
            .map(|c| c.tx.clone())
            .ok_or_else(|| BoardError::Transport(format!("not connected to {}", remote)))?;

        if tx.send(payload).is_err() {
            warn!(%remote, "send to closed connection");
            self.retire(remote);
            return Err(BoardError::Transport(format!("connection closed: {}", remote)));
        }
        Ok(())
    }

    /// Send a frame to every open connection.
    ///
    /// Failures are logged and skipped, never retried. Returns how many
    /// peers the frame was handed to.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        let peers = self.connected_peers();
        let mut delivered = 0;
        for peer in peers {
            match self.send_to(&peer, payload.to_vec()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(%peer, error = %e, "broadcast delivery failed"),
            }
        }
        delivered
    }

    /// Peer ids with open connections.
    pub fn connected_peers(&self) -> Vec<String> {
        self.connections.lock().keys().cloned().collect()
    }

    pub fn is_connected(&self, remote: &str) -> bool {
        self.connections.lock().contains_key(remote)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Connection state for a peer (`Closed` when absent).
    pub fn state(&self, remote: &str) -> ConnectionState {
        self.connections
            .lock()
            .get(remote)
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Close the connection to one peer. The remote side observes the
    /// channel close and retires its end.
    pub fn disconnect(&self, remote: &str) -> bool {
        let removed = self.connections.lock().remove(remote).is_some();
        if removed {
            let _ = self.event_tx.send(TransportEvent::Closed {
                peer_id: remote.to_string(),
            });
        }
        removed
    }

    /// Leave the hub and drop every connection.
    pub fn shutdown(&self) {
        self.hub.unregister(&self.peer_id);
        let peers: Vec<String> = self.connections.lock().keys().cloned().collect();
        for peer in peers {
            self.disconnect(&peer);
        }
    }
}
