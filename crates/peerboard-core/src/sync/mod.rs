//! Peer-to-peer synchronization layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  PeerHub (in-process rendezvous, one per mesh)                  │
//! │  └── brokers duplex channel pairs between registered peer ids  │
//! │                                                                 │
//! │  PeerTransport (one per client)                                 │
//! │  ├── live connection set, keyed by peer id                     │
//! │  ├── accept loop + per-connection receive loops                │
//! │  └── TransportEvent stream (Opened / Frame / Closed)           │
//! │                                                                 │
//! │  PeerDirectory (known-peers registry in the store)             │
//! │  └── presence pass: dial everyone we have ever seen            │
//! │                                                                 │
//! │  PeerMessage (JSON wire union, dispatched on the `type` tag)   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine (`crate::engine`) ties these together: it decodes frames,
//! dispatches messages into the merge engine, and pushes local mutations
//! back out through the transport.

pub mod discovery;
pub mod events;
pub mod hub;
pub mod protocol;
pub mod transport;

pub use discovery::{PeerDirectory, KNOWN_PEERS_CAP};
pub use events::{BoardEvent, SyncStatus};
pub use hub::{InboundConnection, PeerHub};
pub use protocol::PeerMessage;
pub use transport::{ConnectionState, Direction, PeerTransport, TransportEvent};
