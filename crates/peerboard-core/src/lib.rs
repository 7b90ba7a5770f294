//! Peerboard Core Library
//!
//! Local-first social board (comments, replies, likes, posts,
//! notifications) with best-effort peer-to-peer sync.
//!
//! ## Overview
//!
//! Peerboard keeps every entity in a client-side store and replicates
//! comment and post state to peers through a gossip-style protocol:
//! targeted messages pushed on every mutation, full-document exchanges for
//! newcomers, and an id-keyed first-write-wins merge that makes every
//! delivery path idempotent. There is no server-authoritative copy and no
//! delivery guarantee; clients converge on a best-effort basis.
//!
//! ## Core Principles
//!
//! - **Local-first**: every read and write works offline; sync is overlay
//! - **Id-keyed merge**: first write wins, duplicates are discarded
//! - **Path-independent**: push, pull, and store subscription all funnel
//!   through the same merge functions
//!
//! ## Quick Start
//!
//! ```ignore
//! use peerboard_core::{BoardEngine, PeerHub, UserInfo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = PeerHub::new();
//!     let engine = BoardEngine::open("~/.peerboard/data", hub)?;
//!
//!     engine.login(UserInfo::new("u1", "booms", "avatar.png"))?;
//!     engine.start();
//!
//!     engine.post_comment("songs", "42", "great track!")?;
//!     for comment in engine.comments_for("songs", "42") {
//!         println!("{}: {}", comment.username, comment.text);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod merge;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use engine::{BoardEngine, PULL_INTERVAL};
pub use error::{BoardError, BoardResult};
pub use merge::CommentMap;
pub use session::Session;
pub use store::{keys, Store, StoreEvent};
pub use sync::{
    BoardEvent, ConnectionState, Direction, PeerDirectory, PeerHub, PeerMessage, PeerTransport,
    SyncStatus, TransportEvent, KNOWN_PEERS_CAP,
};
pub use types::{
    Comment, Notification, NotificationKind, Post, PostKind, Reply, UserInfo,
};
