//! Persistent key/value store using redb.
//!
//! This is the durability substrate for every entity in the system:
//! comments, posts, notifications, the known-peers registry, and the
//! persisted login. Documents are JSON blobs under well-known string keys
//! (see [`keys`]), matching the layout the browser clients keep in local
//! storage.
//!
//! Every write notifies subscribers via a broadcast channel. Engines that
//! share a `Store` clone (the "other tab" case) rely on this channel to
//! observe each other's writes without a peer connection - it is
//! load-bearing for sync, not a convenience.
//!
//! A malformed stored document is never a hard failure: reads log the
//! problem and fall back to the empty default.

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::BoardResult;
use crate::merge::CommentMap;
use crate::types::{Notification, Post, UserInfo};

/// Single table mapping document keys to JSON bytes
const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Capacity of the change-notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Well-known document keys.
pub mod keys {
    /// Root comment aggregate: `{contentType: {contentId: [Comment]}}`
    pub const GLOBAL_COMMENTS: &str = "global_comments";
    /// Peer registry: `[peer_id]`
    pub const KNOWN_PEERS: &str = "known_peers";
    /// Admin/studio posts: `[Post]`
    pub const ALL_POSTS: &str = "all_posts";
    /// Posts created from the user dashboard: `[Post]`
    pub const USER_POSTS: &str = "user_posts";
    /// Persisted login: `UserInfo`
    pub const USER_DATA: &str = "user_data";
    /// Notifications shown on the admin dashboard: `[Notification]`
    pub const ADMIN_NOTIFICATIONS: &str = "admin_notifications";
    /// Notifications broadcast to every user: `[Notification]`
    pub const GLOBAL_NOTIFICATIONS: &str = "global_notifications";

    /// Per-user notification list key.
    pub fn user_notifications(user_id: &str) -> String {
        format!("notifications_{}", user_id)
    }
}

/// Change notification emitted after every write.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// The document key that was written (or removed)
    pub key: String,
}

/// Persistent store shared by all components of one client (and, in tests,
/// by several engines playing the role of browser tabs).
#[derive(Clone)]
pub struct Store {
    db: Arc<RwLock<Database>>,
    change_tx: broadcast::Sender<StoreEvent>,
}

impl Store {
    /// Create (or open) a store at the given path.
    ///
    /// Creates parent directories as needed and initializes the documents
    /// table.
    pub fn new(path: impl AsRef<Path>) -> BoardResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DOCUMENTS_TABLE)?;
        }
        write_txn.commit()?;

        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            change_tx,
        })
    }

    /// Subscribe to change notifications.
    ///
    /// Fires for every write made through any clone of this store,
    /// including the subscriber's own writes (re-merging own data is
    /// idempotent, so callers need not filter).
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.change_tx.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Generic Document Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Read a JSON document by key.
    ///
    /// Returns `None` if the key is absent. A document that fails to
    /// deserialize is logged and also treated as absent - corruption never
    /// propagates to the caller as a hard failure.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> BoardResult<Option<T>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS_TABLE)?;

        match table.get(key)? {
            Some(v) => match serde_json::from_slice(v.value()) {
                Ok(doc) => Ok(Some(doc)),
                Err(e) => {
                    warn!(%key, error = %e, "discarding malformed stored document");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Write a JSON document under the given key, overwriting any previous
    /// value, and notify subscribers.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> BoardResult<()> {
        let data = serde_json::to_vec(value)
            .map_err(|e| crate::error::BoardError::Serialization(e.to_string()))?;

        {
            let db = self.db.read();
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(DOCUMENTS_TABLE)?;
                table.insert(key, data.as_slice())?;
            }
            write_txn.commit()?;
        }

        debug!(%key, bytes = data.len(), "document written");
        let _ = self.change_tx.send(StoreEvent { key: key.to_string() });
        Ok(())
    }

    /// Remove a document. Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) -> BoardResult<bool> {
        let removed = {
            let db = self.db.read();
            let write_txn = db.begin_write()?;
            let removed = {
                let mut table = write_txn.open_table(DOCUMENTS_TABLE)?;
                let was_present = table.remove(key)?.is_some();
                was_present
            };
            write_txn.commit()?;
            removed
        };

        if removed {
            let _ = self.change_tx.send(StoreEvent { key: key.to_string() });
        }
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Typed Helpers for the Well-Known Documents
    // ═══════════════════════════════════════════════════════════════════════

    /// Load the root comment aggregate; empty map if absent or corrupt.
    pub fn load_comments(&self) -> BoardResult<CommentMap> {
        Ok(self.read(keys::GLOBAL_COMMENTS)?.unwrap_or_default())
    }

    pub fn save_comments(&self, comments: &CommentMap) -> BoardResult<()> {
        self.write(keys::GLOBAL_COMMENTS, comments)
    }

    /// Load the known-peers registry; empty if absent.
    pub fn load_known_peers(&self) -> BoardResult<Vec<String>> {
        Ok(self.read(keys::KNOWN_PEERS)?.unwrap_or_default())
    }

    pub fn save_known_peers(&self, peers: &[String]) -> BoardResult<()> {
        self.write(keys::KNOWN_PEERS, &peers)
    }

    /// Load a post collection (`all_posts` or `user_posts`); empty if absent.
    pub fn load_posts(&self, key: &str) -> BoardResult<Vec<Post>> {
        Ok(self.read(key)?.unwrap_or_default())
    }

    pub fn save_posts(&self, key: &str, posts: &[Post]) -> BoardResult<()> {
        self.write(key, &posts)
    }

    /// Load a notification list; empty if absent.
    pub fn load_notifications(&self, key: &str) -> BoardResult<Vec<Notification>> {
        Ok(self.read(key)?.unwrap_or_default())
    }

    pub fn save_notifications(&self, key: &str, notifications: &[Notification]) -> BoardResult<()> {
        self.write(key, &notifications)
    }

    /// Load the persisted login, if any.
    pub fn load_user(&self) -> BoardResult<Option<UserInfo>> {
        self.read(keys::USER_DATA)
    }

    pub fn save_user(&self, user: &UserInfo) -> BoardResult<()> {
        self.write(keys::USER_DATA, user)
    }

    pub fn clear_user(&self) -> BoardResult<bool> {
        self.remove(keys::USER_DATA)
    }
}
