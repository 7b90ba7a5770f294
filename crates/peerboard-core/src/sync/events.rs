//! Event and status types for the sync layer.
//!
//! The event stream replaces the browser clients' direct re-render calls:
//! after every local or remote mutation the engine emits an event naming
//! what changed, and the presentation layer redraws from the read APIs.

use std::fmt;

use crate::types::UserInfo;

/// Connection status of a client, for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// No peer connections
    #[default]
    Idle,
    /// Connected to at least one peer
    Connected {
        /// Number of open connections
        peer_count: usize,
    },
    /// Sync encountered an error
    Error(String),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "Idle"),
            SyncStatus::Connected { peer_count } => write!(f, "Connected ({} peers)", peer_count),
            SyncStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Events emitted by the engine for the presentation layer.
#[derive(Debug, Clone)]
pub enum BoardEvent {
    /// A comment bucket changed (create/like/reply/delete, local or remote)
    BucketChanged {
        content_type: String,
        content_id: String,
    },
    /// The posts collections changed
    PostsChanged,
    /// A notification list changed
    NotificationsChanged,
    /// A peer connection opened
    PeerConnected { peer_id: String },
    /// A peer connection closed
    PeerDisconnected { peer_id: String },
    /// A peer announced its identity via `user_info`
    UserSeen { user: UserInfo },
    /// A recoverable sync error occurred (already logged; informational)
    SyncError { message: String },
}

impl BoardEvent {
    /// The bucket this event concerns, if any.
    pub fn bucket(&self) -> Option<(&str, &str)> {
        match self {
            BoardEvent::BucketChanged {
                content_type,
                content_id,
            } => Some((content_type, content_id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_default_is_idle() {
        assert_eq!(SyncStatus::default(), SyncStatus::Idle);
    }

    #[test]
    fn test_sync_status_display() {
        assert_eq!(format!("{}", SyncStatus::Idle), "Idle");
        assert_eq!(
            format!("{}", SyncStatus::Connected { peer_count: 3 }),
            "Connected (3 peers)"
        );
        assert_eq!(
            format!("{}", SyncStatus::Error("hub gone".to_string())),
            "Error: hub gone"
        );
    }

    #[test]
    fn test_event_bucket_accessor() {
        let event = BoardEvent::BucketChanged {
            content_type: "songs".to_string(),
            content_id: "42".to_string(),
        };
        assert_eq!(event.bucket(), Some(("songs", "42")));

        let event = BoardEvent::PostsChanged;
        assert_eq!(event.bucket(), None);
    }
}
