//! Peer wire protocol.
//!
//! Messages are JSON objects dispatched on a `type` tag - the same frames
//! the browser clients exchange, so a Rust node can drop into an existing
//! mesh. A frame that fails to decode (unknown tag or malformed payload) is
//! logged and ignored by the receiver, never fatal.
//!
//! ## Message Flow
//!
//! ```text
//! Visitor                          Authenticated peer
//!   |                               |
//!   |--- request_comments --------->|
//!   |<-- sync_comments {full doc} --|
//!   |                               |
//!   |    (merge, first-write-wins)  |
//!   |                               |
//!   |<-- comment {c, bucket} -------|   push-on-mutate
//!   |<-- like {id, snapshot} -------|
//!   |<-- reply {id, reply} ---------|
//!   |<-- delete {id} ---------------|
//! ```

use serde::{Deserialize, Serialize};

use crate::merge::CommentMap;
use crate::types::{Comment, Post, Reply, UserInfo};

/// Messages exchanged between peers, tagged by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Identity announcement, sent by authenticated peers on connect
    UserInfo { user: UserInfo },

    /// Ask the remote peer for its full comment document, sent by
    /// visitors on connect
    RequestComments,

    /// Full comment document, the answer to `request_comments`
    SyncComments { comments: CommentMap },

    /// A single new comment
    #[serde(rename_all = "camelCase")]
    Comment {
        comment: Comment,
        content_type: String,
        content_id: String,
    },

    /// Full like-set snapshot for one comment
    #[serde(rename_all = "camelCase")]
    Like {
        comment_id: String,
        likes: Vec<String>,
        content_type: String,
        content_id: String,
    },

    /// A new reply to an existing comment
    #[serde(rename_all = "camelCase")]
    Reply {
        comment_id: String,
        reply: Reply,
        content_type: String,
        content_id: String,
    },

    /// Explicit comment deletion (not tombstoned; see the merge engine)
    #[serde(rename_all = "camelCase")]
    Delete {
        comment_id: String,
        content_type: String,
        content_id: String,
    },

    /// A new post published from the admin dashboard
    NewPost { post: Post },

    /// Admin post deletion
    #[serde(rename_all = "camelCase")]
    DeletePost { post_id: i64 },
}

impl PeerMessage {
    /// Encode to a JSON wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from a JSON wire frame.
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::UserInfo { .. } => "user_info",
            PeerMessage::RequestComments => "request_comments",
            PeerMessage::SyncComments { .. } => "sync_comments",
            PeerMessage::Comment { .. } => "comment",
            PeerMessage::Like { .. } => "like",
            PeerMessage::Reply { .. } => "reply",
            PeerMessage::Delete { .. } => "delete",
            PeerMessage::NewPost { .. } => "new_post",
            PeerMessage::DeletePost { .. } => "delete_post",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> UserInfo {
        UserInfo::new("u1", "booms", "a.png")
    }

    #[test]
    fn test_comment_message_roundtrip() {
        let msg = PeerMessage::Comment {
            comment: Comment::new(&test_user(), "hi"),
            content_type: "songs".to_string(),
            content_id: "42".to_string(),
        };

        let encoded = msg.encode().unwrap();
        let decoded = PeerMessage::decode(&encoded).unwrap();

        match decoded {
            PeerMessage::Comment {
                comment,
                content_type,
                content_id,
            } => {
                assert_eq!(comment.text, "hi");
                assert_eq!(content_type, "songs");
                assert_eq!(content_id, "42");
            }
            other => panic!("wrong message type: {}", other.kind()),
        }
    }

    #[test]
    fn test_wire_tags_match_browser_clients() {
        let json = serde_json::to_value(&PeerMessage::RequestComments).unwrap();
        assert_eq!(json.get("type").unwrap(), "request_comments");

        let msg = PeerMessage::Like {
            comment_id: "c1".to_string(),
            likes: vec!["u2".to_string()],
            content_type: "songs".to_string(),
            content_id: "42".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json.get("type").unwrap(), "like");
        // Payload fields stay camelCase on the wire
        assert_eq!(json.get("commentId").unwrap(), "c1");
        assert_eq!(json.get("contentType").unwrap(), "songs");
        assert!(json.get("comment_id").is_none());
    }

    #[test]
    fn test_unknown_tag_fails_decode() {
        // Receivers log and drop these; decode itself must error cleanly
        let frame = br#"{"type":"launch_missiles","target":"moon"}"#;
        assert!(PeerMessage::decode(frame).is_err());
    }

    #[test]
    fn test_malformed_payload_fails_decode() {
        // Right tag, wrong payload shape
        let frame = br#"{"type":"comment","comment":"not an object"}"#;
        assert!(PeerMessage::decode(frame).is_err());
    }

    #[test]
    fn test_sync_comments_carries_full_document() {
        let mut comments = CommentMap::new();
        comments.merge_comment("songs", "42", Comment::new(&test_user(), "hi"));
        comments.merge_comment("blog", "7", Comment::new(&test_user(), "yo"));

        let msg = PeerMessage::SyncComments { comments };
        let decoded = PeerMessage::decode(&msg.encode().unwrap()).unwrap();

        match decoded {
            PeerMessage::SyncComments { comments } => assert_eq!(comments.total(), 2),
            other => panic!("wrong message type: {}", other.kind()),
        }
    }

    #[test]
    fn test_delete_post_roundtrip() {
        let msg = PeerMessage::DeletePost { post_id: 1736700000000 };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json.get("type").unwrap(), "delete_post");
        assert_eq!(json.get("postId").unwrap(), 1736700000000i64);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(PeerMessage::RequestComments.kind(), "request_comments");
        let msg = PeerMessage::UserInfo { user: test_user() };
        assert_eq!(msg.kind(), "user_info");
    }
}
