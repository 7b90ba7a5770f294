//! Core types for peerboard
//!
//! Entities are serialized as JSON with the wire field names the browser
//! clients already use (`userId`, `mediaUrl`, `timestamp`, ...), so documents
//! written by this implementation remain readable by existing clients.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Generate a random lowercase base36 token of the given length.
///
/// Matches the id alphabet the browser clients generate with
/// `Math.random().toString(36)`.
pub(crate) fn random_token(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// A user identity as exchanged in `user_info` messages.
///
/// There is no server-side account store; whatever the client claims is
/// trusted, including the admin flag. Securing this is an explicit non-goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Stable user id; doubles as the peer id for authenticated clients
    pub id: String,
    pub username: String,
    /// Avatar reference (URL or data URI); opaque to the core
    pub avatar: String,
    /// Client-trusted moderation flag
    #[serde(default)]
    pub is_admin: bool,
}

impl UserInfo {
    pub fn new(id: impl Into<String>, username: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            avatar: avatar.into(),
            is_admin: false,
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// A reply to a comment.
///
/// Replies cannot be nested and carry no likes; their lifetime is bound to
/// the parent comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub text: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Reply {
    /// Create a new reply authored by `user`.
    pub fn new(user: &UserInfo, text: impl Into<String>) -> Self {
        Self {
            id: format!("comment_{}", random_token(9)),
            user_id: user.id.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A comment within a content bucket.
///
/// Identity is the `id` field, generated client-side and never reused.
/// `likes` holds user ids with set semantics (no duplicates, toggle to
/// remove).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub text: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

impl Comment {
    /// Create a new comment authored by `user`.
    pub fn new(user: &UserInfo, text: impl Into<String>) -> Self {
        Self {
            id: format!("comment_{}", random_token(9)),
            user_id: user.id.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            text: text.into(),
            created_at: Utc::now(),
            likes: Vec::new(),
            replies: Vec::new(),
        }
    }

    /// Whether `user_id` has liked this comment.
    pub fn liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|u| u == user_id)
    }
}

/// Media attachment kind for a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Text,
    Photo,
    Music,
}

impl Default for PostKind {
    fn default() -> Self {
        PostKind::Text
    }
}

/// A post in the all-posts or user-posts collection.
///
/// Post ids are millisecond timestamps, matching the browser clients'
/// `Date.now()` ids. The "all posts" and "user posts" collections are
/// unioned at read time with duplicate ids suppressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: PostKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    /// Create a new post authored by `user`.
    pub fn new(
        user: &UserInfo,
        content: impl Into<String>,
        kind: PostKind,
        media_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            content: content.into(),
            kind,
            media_url,
            created_at: now,
            likes: Vec::new(),
            comments: Vec::new(),
        }
    }
}

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewPost,
    NewComment,
    System,
}

/// A notification, stored globally or per-user.
///
/// Global notifications are copied into a user's own list (unread) the
/// first time that user loads notifications; the read flag then lives in
/// the per-user document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    /// Id of the entity this notification points at (e.g. a post id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>, target_id: Option<String>) -> Self {
        Self {
            id: format!("notif_{}", random_token(9)),
            kind,
            message: message.into(),
            target_id,
            created_at: Utc::now(),
            read: false,
        }
    }
}
