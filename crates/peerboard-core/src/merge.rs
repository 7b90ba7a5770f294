//! Entity merge engine: id-keyed, first-write-wins merging of comments,
//! posts, and notifications.
//!
//! ## Merge policy
//!
//! - Merge key is the entity `id`.
//! - An incoming entity whose id is absent locally is appended. Append
//!   order carries no meaning; display order is a newest-first timestamp
//!   sort applied by the read API, not during merge.
//! - An incoming entity whose id is already present is **discarded**. There
//!   is no field-level reconciliation, no vector clocks, no timestamp
//!   tie-break. Likes and replies therefore use targeted in-place
//!   operations ([`CommentMap::update_likes`], [`CommentMap::append_reply`])
//!   rather than the generic merge path.
//! - Deletion is an explicit operation propagated as its own message, not a
//!   merge outcome. Deletions are not tombstoned: a peer that missed a
//!   delete will resurrect the entity on its next full-state merge. That
//!   gap is accepted, documented behavior.
//!
//! Merging is idempotent and commutative up to ordering, which is what lets
//! the push, pull, and store-subscription paths all funnel through the same
//! functions without any locking beyond the caller's single-writer mutex.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{Comment, Notification, Post, Reply};

/// Root comment aggregate: `content_type -> content_id -> comments`.
///
/// Serializes to the `{contentType: {contentId: [Comment]}}` shape the
/// browser clients persist under the global comments key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentMap(pub HashMap<String, HashMap<String, Vec<Comment>>>);

impl CommentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comments in a bucket, if the bucket exists.
    pub fn bucket(&self, content_type: &str, content_id: &str) -> Option<&Vec<Comment>> {
        self.0.get(content_type)?.get(content_id)
    }

    /// Bucket for mutation; auto-created when absent (never fails).
    fn bucket_mut(&mut self, content_type: &str, content_id: &str) -> &mut Vec<Comment> {
        self.0
            .entry(content_type.to_string())
            .or_default()
            .entry(content_id.to_string())
            .or_default()
    }

    fn find_mut(
        &mut self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
    ) -> Option<&mut Comment> {
        self.0
            .get_mut(content_type)?
            .get_mut(content_id)?
            .iter_mut()
            .find(|c| c.id == comment_id)
    }

    /// Look up a comment by id.
    pub fn comment(&self, content_type: &str, content_id: &str, comment_id: &str) -> Option<&Comment> {
        self.bucket(content_type, content_id)?
            .iter()
            .find(|c| c.id == comment_id)
    }

    /// Merge a single comment into a bucket.
    ///
    /// Returns `true` if the comment was appended, `false` if its id was
    /// already present (incoming copy discarded - first write wins).
    pub fn merge_comment(&mut self, content_type: &str, content_id: &str, comment: Comment) -> bool {
        let bucket = self.bucket_mut(content_type, content_id);
        if bucket.iter().any(|c| c.id == comment.id) {
            return false;
        }
        bucket.push(comment);
        true
    }

    /// Merge a whole incoming aggregate (a `sync_comments` payload or the
    /// shared store document) into this one.
    ///
    /// Returns the buckets that gained at least one comment, so the caller
    /// can emit change events per bucket.
    pub fn merge_map(&mut self, incoming: &CommentMap) -> Vec<(String, String)> {
        let mut changed = Vec::new();
        for (content_type, by_id) in &incoming.0 {
            for (content_id, comments) in by_id {
                let mut added = false;
                for comment in comments {
                    if self.merge_comment(content_type, content_id, comment.clone()) {
                        added = true;
                    }
                }
                if added {
                    changed.push((content_type.clone(), content_id.clone()));
                }
            }
        }
        changed
    }

    /// Replace a comment's like set with an incoming full snapshot.
    ///
    /// Duplicates in the snapshot are dropped (first occurrence kept) to
    /// preserve the no-duplicate-likes invariant. Unknown comment id is a
    /// silent no-op. Returns `true` if the stored set changed.
    pub fn update_likes(
        &mut self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
        likes: &[String],
    ) -> bool {
        let Some(comment) = self.find_mut(content_type, content_id, comment_id) else {
            return false;
        };
        let mut seen = HashSet::new();
        let deduped: Vec<String> = likes
            .iter()
            .filter(|u| seen.insert(u.as_str()))
            .cloned()
            .collect();
        if comment.likes == deduped {
            return false;
        }
        comment.likes = deduped;
        true
    }

    /// Toggle `user_id`'s like on a comment.
    ///
    /// Returns `None` if the comment does not exist (no-op), otherwise
    /// `Some(liked)` with the new state.
    pub fn toggle_like(
        &mut self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
        user_id: &str,
    ) -> Option<bool> {
        let comment = self.find_mut(content_type, content_id, comment_id)?;
        if let Some(pos) = comment.likes.iter().position(|u| u == user_id) {
            comment.likes.remove(pos);
            Some(false)
        } else {
            comment.likes.push(user_id.to_string());
            Some(true)
        }
    }

    /// Current like snapshot for a comment, if it exists.
    pub fn likes_of(
        &self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
    ) -> Option<Vec<String>> {
        Some(self.comment(content_type, content_id, comment_id)?.likes.clone())
    }

    /// Author (user id) of a comment, if it exists.
    pub fn author_of(
        &self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
    ) -> Option<String> {
        Some(self.comment(content_type, content_id, comment_id)?.user_id.clone())
    }

    /// Append a reply to a comment. Unknown comment id is a silent no-op;
    /// a reply id already present on the comment is discarded.
    pub fn append_reply(
        &mut self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
        reply: Reply,
    ) -> bool {
        let Some(comment) = self.find_mut(content_type, content_id, comment_id) else {
            return false;
        };
        if comment.replies.iter().any(|r| r.id == reply.id) {
            return false;
        }
        comment.replies.push(reply);
        true
    }

    /// Remove a comment from its bucket. No tombstone is recorded.
    /// Unknown id is a silent no-op.
    pub fn delete(&mut self, content_type: &str, content_id: &str, comment_id: &str) -> bool {
        let Some(bucket) = self.0.get_mut(content_type).and_then(|m| m.get_mut(content_id)) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|c| c.id != comment_id);
        bucket.len() != before
    }

    /// Comments in a bucket, newest first (the display order).
    pub fn sorted(&self, content_type: &str, content_id: &str) -> Vec<Comment> {
        let mut comments = self
            .bucket(content_type, content_id)
            .cloned()
            .unwrap_or_default();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        comments
    }

    /// Total number of comments across all buckets (replies not counted).
    pub fn total(&self) -> usize {
        self.0
            .values()
            .flat_map(|by_id| by_id.values())
            .map(|bucket| bucket.len())
            .sum()
    }

    /// Ids in a bucket, for set-equality assertions.
    pub fn ids(&self, content_type: &str, content_id: &str) -> HashSet<String> {
        self.bucket(content_type, content_id)
            .map(|bucket| bucket.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Post and Notification Merging
// ═══════════════════════════════════════════════════════════════════════

/// Merge incoming posts into an existing collection by id (first write
/// wins). Returns how many were appended.
pub fn merge_posts(existing: &mut Vec<Post>, incoming: &[Post]) -> usize {
    let mut added = 0;
    for post in incoming {
        if !existing.iter().any(|p| p.id == post.id) {
            existing.push(post.clone());
            added += 1;
        }
    }
    added
}

/// Union of the all-posts and user-posts collections, duplicate ids
/// suppressed (the all-posts copy wins), newest first.
pub fn combined_posts(all_posts: &[Post], user_posts: &[Post]) -> Vec<Post> {
    let mut combined: Vec<Post> = all_posts.to_vec();
    for post in user_posts {
        if !combined.iter().any(|p| p.id == post.id) {
            combined.push(post.clone());
        }
    }
    combined.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    combined
}

/// Merge incoming notifications into an existing list by id.
/// Returns how many were appended.
pub fn merge_notifications(existing: &mut Vec<Notification>, incoming: &[Notification]) -> usize {
    let mut added = 0;
    for notification in incoming {
        if !existing.iter().any(|n| n.id == notification.id) {
            existing.push(notification.clone());
            added += 1;
        }
    }
    added
}
