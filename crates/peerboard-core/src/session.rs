//! Authentication context for one running client.
//!
//! Replaces the browser clients' global `currentUser` variable with an
//! explicit session object owned by the engine, so several clients can
//! coexist in one process (tests spin up whole meshes this way).

use crate::error::{BoardError, BoardResult};
use crate::types::{random_token, UserInfo};

/// Session state: either an authenticated user or an anonymous visitor.
///
/// Visitors mint a random ephemeral peer id per session; authenticated
/// clients use their stable user id as peer id.
#[derive(Debug, Clone)]
pub struct Session {
    user: Option<UserInfo>,
    visitor_id: String,
}

impl Session {
    pub fn new(user: Option<UserInfo>) -> Self {
        Self {
            user,
            visitor_id: format!("visitor_{}", random_token(9)),
        }
    }

    /// The current user, if authenticated.
    pub fn current(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_admin)
    }

    pub fn login(&mut self, user: UserInfo) {
        self.user = Some(user);
    }

    pub fn logout(&mut self) {
        self.user = None;
    }

    /// The peer id this session connects as.
    pub fn peer_id(&self) -> String {
        match &self.user {
            Some(user) => user.id.clone(),
            None => self.visitor_id.clone(),
        }
    }

    /// The current user, or a validation error routed to the toast layer.
    pub fn require_user(&self) -> BoardResult<&UserInfo> {
        self.user
            .as_ref()
            .ok_or_else(|| BoardError::Validation("Please log in to comment".to_string()))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(None)
    }
}
