//! BoardEngine - the per-client entry point.
//!
//! One `BoardEngine` is one running client: its session, its in-memory
//! comment state, its live peer connections, and its background sync
//! loops. Nothing is process-global, so a test can run a whole mesh of
//! engines in one process.
//!
//! ## Sync paths
//!
//! Three propagation paths converge on the same merge functions, so
//! behavior is path-independent:
//!
//! 1. **Push on mutate** - every local create/like/reply/delete persists,
//!    then broadcasts a targeted message to all open connections.
//! 2. **Pull on interval** - a fixed-period timer re-reads the shared
//!    comments document and re-merges it, covering clients that share the
//!    store but have no peer connection.
//! 3. **Store subscription** - the store's change channel triggers the
//!    same re-merge immediately when any sharer writes.
//!
//! Merging is idempotent and id-keyed, so the paths need no mutual
//! exclusion beyond the single-writer mutex around the in-memory state.
//!
//! # Example
//!
//! ```ignore
//! use peerboard_core::{BoardEngine, PeerHub, UserInfo};
//!
//! let hub = PeerHub::new();
//! let engine = BoardEngine::open("~/.peerboard/data", hub)?;
//! engine.login(UserInfo::new("u1", "booms", "avatar.png"))?;
//! engine.start();
//!
//! let comment = engine.post_comment("songs", "42", "great track!")?;
//! for c in engine.comments_for("songs", "42") {
//!     println!("{}: {}", c.username, c.text);
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BoardError, BoardResult};
use crate::merge::{self, CommentMap};
use crate::session::Session;
use crate::store::{keys, Store};
use crate::sync::{
    BoardEvent, PeerDirectory, PeerHub, PeerMessage, PeerTransport, SyncStatus, TransportEvent,
};
use crate::types::{Comment, Notification, NotificationKind, Post, PostKind, Reply, UserInfo};

/// Period of the pull-on-interval resync timer.
pub const PULL_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-memory state mutated by all three sync paths.
///
/// Guarded by one mutex: the merge engine assumes a single writer, and in
/// an async runtime that assumption has to be enforced explicitly.
#[derive(Default)]
struct BoardState {
    comments: CommentMap,
    /// Users seen via `user_info`, deduplicated by id
    roster: Vec<UserInfo>,
}

/// The per-client engine coordinating store, merge state, session, and
/// transport.
#[derive(Clone)]
pub struct BoardEngine {
    store: Store,
    state: Arc<Mutex<BoardState>>,
    session: Arc<Mutex<Session>>,
    transport: PeerTransport,
    directory: PeerDirectory,
    event_tx: broadcast::Sender<BoardEvent>,
    transport_rx: Arc<Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<TransportEvent>>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    pull_interval: Duration,
}

impl BoardEngine {
    /// Create an engine with its store under the given data directory.
    ///
    /// The persisted login (if any) determines the peer identity:
    /// authenticated clients register with their user id, visitors with a
    /// fresh random id. Must be called within a tokio runtime.
    pub fn open(data_dir: impl AsRef<Path>, hub: PeerHub) -> BoardResult<Self> {
        let data_dir = data_dir.as_ref();
        info!(?data_dir, "initializing board engine");
        let store = Store::new(data_dir.join("peerboard.redb"))?;
        Self::with_store(store, hub)
    }

    /// Create an engine on an existing store.
    ///
    /// Several engines may share one store - that is the "other tab"
    /// topology the pull and subscription paths exist for.
    pub fn with_store(store: Store, hub: PeerHub) -> BoardResult<Self> {
        let session = Session::new(store.load_user()?);
        let peer_id = session.peer_id();

        let (transport, transport_rx) = PeerTransport::bind(&peer_id, hub)?;
        let directory = PeerDirectory::new(store.clone());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = BoardState {
            comments: store.load_comments()?,
            roster: Vec::new(),
        };

        info!(%peer_id, authenticated = session.is_authenticated(), "engine ready");

        Ok(Self {
            store,
            state: Arc::new(Mutex::new(state)),
            session: Arc::new(Mutex::new(session)),
            transport,
            directory,
            event_tx,
            transport_rx: Arc::new(Mutex::new(Some(transport_rx))),
            tasks: Arc::new(Mutex::new(Vec::new())),
            pull_interval: PULL_INTERVAL,
        })
    }

    /// Override the pull resync period (call before [`BoardEngine::start`]).
    pub fn set_pull_interval(&mut self, interval: Duration) {
        self.pull_interval = interval;
    }

    /// Subscribe to engine events (the UI re-render channel).
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.event_tx.subscribe()
    }

    /// Our peer id on the hub.
    pub fn peer_id(&self) -> String {
        self.transport.peer_id().to_string()
    }

    /// Current connection status.
    pub fn status(&self) -> SyncStatus {
        match self.transport.connection_count() {
            0 => SyncStatus::Idle,
            peer_count => SyncStatus::Connected { peer_count },
        }
    }

    /// Users seen via `user_info` this session.
    pub fn roster(&self) -> Vec<UserInfo> {
        self.state.lock().roster.clone()
    }

    /// The known-peers registry.
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Log in, persisting the user document.
    ///
    /// The peer identity is fixed at engine construction; a login made
    /// mid-session takes effect on the transport at the next startup
    /// (matching the page-reload behavior of the original clients).
    pub fn login(&self, user: UserInfo) -> BoardResult<()> {
        if user.username.trim().chars().count() < 3 {
            return Err(BoardError::Validation(
                "Username must be at least 3 characters".to_string(),
            ));
        }
        self.store.save_user(&user)?;
        self.session.lock().login(user);
        Ok(())
    }

    /// Log out, clearing the persisted user document.
    pub fn logout(&self) -> BoardResult<()> {
        self.store.clear_user()?;
        self.session.lock().logout();
        Ok(())
    }

    /// The current user, if authenticated.
    pub fn current_user(&self) -> Option<UserInfo> {
        self.session.lock().current().cloned()
    }

    fn require_user(&self) -> BoardResult<UserInfo> {
        let session = self.session.lock();
        let user = session.require_user()?;
        Ok(user.clone())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Comment Operations (push-on-mutate)
    // ═══════════════════════════════════════════════════════════════════════

    /// Post a comment on a bucket.
    ///
    /// # Errors
    ///
    /// `Validation` if unauthenticated or the text is empty; the message is
    /// user-facing and nothing is mutated or broadcast.
    pub fn post_comment(
        &self,
        content_type: &str,
        content_id: &str,
        text: &str,
    ) -> BoardResult<Comment> {
        let user = self.require_user()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(BoardError::Validation("Please enter a comment".to_string()));
        }

        let comment = Comment::new(&user, text);
        {
            let mut state = self.state.lock();
            state.comments.merge_comment(content_type, content_id, comment.clone());
        }
        self.persist_comments()?;
        self.emit_bucket(content_type, content_id);
        self.broadcast_message(&PeerMessage::Comment {
            comment: comment.clone(),
            content_type: content_type.to_string(),
            content_id: content_id.to_string(),
        });
        Ok(comment)
    }

    /// Toggle the current user's like on a comment.
    ///
    /// Returns `None` (no-op) if the comment does not exist, otherwise the
    /// new like state. Broadcasts the full like-set snapshot.
    pub fn toggle_like(
        &self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
    ) -> BoardResult<Option<bool>> {
        let user = self.require_user()?;

        let (liked, likes) = {
            let mut state = self.state.lock();
            match state.comments.toggle_like(content_type, content_id, comment_id, &user.id) {
                Some(liked) => {
                    let likes = state
                        .comments
                        .likes_of(content_type, content_id, comment_id)
                        .unwrap_or_default();
                    (liked, likes)
                }
                None => return Ok(None),
            }
        };

        self.persist_comments()?;
        self.emit_bucket(content_type, content_id);
        self.broadcast_message(&PeerMessage::Like {
            comment_id: comment_id.to_string(),
            likes,
            content_type: content_type.to_string(),
            content_id: content_id.to_string(),
        });
        Ok(Some(liked))
    }

    /// Reply to a comment.
    ///
    /// Returns `None` (no-op) if the parent comment does not exist.
    pub fn post_reply(
        &self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
        text: &str,
    ) -> BoardResult<Option<Reply>> {
        let user = self.require_user()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(BoardError::Validation("Please enter a reply".to_string()));
        }

        let reply = Reply::new(&user, text);
        let appended = {
            let mut state = self.state.lock();
            state.comments.append_reply(content_type, content_id, comment_id, reply.clone())
        };
        if !appended {
            return Ok(None);
        }

        self.persist_comments()?;
        self.emit_bucket(content_type, content_id);
        self.broadcast_message(&PeerMessage::Reply {
            comment_id: comment_id.to_string(),
            reply: reply.clone(),
            content_type: content_type.to_string(),
            content_id: content_id.to_string(),
        });
        Ok(Some(reply))
    }

    /// Delete a comment authored by the current user (admins may delete
    /// any comment).
    ///
    /// Returns `Ok(false)` (no-op) if the comment does not exist.
    pub fn delete_comment(
        &self,
        content_type: &str,
        content_id: &str,
        comment_id: &str,
    ) -> BoardResult<bool> {
        let user = self.require_user()?;

        let removed = {
            let mut state = self.state.lock();
            let Some(author) = state.comments.author_of(content_type, content_id, comment_id)
            else {
                return Ok(false);
            };
            if author != user.id && !user.is_admin {
                return Err(BoardError::Validation(
                    "You can only delete your own comments".to_string(),
                ));
            }
            state.comments.delete(content_type, content_id, comment_id)
        };

        if removed {
            self.persist_comments()?;
            self.emit_bucket(content_type, content_id);
            self.broadcast_message(&PeerMessage::Delete {
                comment_id: comment_id.to_string(),
                content_type: content_type.to_string(),
                content_id: content_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// Comments in a bucket, newest first.
    pub fn comments_for(&self, content_type: &str, content_id: &str) -> Vec<Comment> {
        self.state.lock().comments.sorted(content_type, content_id)
    }

    /// Total comment count across all buckets.
    pub fn comment_count(&self) -> usize {
        self.state.lock().comments.total()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Post Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Publish a post to the all-posts collection (admin only).
    ///
    /// Emits a global notification and broadcasts `new_post` to peers.
    pub fn create_post(
        &self,
        content: &str,
        kind: PostKind,
        media_url: Option<String>,
    ) -> BoardResult<Post> {
        let user = self.require_user()?;
        if !user.is_admin {
            return Err(BoardError::Validation(
                "Only the studio account can publish posts".to_string(),
            ));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(BoardError::Validation("Please enter post content".to_string()));
        }

        let post = Post::new(&user, content, kind, media_url);
        let mut all_posts = self.store.load_posts(keys::ALL_POSTS)?;
        all_posts.insert(0, post.clone());
        self.store.save_posts(keys::ALL_POSTS, &all_posts)?;

        let preview: String = content.chars().take(30).collect();
        self.create_global_notification(
            NotificationKind::NewPost,
            format!("{} just posted: {}...", user.username, preview),
            Some(post.id.to_string()),
        )?;

        self.emit(BoardEvent::PostsChanged);
        self.broadcast_message(&PeerMessage::NewPost { post: post.clone() });
        Ok(post)
    }

    /// Create a post in the user-posts collection (any authenticated user,
    /// not broadcast - unioned into reads alongside the admin posts).
    pub fn create_user_post(
        &self,
        content: &str,
        kind: PostKind,
        media_url: Option<String>,
    ) -> BoardResult<Post> {
        let user = self.require_user()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(BoardError::Validation("Please enter post content".to_string()));
        }

        let post = Post::new(&user, content, kind, media_url);
        let mut user_posts = self.store.load_posts(keys::USER_POSTS)?;
        user_posts.insert(0, post.clone());
        self.store.save_posts(keys::USER_POSTS, &user_posts)?;

        self.emit(BoardEvent::PostsChanged);
        Ok(post)
    }

    /// Union of all-posts and user-posts, duplicate ids suppressed, newest
    /// first.
    pub fn combined_posts(&self) -> BoardResult<Vec<Post>> {
        let all_posts = self.store.load_posts(keys::ALL_POSTS)?;
        let user_posts = self.store.load_posts(keys::USER_POSTS)?;
        Ok(merge::combined_posts(&all_posts, &user_posts))
    }

    /// Delete a post by id from both collections (author or admin).
    pub fn delete_post(&self, post_id: i64) -> BoardResult<bool> {
        let user = self.require_user()?;

        let all_posts = self.store.load_posts(keys::ALL_POSTS)?;
        let user_posts = self.store.load_posts(keys::USER_POSTS)?;
        let Some(post) = all_posts
            .iter()
            .chain(user_posts.iter())
            .find(|p| p.id == post_id)
        else {
            return Ok(false);
        };
        if post.user_id != user.id && !user.is_admin {
            return Err(BoardError::Validation(
                "You can only delete your own posts".to_string(),
            ));
        }

        self.remove_post_from_docs(post_id)?;
        self.emit(BoardEvent::PostsChanged);
        self.broadcast_message(&PeerMessage::DeletePost { post_id });
        Ok(true)
    }

    /// Toggle the current user's like on a post. `None` if the post does
    /// not exist.
    pub fn toggle_post_like(&self, post_id: i64) -> BoardResult<Option<bool>> {
        let user = self.require_user()?;

        for key in [keys::ALL_POSTS, keys::USER_POSTS] {
            let mut posts = self.store.load_posts(key)?;
            if let Some(post) = posts.iter_mut().find(|p| p.id == post_id) {
                let liked = if let Some(pos) = post.likes.iter().position(|u| u == &user.id) {
                    post.likes.remove(pos);
                    false
                } else {
                    post.likes.push(user.id.clone());
                    true
                };
                self.store.save_posts(key, &posts)?;
                self.emit(BoardEvent::PostsChanged);
                return Ok(Some(liked));
            }
        }
        Ok(None)
    }

    fn remove_post_from_docs(&self, post_id: i64) -> BoardResult<()> {
        for key in [keys::ALL_POSTS, keys::USER_POSTS] {
            let mut posts = self.store.load_posts(key)?;
            let before = posts.len();
            posts.retain(|p| p.id != post_id);
            if posts.len() != before {
                self.store.save_posts(key, &posts)?;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Notification Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Append a notification to the global and admin lists.
    pub fn create_global_notification(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        target_id: Option<String>,
    ) -> BoardResult<Notification> {
        let notification = Notification::new(kind, message, target_id);

        let mut global = self.store.load_notifications(keys::GLOBAL_NOTIFICATIONS)?;
        global.push(notification.clone());
        self.store.save_notifications(keys::GLOBAL_NOTIFICATIONS, &global)?;

        let mut admin = self.store.load_notifications(keys::ADMIN_NOTIFICATIONS)?;
        admin.push(notification.clone());
        self.store.save_notifications(keys::ADMIN_NOTIFICATIONS, &admin)?;

        self.emit(BoardEvent::NotificationsChanged);
        Ok(notification)
    }

    /// A user's notifications, newest first.
    ///
    /// Global notifications not yet in the user's own list are copied in
    /// unread; the read flag lives in the per-user document from then on.
    pub fn notifications_for(&self, user_id: &str) -> BoardResult<Vec<Notification>> {
        let key = keys::user_notifications(user_id);
        let mut mine = self.store.load_notifications(&key)?;
        let global = self.store.load_notifications(keys::GLOBAL_NOTIFICATIONS)?;

        let fresh: Vec<Notification> = global
            .into_iter()
            .map(|mut n| {
                n.read = false;
                n
            })
            .collect();
        if merge::merge_notifications(&mut mine, &fresh) > 0 {
            self.store.save_notifications(&key, &mine)?;
        }

        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    /// Number of unread notifications for a user.
    pub fn unread_count(&self, user_id: &str) -> BoardResult<usize> {
        Ok(self
            .notifications_for(user_id)?
            .iter()
            .filter(|n| !n.read)
            .count())
    }

    /// Mark one notification read. `false` if unknown id.
    pub fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> BoardResult<bool> {
        let key = keys::user_notifications(user_id);
        let mut mine = self.store.load_notifications(&key)?;
        let Some(notification) = mine.iter_mut().find(|n| n.id == notification_id) else {
            return Ok(false);
        };
        if !notification.read {
            notification.read = true;
            self.store.save_notifications(&key, &mine)?;
            self.emit(BoardEvent::NotificationsChanged);
        }
        Ok(true)
    }

    /// Mark all of a user's notifications read. Returns how many changed.
    pub fn mark_all_read(&self, user_id: &str) -> BoardResult<usize> {
        let key = keys::user_notifications(user_id);
        let mut mine = self.store.load_notifications(&key)?;
        let mut changed = 0;
        for notification in mine.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }
        if changed > 0 {
            self.store.save_notifications(&key, &mine)?;
            self.emit(BoardEvent::NotificationsChanged);
        }
        Ok(changed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════

    /// Open a connection to a specific peer. The greeting and registry add
    /// happen on the resulting `Opened` event (see [`BoardEngine::start`]).
    pub fn connect_to_peer(&self, peer_id: &str) -> BoardResult<bool> {
        self.transport.connect(peer_id)
    }

    /// Re-read the shared comments document and merge it into memory
    /// (the pull path). The merged union is written back so sharers
    /// converge even after overlapping writes.
    pub fn pull_sync(&self) -> BoardResult<Vec<(String, String)>> {
        let incoming = self.store.load_comments()?;
        let changed = {
            let mut state = self.state.lock();
            state.comments.merge_map(&incoming)
        };
        if !changed.is_empty() {
            debug!(buckets = changed.len(), "pull merged new comments");
            self.persist_comments()?;
            for (content_type, content_id) in &changed {
                self.emit_bucket(content_type, content_id);
            }
        }
        Ok(changed)
    }

    /// Apply one incoming peer message.
    ///
    /// Dispatch is exhaustive over the wire union; every arm funnels into
    /// the merge engine or a targeted update, so receiving a message twice
    /// (or out of order) is harmless.
    pub fn handle_message(&self, from: &str, message: PeerMessage) -> BoardResult<()> {
        debug!(%from, kind = message.kind(), "handling peer message");
        match message {
            PeerMessage::UserInfo { user } => {
                let mut state = self.state.lock();
                if !state.roster.iter().any(|u| u.id == user.id) {
                    state.roster.push(user.clone());
                    drop(state);
                    self.emit(BoardEvent::UserSeen { user });
                }
                Ok(())
            }

            PeerMessage::RequestComments => {
                let snapshot = self.state.lock().comments.clone();
                self.send_message(from, &PeerMessage::SyncComments { comments: snapshot });
                Ok(())
            }

            PeerMessage::SyncComments { comments } => {
                let changed = {
                    let mut state = self.state.lock();
                    state.comments.merge_map(&comments)
                };
                if !changed.is_empty() {
                    self.persist_comments()?;
                    for (content_type, content_id) in &changed {
                        self.emit_bucket(content_type, content_id);
                    }
                }
                Ok(())
            }

            PeerMessage::Comment {
                comment,
                content_type,
                content_id,
            } => {
                let added = {
                    let mut state = self.state.lock();
                    state.comments.merge_comment(&content_type, &content_id, comment)
                };
                if added {
                    self.persist_comments()?;
                    self.emit_bucket(&content_type, &content_id);
                }
                Ok(())
            }

            PeerMessage::Like {
                comment_id,
                likes,
                content_type,
                content_id,
            } => {
                let changed = {
                    let mut state = self.state.lock();
                    state.comments.update_likes(&content_type, &content_id, &comment_id, &likes)
                };
                if changed {
                    self.persist_comments()?;
                    self.emit_bucket(&content_type, &content_id);
                }
                Ok(())
            }

            PeerMessage::Reply {
                comment_id,
                reply,
                content_type,
                content_id,
            } => {
                let appended = {
                    let mut state = self.state.lock();
                    state.comments.append_reply(&content_type, &content_id, &comment_id, reply)
                };
                if appended {
                    self.persist_comments()?;
                    self.emit_bucket(&content_type, &content_id);
                }
                Ok(())
            }

            PeerMessage::Delete {
                comment_id,
                content_type,
                content_id,
            } => {
                let removed = {
                    let mut state = self.state.lock();
                    state.comments.delete(&content_type, &content_id, &comment_id)
                };
                if removed {
                    self.persist_comments()?;
                    self.emit_bucket(&content_type, &content_id);
                }
                Ok(())
            }

            PeerMessage::NewPost { post } => {
                let mut all_posts = self.store.load_posts(keys::ALL_POSTS)?;
                if !all_posts.iter().any(|p| p.id == post.id) {
                    all_posts.insert(0, post);
                    self.store.save_posts(keys::ALL_POSTS, &all_posts)?;
                    self.emit(BoardEvent::PostsChanged);
                }
                Ok(())
            }

            PeerMessage::DeletePost { post_id } => {
                self.remove_post_from_docs(post_id)?;
                self.emit(BoardEvent::PostsChanged);
                Ok(())
            }
        }
    }

    /// Start the background sync loops and run the presence pass.
    ///
    /// Spawns three tasks: the transport event loop, the pull timer, and
    /// the store subscription. Returns `false` if already started.
    pub fn start(&self) -> bool {
        let Some(mut transport_rx) = self.transport_rx.lock().take() else {
            debug!("engine already started");
            return false;
        };

        // Transport events: greetings, dispatch, presence bookkeeping
        let engine = self.clone();
        let transport_task = tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                engine.handle_transport_event(event);
            }
            debug!("transport event loop ended");
        });

        // Pull-on-interval resync
        let engine = self.clone();
        let pull_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.pull_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.pull_sync() {
                    warn!(error = %e, "pull sync failed");
                }
            }
        });

        // Store change subscription (the cross-tab path)
        let engine = self.clone();
        let mut store_rx = self.store.subscribe();
        let subscription_task = tokio::spawn(async move {
            loop {
                match store_rx.recv().await {
                    Ok(event) if event.key == keys::GLOBAL_COMMENTS => {
                        if let Err(e) = engine.pull_sync() {
                            warn!(error = %e, "subscription sync failed");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "store subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.tasks
            .lock()
            .extend([transport_task, pull_task, subscription_task]);

        // Presence: dial everyone we have ever seen
        let opened = self.directory.connect_known(&self.transport);
        info!(peer_id = %self.transport.peer_id(), opened, "engine started");
        true
    }

    /// Stop background tasks and leave the hub.
    pub fn shutdown(&self) {
        info!(peer_id = %self.transport.peer_id(), "shutting down engine");
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.transport.shutdown();
    }

    fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened { peer_id, .. } => {
                if let Err(e) = self.directory.remember(&peer_id) {
                    warn!(%peer_id, error = %e, "could not record peer");
                }
                // Role-dependent greeting: identity if authenticated,
                // otherwise ask for the full comment document
                let greeting = match self.current_user() {
                    Some(user) => PeerMessage::UserInfo { user },
                    None => PeerMessage::RequestComments,
                };
                self.send_message(&peer_id, &greeting);
                self.emit(BoardEvent::PeerConnected { peer_id });
            }

            TransportEvent::Frame { peer_id, payload } => match PeerMessage::decode(&payload) {
                Ok(message) => {
                    if let Err(e) = self.handle_message(&peer_id, message) {
                        warn!(%peer_id, error = %e, "failed to apply peer message");
                        self.emit(BoardEvent::SyncError {
                            message: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    // Unknown tag or malformed payload: log and drop
                    warn!(%peer_id, error = %e, "ignoring undecodable peer frame");
                }
            },

            TransportEvent::Closed { peer_id } => {
                self.emit(BoardEvent::PeerDisconnected { peer_id });
            }
        }
    }

    fn send_message(&self, peer_id: &str, message: &PeerMessage) {
        match message.encode() {
            Ok(frame) => {
                if let Err(e) = self.transport.send_to(peer_id, frame) {
                    warn!(%peer_id, kind = message.kind(), error = %e, "send failed");
                }
            }
            Err(e) => warn!(kind = message.kind(), error = %e, "message encode failed"),
        }
    }

    fn broadcast_message(&self, message: &PeerMessage) {
        match message.encode() {
            Ok(frame) => {
                let delivered = self.transport.broadcast(&frame);
                debug!(kind = message.kind(), delivered, "broadcast");
            }
            Err(e) => warn!(kind = message.kind(), error = %e, "message encode failed"),
        }
    }

    fn persist_comments(&self) -> BoardResult<()> {
        let snapshot = self.state.lock().comments.clone();
        self.store.save_comments(&snapshot)
    }

    fn emit_bucket(&self, content_type: &str, content_id: &str) {
        self.emit(BoardEvent::BucketChanged {
            content_type: content_type.to_string(),
            content_id: content_id.to_string(),
        });
    }

    fn emit(&self, event: BoardEvent) {
        let _ = self.event_tx.send(event);
    }
}
