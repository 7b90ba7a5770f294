//! Peerboard CLI
//!
//! Thin wrapper around peerboard-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show node information
//! peerboard info
//!
//! # Log in (creates the local identity document)
//! peerboard login booms
//!
//! # Comment on a bucket
//! peerboard comment add songs 42 "great track!"
//!
//! # List comments, newest first
//! peerboard comment list songs 42
//!
//! # Toggle a like
//! peerboard comment like songs 42 <comment_id>
//!
//! # Reply to a comment
//! peerboard comment reply songs 42 <comment_id> "agreed"
//!
//! # Publish a studio post (requires --admin login)
//! peerboard post create "new single out now" --kind music
//!
//! # Show notifications
//! peerboard notifications list
//!
//! # Run as a persistent node with the sync loops active
//! peerboard serve
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use peerboard_core::{BoardEngine, PeerHub, PostKind, UserInfo};

/// Peerboard - local-first social board with P2P sync
#[derive(Parser)]
#[command(name = "peerboard")]
#[command(version = "0.1.0")]
#[command(about = "Peerboard - local-first social board")]
#[command(
    long_about = "A local-first social board: comments, replies, likes, posts, and notifications, persisted locally and replicated to peers on a best-effort basis."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.peerboard/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show node information
    Info,

    /// Log in as a user (persisted until logout)
    Login {
        /// Username (minimum 3 characters)
        username: String,

        /// Avatar URL
        #[arg(short, long)]
        avatar: Option<String>,

        /// Log in with the admin flag (client-trusted, demo only)
        #[arg(long)]
        admin: bool,
    },

    /// Log out, clearing the persisted user
    Logout,

    /// Show the current user
    Whoami,

    /// Comment management
    Comment {
        #[command(subcommand)]
        action: CommentAction,
    },

    /// Post management
    Post {
        #[command(subcommand)]
        action: PostAction,
    },

    /// Notification management
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },

    /// Peer registry management
    Peers {
        #[command(subcommand)]
        action: PeersAction,
    },

    /// Start a persistent node with the sync loops running
    Serve,
}

#[derive(Subcommand)]
enum CommentAction {
    /// Add a comment to a bucket
    Add {
        /// Content type (e.g. songs, blog)
        content_type: String,
        /// Content id within the type
        content_id: String,
        /// Comment text
        text: String,
    },
    /// List comments in a bucket, newest first
    List {
        content_type: String,
        content_id: String,
    },
    /// Toggle a like on a comment
    Like {
        content_type: String,
        content_id: String,
        comment_id: String,
    },
    /// Reply to a comment
    Reply {
        content_type: String,
        content_id: String,
        comment_id: String,
        text: String,
    },
    /// Delete a comment (own comments, or any with --admin login)
    Delete {
        content_type: String,
        content_id: String,
        comment_id: String,
    },
}

#[derive(Subcommand)]
enum PostAction {
    /// Publish a studio post (admin) to the shared feed
    Create {
        /// Post content
        content: String,
        /// Post kind: text, photo, or music
        #[arg(short, long, default_value = "text")]
        kind: String,
        /// Media URL for photo/music posts
        #[arg(short, long)]
        media_url: Option<String>,
        /// Create a personal dashboard post instead of a studio post
        #[arg(long)]
        personal: bool,
    },
    /// List the combined feed, newest first
    List,
    /// Toggle a like on a post
    Like {
        /// Post id (millisecond timestamp)
        post_id: i64,
    },
    /// Delete a post
    Delete {
        /// Post id (millisecond timestamp)
        post_id: i64,
    },
}

#[derive(Subcommand)]
enum NotificationAction {
    /// List notifications for the current user, newest first
    List,
    /// Mark one notification read
    Read {
        /// Notification id
        notification_id: String,
    },
    /// Mark all notifications read
    ReadAll,
}

#[derive(Subcommand)]
enum PeersAction {
    /// List all remembered peer ids
    List,
    /// Forget a peer id
    Forget {
        /// Peer id to remove from the registry
        peer_id: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.peerboard/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".peerboard")
        .join("data")
}

fn parse_post_kind(s: &str) -> Result<PostKind> {
    match s.to_lowercase().as_str() {
        "text" => Ok(PostKind::Text),
        "photo" => Ok(PostKind::Photo),
        "music" => Ok(PostKind::Music),
        _ => anyhow::bail!("Invalid post kind '{}'. Must be one of: text, photo, music", s),
    }
}

fn require_login(engine: &BoardEngine) -> Result<UserInfo> {
    engine
        .current_user()
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run: peerboard login <username>"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let engine = BoardEngine::open(&data_dir, PeerHub::new())?;

    match cli.command {
        Commands::Info => {
            println!("Peerboard v0.1.0");
            println!();
            match engine.current_user() {
                Some(user) => {
                    println!("User:");
                    println!("  {} ({})", user.username, user.id);
                    if user.is_admin {
                        println!("  admin");
                    }
                }
                None => println!("User: (not logged in - visitor session)"),
            }
            println!();
            println!("Peer id: {}", engine.peer_id());
            println!("Data directory: {}", data_dir.display());
            println!("Comments: {}", engine.comment_count());
            println!("Known peers: {}", engine.directory().known_peers()?.len());
        }

        Commands::Login {
            username,
            avatar,
            admin,
        } => {
            let id = format!("user_{}", username.to_lowercase());
            let avatar = avatar.unwrap_or_else(|| {
                format!("https://ui-avatars.com/api/?name={}&background=random", username)
            });
            let mut user = UserInfo::new(id, username.clone(), avatar);
            if admin {
                user = user.admin();
            }
            match engine.login(user) {
                Ok(()) => {
                    println!("Logged in as {}.", username);
                    if admin {
                        println!("Admin flag set (client-trusted, demo only).");
                    }
                }
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Logout => {
            engine.logout()?;
            println!("Logged out.");
        }

        Commands::Whoami => match engine.current_user() {
            Some(user) => {
                println!("{} ({})", user.username, user.id);
                if user.is_admin {
                    println!("admin");
                }
            }
            None => println!("Not logged in (visitor session)."),
        },

        Commands::Comment { action } => match action {
            CommentAction::Add {
                content_type,
                content_id,
                text,
            } => match engine.post_comment(&content_type, &content_id, &text) {
                Ok(comment) => {
                    println!("Comment added.");
                    println!("  ID: {}", comment.id);
                }
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            },

            CommentAction::List {
                content_type,
                content_id,
            } => {
                let comments = engine.comments_for(&content_type, &content_id);
                if comments.is_empty() {
                    println!("Be the first to comment!");
                } else {
                    let plural = if comments.len() == 1 { "" } else { "s" };
                    println!("{} Comment{}", comments.len(), plural);
                    println!();
                    for comment in comments {
                        println!(
                            "  [{}] {} ({} likes)",
                            comment.id, comment.username, comment.likes.len()
                        );
                        println!("    {}", comment.text);
                        for reply in &comment.replies {
                            println!("      ↳ {}: {}", reply.username, reply.text);
                        }
                    }
                }
            }

            CommentAction::Like {
                content_type,
                content_id,
                comment_id,
            } => match engine.toggle_like(&content_type, &content_id, &comment_id) {
                Ok(Some(true)) => println!("Liked."),
                Ok(Some(false)) => println!("Like removed."),
                Ok(None) => println!("No such comment: {}", comment_id),
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            },

            CommentAction::Reply {
                content_type,
                content_id,
                comment_id,
                text,
            } => match engine.post_reply(&content_type, &content_id, &comment_id, &text) {
                Ok(Some(reply)) => {
                    println!("Reply added.");
                    println!("  ID: {}", reply.id);
                }
                Ok(None) => println!("No such comment: {}", comment_id),
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            },

            CommentAction::Delete {
                content_type,
                content_id,
                comment_id,
            } => match engine.delete_comment(&content_type, &content_id, &comment_id) {
                Ok(true) => println!("Comment deleted."),
                Ok(false) => println!("No such comment: {}", comment_id),
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            },
        },

        Commands::Post { action } => match action {
            PostAction::Create {
                content,
                kind,
                media_url,
                personal,
            } => {
                let kind = parse_post_kind(&kind)?;
                let result = if personal {
                    engine.create_user_post(&content, kind, media_url)
                } else {
                    engine.create_post(&content, kind, media_url)
                };
                match result {
                    Ok(post) => {
                        println!("Post published.");
                        println!("  ID: {}", post.id);
                    }
                    Err(e) if e.is_user_facing() => println!("{}", e),
                    Err(e) => return Err(e.into()),
                }
            }

            PostAction::List => {
                let posts = engine.combined_posts()?;
                if posts.is_empty() {
                    println!("No posts yet.");
                } else {
                    println!("Posts ({}):", posts.len());
                    println!();
                    for post in posts {
                        println!("  [{}] {} - {:?}", post.id, post.username, post.kind);
                        println!("    {}", post.content);
                        if let Some(url) = &post.media_url {
                            println!("    media: {}", url);
                        }
                        println!(
                            "    {} likes, {} comments",
                            post.likes.len(),
                            post.comments.len()
                        );
                    }
                }
            }

            PostAction::Like { post_id } => match engine.toggle_post_like(post_id) {
                Ok(Some(true)) => println!("Liked."),
                Ok(Some(false)) => println!("Like removed."),
                Ok(None) => println!("No such post: {}", post_id),
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            },

            PostAction::Delete { post_id } => match engine.delete_post(post_id) {
                Ok(true) => println!("Post deleted."),
                Ok(false) => println!("No such post: {}", post_id),
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            },
        },

        Commands::Notifications { action } => {
            let user = require_login(&engine)?;
            match action {
                NotificationAction::List => {
                    let notifications = engine.notifications_for(&user.id)?;
                    if notifications.is_empty() {
                        println!("No notifications.");
                    } else {
                        let unread = engine.unread_count(&user.id)?;
                        println!("Notifications ({}, {} unread):", notifications.len(), unread);
                        println!();
                        for notification in notifications {
                            let marker = if notification.read { " " } else { "*" };
                            println!("  {} [{}] {}", marker, notification.id, notification.message);
                        }
                    }
                }

                NotificationAction::Read { notification_id } => {
                    if engine.mark_notification_read(&user.id, &notification_id)? {
                        println!("Marked read.");
                    } else {
                        println!("No such notification: {}", notification_id);
                    }
                }

                NotificationAction::ReadAll => {
                    let changed = engine.mark_all_read(&user.id)?;
                    println!("Marked {} notification(s) read.", changed);
                }
            }
        }

        Commands::Peers { action } => match action {
            PeersAction::List => {
                let peers = engine.directory().known_peers()?;
                if peers.is_empty() {
                    println!("No peers remembered yet.");
                } else {
                    println!("Known peers ({}):", peers.len());
                    for peer in peers {
                        println!("  {}", peer);
                    }
                }
            }

            PeersAction::Forget { peer_id } => {
                if engine.directory().forget(&peer_id)? {
                    println!("Forgot peer: {}", peer_id);
                } else {
                    println!("Peer not in registry: {}", peer_id);
                }
            }
        },

        Commands::Serve => {
            println!("Starting peerboard node...");
            println!();
            match engine.current_user() {
                Some(user) => println!("User: {} ({})", user.username, user.id),
                None => println!("User: visitor session"),
            }
            println!("Peer id: {}", engine.peer_id());
            println!("Data directory: {}", data_dir.display());
            println!();
            println!("Node is running. Press Ctrl+C to stop.");
            println!();

            engine.start();

            let status_interval = Duration::from_secs(60);
            let mut last_status = std::time::Instant::now();

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        println!("Received shutdown signal...");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        if last_status.elapsed() >= status_interval {
                            last_status = std::time::Instant::now();
                            println!(
                                "[Status] {} - {} comment(s), {} known peer(s)",
                                engine.status(),
                                engine.comment_count(),
                                engine.directory().known_peers()?.len()
                            );
                        }
                    }
                }
            }

            println!("Shutting down...");
            engine.shutdown();
            println!("Goodbye.");
        }
    }

    Ok(())
}
