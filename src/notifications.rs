//! Fan-out of "new post" notifications to the followers of a post's author.

use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse};
use log::{debug, info, warn};
use rusqlite::{params, Connection, Row};

use crate::auth::validate_token;
use crate::config::NEW_POST_NOTIFICATION;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, new_id, now_iso};
use crate::favorites::followers_of;
use crate::handlers::AppState;
use crate::models::models::{Notification, Post};

/// Delivers one notification to its recipient.
pub trait NotificationSender: Send + Sync {
    fn send(&self, conn: &Connection, notification: &Notification) -> anyhow::Result<()>;
}

/// Stores notifications in the `notifications` table. Sending the same
/// post to the same follower twice keeps a single row.
pub struct DatabaseNotifier;

impl NotificationSender for DatabaseNotifier {
    fn send(&self, conn: &Connection, n: &Notification) -> anyhow::Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO notifications
             (id, user_id, kind, post_id, author_id, title, created_at, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![n.id, n.user_id, n.kind, n.post_id, n.author_id, n.title, n.created_at, n.read_at],
        )?;
        Ok(())
    }
}

/// Writes each notification to the log and stores nothing.
pub struct LogNotifier;

impl NotificationSender for LogNotifier {
    fn send(&self, _conn: &Connection, n: &Notification) -> anyhow::Result<()> {
        info!("[Notify] {} -> {}: new post {} \"{}\"", n.author_id, n.user_id, n.post_id, n.title);
        Ok(())
    }
}

/// Builds the sender selected by `FAVBOARD_NOTIFIER`.
pub fn sender_for(kind: &str) -> anyhow::Result<Arc<dyn NotificationSender>> {
    match kind {
        "database" => Ok(Arc::new(DatabaseNotifier)),
        "log" => Ok(Arc::new(LogNotifier)),
        other => anyhow::bail!("Unknown notifier {:?}, expected \"database\" or \"log\"", other),
    }
}

pub fn new_post_notification(follower_id: &str, post: &Post) -> Notification {
    Notification {
        id: new_id(),
        user_id: follower_id.to_string(),
        kind: NEW_POST_NOTIFICATION.to_string(),
        post_id: post.id.clone(),
        author_id: post.user_id.clone(),
        title: post.title.clone(),
        created_at: now_iso(),
        read_at: None,
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        NotificationDispatcher { sender }
    }

    /// Sends one notification per follower of the post's author and
    /// returns how many were delivered. Failed sends are logged and skipped.
    pub fn on_post_created(&self, conn: &Connection, post: &Post) -> rusqlite::Result<usize> {
        let followers = followers_of(conn, &post.user_id)?;
        if followers.is_empty() {
            debug!("[Notify] No followers for {}", post.user_id);
            return Ok(0);
        }

        let mut delivered = 0;
        for follower in &followers {
            let notification = new_post_notification(&follower.id, post);
            match self.sender.send(conn, &notification) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("[Notify] Delivery to {} for post {} failed: {}", follower.id, post.id, e),
            }
        }

        info!("[Notify] Post {} delivered to {}/{} followers", post.id, delivered, followers.len());
        Ok(delivered)
    }
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        post_id: row.get(3)?,
        author_id: row.get(4)?,
        title: row.get(5)?,
        created_at: row.get(6)?,
        read_at: row.get(7)?,
    })
}

/// Stored notifications for `user_id`, newest first.
pub fn list_notifications(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, post_id, author_id, title, created_at, read_at
         FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![user_id], row_to_notification)?;
    rows.collect()
}

// === HTTP Handlers ===

pub fn handle_list(state: &AppState, req: &HttpRequest, _body: &[u8]) -> anyhow::Result<HttpResponse> {
    let conn = state.db.conn()?;
    let user_id = match validate_token(&conn, req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let notifications = list_notifications(&conn, &user_id)?;
    json_response(200, &serde_json::json!({ "data": notifications }))
}
