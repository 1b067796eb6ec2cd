//! Row models for the three persistent tables.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A stored movie, addressable by its short lookup code.
#[derive(Debug, Clone, FromRow)]
pub struct Movie {
    /// Surrogate key, also the creation order
    pub id: i32,
    /// Unique lookup code handed out to users ("1", "2", ...)
    pub movie_code: String,
    /// Opaque Telegram file id; the video itself is never re-uploaded
    pub video_id: String,
    /// Display name derived from the caption's first line or the file name
    pub video_name: Option<String>,
    /// Sanitized caption, if the upload carried one
    pub caption: Option<String>,
    /// Delivery counter, only ever incremented
    pub views: i32,
    /// Insertion timestamp
    pub added_at: DateTime<Utc>,
}

/// A bot user. Created on first contact, touched on every message,
/// never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Reserved for future moderation flows; nothing reads it yet
    pub is_blocked: bool,
}

/// A channel users must be subscribed to before the bot serves them.
#[derive(Debug, Clone, FromRow)]
pub struct Channel {
    pub id: i32,
    /// Telegram channel identity (typically a -100... supergroup id)
    pub channel_id: i64,
    /// Display handle, when the channel is public
    pub channel_username: Option<String>,
    /// Gates access when true (and the channel is active)
    pub required: bool,
    /// Soft-delete flag; deletes are currently hard, so this stays true
    pub is_active: bool,
}
