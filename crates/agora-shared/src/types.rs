//! Core identity, chat, and presence types shared across the workspace.
//!
//! The chat endpoints speak camelCase JSON; the serde attributes below pin
//! the exact key names the backend uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned numeric user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login form. The backend accepts either a username or an email address
/// as the identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

/// The authenticated user, as confirmed by the backend at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
}

/// Registration form, submitted URL-encoded.
///
/// Validation happens server-side; a rejected registration comes back as a
/// per-field error map.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub nickname: String,
    pub age: u8,
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// One private message, as carried both by the history endpoint and the
/// realtime `new_message` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: UserId,
    #[serde(rename = "receiverId")]
    pub recipient_id: UserId,
    pub sender_username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One row of the presence roster returned by the users endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub username: String,
    pub is_online: bool,
    /// When the most recent message was exchanged with this user, if any.
    #[serde(default)]
    pub last_message_timestamp: Option<DateTime<Utc>>,
    /// Preview of the most recent message, if any.
    #[serde(default)]
    pub last_message_content: Option<String>,
    /// Messages from this user not yet read by us.
    #[serde(default)]
    pub unread_count: u32,
}
