//! JSON frames exchanged over the realtime socket.
//!
//! Every frame is an envelope of the form `{"type": ..., "payload": ...}`.
//! The `new_message` frame is also sent back to the author of a message as
//! the delivery confirmation.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Message, UserId};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Ask the server to store and deliver a private message.
    #[serde(rename_all = "camelCase")]
    PrivateMessage { recipient_id: UserId, content: String },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A private message was stored and fanned out.
    NewMessage(Message),
    /// A user's online flag flipped.
    #[serde(rename_all = "camelCase")]
    UserStatus { user_id: UserId, is_online: bool },
}

impl ClientFrame {
    /// Serialize to the JSON text representation used on the socket.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl ServerFrame {
    /// Parse a frame from incoming socket text.
    ///
    /// Frames with an unknown `type` or a malformed payload are errors; the
    /// caller decides whether to drop or fail.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}
