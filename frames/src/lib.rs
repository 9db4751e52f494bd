//! Shared frame model and JSON codec for the realtime chat socket.
//!
//! Every frame on the wire is a single JSON object whose `type` field names
//! the event and whose remaining fields are the payload:
//!
//! ```json
//! {"type": "typing", "receiver_id": 7, "is_typing": true}
//! ```
//!
//! The payload stays flexible (`serde_json::Map`) so unknown event kinds pass
//! through untouched; typed views are available via [`Frame::payload`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the envelope field carrying the event tag.
pub const TYPE_FIELD: &str = "type";

/// Error returned by [`decode_frame`] and [`Frame::payload`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text is not valid JSON, or a payload does not match its type.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame parsed as JSON but is not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// The object has no string `type` field.
    #[error("frame has no `type` tag")]
    MissingType,
}

/// Event tag carried in the `type` field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Chat message (both directions).
    Message,
    /// Typing indicator (both directions).
    Typing,
    /// Outbound request to mark a conversation read.
    MarkRead,
    /// Inbound read receipt.
    MessageRead,
    /// Inbound presence change for a friend.
    UserStatus,
    /// Any tag this crate does not know about.
    Other(String),
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Typing => "typing",
            Self::MarkRead => "mark_read",
            Self::MessageRead => "message_read",
            Self::UserStatus => "user_status",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        match tag {
            "message" => Self::Message,
            "typing" => Self::Typing,
            "mark_read" => Self::MarkRead,
            "message_read" => Self::MessageRead,
            "user_status" => Self::UserStatus,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message on the realtime socket.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Event tag.
    pub kind: EventKind,
    /// Every envelope field except `type`.
    pub data: Map<String, Value>,
}

impl Frame {
    #[must_use]
    pub fn new(kind: EventKind, data: Map<String, Value>) -> Self {
        Self { kind, data }
    }

    /// Decode the payload into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] when the payload does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Encode a frame as envelope JSON text.
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    let mut envelope = Map::with_capacity(frame.data.len() + 1);
    envelope.insert(TYPE_FIELD.to_owned(), Value::String(frame.kind.as_str().to_owned()));
    for (key, value) in &frame.data {
        if key != TYPE_FIELD {
            envelope.insert(key.clone(), value.clone());
        }
    }
    Value::Object(envelope).to_string()
}

/// Decode envelope JSON text into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed text, [`CodecError::NotAnObject`]
/// for non-object JSON, and [`CodecError::MissingType`] when the tag is absent
/// or not a string.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let Value::Object(mut data) = serde_json::from_str::<Value>(text)? else {
        return Err(CodecError::NotAnObject);
    };
    let Some(Value::String(tag)) = data.remove(TYPE_FIELD) else {
        return Err(CodecError::MissingType);
    };
    Ok(Frame { kind: EventKind::from(tag.as_str()), data })
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Build a `message` frame addressed to `receiver_id`.
#[must_use]
pub fn message_frame(receiver_id: i64, content: &str) -> Frame {
    let mut data = Map::new();
    data.insert("receiver_id".to_owned(), Value::from(receiver_id));
    data.insert("content".to_owned(), Value::from(content));
    Frame::new(EventKind::Message, data)
}

/// Build a `typing` frame addressed to `receiver_id`.
#[must_use]
pub fn typing_frame(receiver_id: i64, is_typing: bool) -> Frame {
    let mut data = Map::new();
    data.insert("receiver_id".to_owned(), Value::from(receiver_id));
    data.insert("is_typing".to_owned(), Value::Bool(is_typing));
    Frame::new(EventKind::Typing, data)
}

/// Build a `mark_read` frame for the conversation with `other_user_id`.
#[must_use]
pub fn mark_read_frame(other_user_id: i64) -> Frame {
    let mut data = Map::new();
    data.insert("other_user_id".to_owned(), Value::from(other_user_id));
    Frame::new(EventKind::MarkRead, data)
}

// =============================================================================
// INBOUND
// =============================================================================

/// Public profile fields the server embeds in pushed chat messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Payload of an inbound `message` frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Persisted message id.
    pub id: i64,
    pub content: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    #[serde(default)]
    pub sender: Option<Sender>,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_read: bool,
}

/// Payload of an inbound `typing` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub sender_id: i64,
    #[serde(default)]
    pub is_typing: bool,
}

/// Payload of an inbound `message_read` frame: `reader_id` has read the
/// messages `sender_id` sent them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub reader_id: i64,
    pub sender_id: i64,
}

/// Payload of an inbound `user_status` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<String>,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
