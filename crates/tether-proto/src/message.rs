//! Decoded messages and raw channel data.

use serde_json::Value;

use crate::MessageTag;

/// A protocol message: a tag and an optional structured payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What the message means
    pub tag: MessageTag,
    /// Structured payload, absent for bare notifications
    pub payload: Option<Value>,
}

impl Message {
    /// Create a message with a payload.
    pub fn new(tag: MessageTag, payload: Value) -> Self {
        Self { tag, payload: Some(payload) }
    }

    /// Create a bare notification with no payload.
    pub fn bare(tag: MessageTag) -> Self {
        Self { tag, payload: None }
    }
}

/// Data delivered by the host channel.
///
/// The channel can carry arbitrary structured values. Only text is a
/// candidate protocol message; anything else is ignored by classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    /// String data, possibly a tagged protocol message
    Text(String),
    /// Non-string structured data
    Structured(Value),
}

impl MessageData {
    /// Text content, if this is string data.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }
}

impl From<String> for MessageData {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageData {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for MessageData {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Structured(other),
        }
    }
}
