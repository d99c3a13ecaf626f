//! Message encoding and decoding.
//!
//! Encoding is `tag.prefix() ++ serialize(payload)`. Decoding runs in two
//! steps so that the cheap, infallible part is separate from the part that
//! can fail:
//!
//! 1. [`classify`] finds the leading tag. Non-text data or text that does not
//!    start with a recognized tag is not a protocol message (`None`).
//! 2. [`MessageCodec::payload`] deserializes the remainder with the configured
//!    [`PayloadCodec`]. Failure here is a [`ProtocolError::MalformedPayload`]
//!    and is returned to the caller.

use std::{fmt, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Message, MessageData, MessageTag, ProtocolError, Result};

/// Error produced by a [`PayloadCodec`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Serializer/deserializer for structured payloads.
///
/// Implementations must produce a non-empty string for every value: an empty
/// remainder after the tag is read back as an absent payload.
pub trait PayloadCodec: fmt::Debug + Send + Sync {
    /// Serialize a structured value into text.
    fn serialize(&self, value: &Value) -> std::result::Result<String, CodecError>;

    /// Parse text back into a structured value.
    fn deserialize(&self, text: &str) -> std::result::Result<Value, CodecError>;
}

/// Default payload codec: compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn serialize(&self, value: &Value) -> std::result::Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize(&self, text: &str) -> std::result::Result<Value, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A message whose tag has been identified but whose payload is still raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified<'a> {
    /// Leading tag
    pub tag: MessageTag,
    /// Serialized payload following the tag
    pub rest: &'a str,
}

/// Identify the tag of raw channel data.
pub fn classify(data: &MessageData) -> Option<Classified<'_>> {
    let text = data.as_text()?;
    let (tag, rest) = MessageTag::strip_prefix(text)?;
    Some(Classified { tag, rest })
}

/// Encodes and decodes tagged messages using a [`PayloadCodec`].
#[derive(Debug, Clone)]
pub struct MessageCodec {
    payload_codec: Arc<dyn PayloadCodec>,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(Arc::new(JsonCodec))
    }
}

impl MessageCodec {
    /// Create a codec using the given payload serializer.
    pub fn new(payload_codec: Arc<dyn PayloadCodec>) -> Self {
        Self { payload_codec }
    }

    /// Encode a tag and optional payload into a wire string.
    pub fn encode(&self, tag: MessageTag, payload: Option<&Value>) -> Result<String> {
        let Some(value) = payload else {
            return Ok(tag.prefix().to_owned());
        };

        let body = self
            .payload_codec
            .serialize(value)
            .map_err(|err| ProtocolError::Serialize { tag, reason: err.0 })?;

        let mut raw = String::with_capacity(tag.prefix().len() + body.len());
        raw.push_str(tag.prefix());
        raw.push_str(&body);
        Ok(raw)
    }

    /// Encode a [`Message`].
    pub fn encode_message(&self, message: &Message) -> Result<String> {
        self.encode(message.tag, message.payload.as_ref())
    }

    /// Encode a typed payload.
    pub fn encode_as<T: Serialize>(&self, tag: MessageTag, payload: &T) -> Result<String> {
        let value = serde_json::to_value(payload)
            .map_err(|err| ProtocolError::Serialize { tag, reason: err.to_string() })?;
        self.encode(tag, Some(&value))
    }

    /// Deserialize the payload of a classified message.
    ///
    /// An empty remainder is an absent payload.
    pub fn payload(&self, classified: &Classified<'_>) -> Result<Option<Value>> {
        if classified.rest.is_empty() {
            return Ok(None);
        }

        self.payload_codec
            .deserialize(classified.rest)
            .map(Some)
            .map_err(|err| ProtocolError::MalformedPayload { tag: classified.tag, reason: err.0 })
    }

    /// Deserialize the payload of a classified message into a typed value.
    ///
    /// A missing payload or one with the wrong shape is malformed.
    pub fn payload_as<T: DeserializeOwned>(&self, classified: &Classified<'_>) -> Result<T> {
        let tag = classified.tag;
        let value = self.payload(classified)?.ok_or_else(|| ProtocolError::MalformedPayload {
            tag,
            reason: "missing payload".to_owned(),
        })?;

        serde_json::from_value(value)
            .map_err(|err| ProtocolError::MalformedPayload { tag, reason: err.to_string() })
    }

    /// Classify and fully decode raw channel data.
    ///
    /// Returns `Ok(None)` for data that is not a protocol message.
    pub fn decode(&self, data: &MessageData) -> Result<Option<Message>> {
        let Some(classified) = classify(data) else {
            return Ok(None);
        };
        let payload = self.payload(&classified)?;
        Ok(Some(Message { tag: classified.tag, payload }))
    }
}
