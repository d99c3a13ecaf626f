//! Protocol error types.

use crate::MessageTag;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding messages.
///
/// Unrecognized or non-text input is not an error: it is simply not a
/// protocol message and classifies as `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Payload following a recognized tag could not be deserialized
    #[error("malformed {tag} payload: {reason}")]
    MalformedPayload {
        /// Tag the payload was attached to
        tag: MessageTag,
        /// Codec failure description
        reason: String,
    },

    /// Outbound payload could not be serialized
    #[error("failed to serialize {tag} payload: {reason}")]
    Serialize {
        /// Tag the payload was going to be sent with
        tag: MessageTag,
        /// Codec failure description
        reason: String,
    },
}

impl ProtocolError {
    /// Whether this error means the peer sent something we cannot parse.
    pub const fn is_malformed_payload(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. })
    }
}
