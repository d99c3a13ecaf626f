//! Error types for the child endpoint.

use std::time::Duration;

use tether_proto::{MessageTag, ProtocolError};

use crate::endpoint::HandshakeState;

/// Errors returned by [`crate::ChildEndpoint`] operations.
///
/// An error never leaves the endpoint half-transitioned: all fallible work
/// happens before any state is mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// Encoding or decoding failed; includes malformed inbound payloads
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operation not allowed in the current state
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        /// State the endpoint was in
        state: HandshakeState,
        /// Operation that was attempted
        operation: String,
    },

    /// The child tried to send a tag only the parent may send
    #[error("{tag} is a parent-to-child tag")]
    WrongDirection {
        /// Offending tag
        tag: MessageTag,
    },

    /// The expiry deadline is past what the clock can represent
    #[error("handshake expiry limit {limit:?} overflows the clock")]
    DeadlineOverflow {
        /// Configured limit
        limit: Duration,
    },
}

impl EndpointError {
    /// Whether the error reports a payload the peer sent that we cannot parse.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(self, Self::Protocol(err) if err.is_malformed_payload())
    }
}

/// Failure to deliver an outbound message.
///
/// Non-fatal: the runtime logs it and drops the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No embedding parent, opener or distinct top-level context exists
    #[error("no peer context available")]
    NoTransport,
}

/// Invalid endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Handshake expiry limit must be positive
    #[error("handshake expiry limit must be greater than zero")]
    ZeroExpiryLimit,

    /// Handshake expiry limit is above [`crate::MAX_HANDSHAKE_EXPIRY`]
    #[error("handshake expiry limit {0:?} is too large")]
    ExpiryLimitTooLarge(Duration),

    /// Origin filter must name a concrete origin
    #[error("invalid origin filter {0:?}; leave it unset to accept any origin")]
    InvalidOrigin(String),
}
