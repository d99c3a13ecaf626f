//! Runtime errors.

use tether_core::EndpointError;

/// Errors surfaced by [`crate::Runtime`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// The host driver failed
    #[error("driver error: {0}")]
    Driver(#[source] E),

    /// The endpoint rejected an operation or an inbound message
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl<E: std::error::Error + 'static> RuntimeError<E> {
    /// Whether this wraps a malformed inbound payload.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(self, Self::Endpoint(err) if err.is_malformed_payload())
    }
}
