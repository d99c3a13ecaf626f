//! Application callbacks.

use serde_json::Value;
use tether_core::EndpointError;
use tether_proto::Identity;
use tracing::error;

/// Hooks the runtime invokes as the endpoint reports events.
///
/// Every hook defaults to doing nothing, except
/// [`ChildCallbacks::on_malformed_payload`] which logs the failure.
pub trait ChildCallbacks: Send {
    /// Activation finished and the child announced itself.
    fn on_ready(&mut self) {}

    /// The parent granted an identity.
    fn on_initialize(&mut self, _identity: &Identity) {}

    /// Application message from the parent.
    fn on_parent_communication(&mut self, _payload: Value) {}

    /// The parent is tearing down.
    fn on_parent_disconnect(&mut self) {}

    /// No handshake arrived within the expiry limit.
    fn on_handshake_expiry(&mut self) {}

    /// A message from the parent could not be parsed.
    ///
    /// Only [`crate::Runtime::run`] calls this; `dispatch` returns the error
    /// to its caller instead.
    fn on_malformed_payload(&mut self, error: &EndpointError) {
        error!(%error, "dropping malformed message from parent");
    }
}

impl ChildCallbacks for () {}
