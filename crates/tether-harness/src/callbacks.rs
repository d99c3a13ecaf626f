//! Callbacks that record what they were told.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tether_core::EndpointError;
use tether_proto::Identity;
use tether_runtime::ChildCallbacks;

/// Everything the runtime reported, in counts and payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackLog {
    /// `on_ready` calls
    pub ready: usize,
    /// Identities passed to `on_initialize`
    pub initialized: Vec<Identity>,
    /// Payloads passed to `on_parent_communication`
    pub communications: Vec<Value>,
    /// `on_parent_disconnect` calls
    pub disconnects: usize,
    /// `on_handshake_expiry` calls
    pub expiries: usize,
    /// Errors passed to `on_malformed_payload`
    pub malformed: Vec<EndpointError>,
}

/// [`ChildCallbacks`] writing into a shared [`CallbackLog`].
///
/// Clones share the log, so a test keeps one clone and hands the other to
/// the runtime.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks {
    log: Arc<Mutex<CallbackLog>>,
}

impl RecordingCallbacks {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the log so far.
    pub fn snapshot(&self) -> CallbackLog {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, update: impl FnOnce(&mut CallbackLog)) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut *log);
    }
}

impl ChildCallbacks for RecordingCallbacks {
    fn on_ready(&mut self) {
        self.record(|log| log.ready += 1);
    }

    fn on_initialize(&mut self, identity: &Identity) {
        self.record(|log| log.initialized.push(identity.clone()));
    }

    fn on_parent_communication(&mut self, payload: Value) {
        self.record(|log| log.communications.push(payload));
    }

    fn on_parent_disconnect(&mut self) {
        self.record(|log| log.disconnects += 1);
    }

    fn on_handshake_expiry(&mut self) {
        self.record(|log| log.expiries += 1);
    }

    fn on_malformed_payload(&mut self, error: &EndpointError) {
        self.record(|log| log.malformed.push(error.clone()));
    }
}
