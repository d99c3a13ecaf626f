//! Identity persistence across reloads.
//!
//! A reload resets the child's in-memory state but not its durable slot. The
//! child writes its identity to the slot when the parent grants it and reads
//! it back once at activation, so a reloaded child announces the same id.
//!
//! Persistence is best effort. A missing slot, a failing slot or a corrupt
//! record all degrade to "no stored identity"; none of them is an error.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tether_proto::Identity;
use tracing::{debug, warn};

/// Fixed key the identity record is stored under.
pub const SESSION_KEY: &str = "__tether_tab_info__";

/// Failure reported by a durable slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session slot failure: {0}")]
pub struct SlotError(pub String);

/// Durable key-value storage that survives a reload but not the session.
pub trait SessionSlot: Send {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, SlotError>;

    /// Write a value.
    fn set(&mut self, key: &str, value: &str) -> Result<(), SlotError>;
}

/// In-memory [`SessionSlot`].
///
/// Clones share the same storage, so a value written through one handle is
/// visible to a fresh endpoint built with another. This is how tests model a
/// reload.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionSlot for MemorySlot {
    fn get(&self, key: &str) -> Result<Option<String>, SlotError> {
        let values = self.values.lock().map_err(|err| SlotError(err.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SlotError> {
        let mut values = self.values.lock().map_err(|err| SlotError(err.to_string()))?;
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Policy for storing and restoring the child's identity.
pub struct SessionPersistence {
    slot: Option<Box<dyn SessionSlot>>,
}

impl std::fmt::Debug for SessionPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPersistence").field("available", &self.is_available()).finish()
    }
}

impl SessionPersistence {
    /// Persistence backed by a durable slot.
    pub fn new(slot: Box<dyn SessionSlot>) -> Self {
        Self { slot: Some(slot) }
    }

    /// Persistence for hosts without a durable slot. Every operation is a
    /// no-op and every activation behaves like a fresh session.
    pub fn unavailable() -> Self {
        Self { slot: None }
    }

    /// Whether a slot is present.
    pub fn is_available(&self) -> bool {
        self.slot.is_some()
    }

    /// Read the stored identity, if any.
    pub fn restore(&self) -> Option<Identity> {
        let slot = self.slot.as_ref()?;

        let raw = match slot.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(%err, "failed to read session record");
                return None;
            },
        };

        match serde_json::from_str::<Identity>(&raw) {
            Ok(identity) => {
                debug!(id = %identity.id, "restored session identity");
                Some(identity)
            },
            Err(err) => {
                warn!(%err, "ignoring corrupt session record");
                None
            },
        }
    }

    /// Store the identity, replacing any previous record.
    pub fn persist(&mut self, identity: &Identity) {
        let Some(slot) = self.slot.as_mut() else {
            return;
        };

        let record = match serde_json::to_string(identity) {
            Ok(record) => record,
            Err(err) => {
                warn!(%err, "failed to serialize session record");
                return;
            },
        };

        if let Err(err) = slot.set(SESSION_KEY, &record) {
            warn!(%err, "failed to write session record");
        }
    }
}
