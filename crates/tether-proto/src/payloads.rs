//! Payload types carried by the handshake messages.
//!
//! Field names on the wire are camelCase so that non-Rust peers can read them
//! without a mapping layer.

use serde::{Deserialize, Serialize};

/// Identity the parent assigns to a child.
///
/// Granted once during the handshake and persisted verbatim so a reloaded
/// child can announce itself with the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Opaque identifier chosen by the parent
    pub id: String,
    /// Human-readable name of the child
    pub name: String,
    /// Name of the parent (root) context
    pub parent_name: String,
}

impl Identity {
    /// Create an identity.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        parent_name: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), name: name.into(), parent_name: parent_name.into() }
    }
}

/// Payload of `LOADED` and `ON_BEFORE_UNLOAD`.
///
/// The id is only known once an identity has been granted or restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStatus {
    /// Assigned id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Whether the child is hosted in an embedding frame
    pub is_embedded: bool,
}

/// Payload of the child's `HANDSHAKE` acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAck {
    /// Id being acknowledged
    pub id: String,
    /// Whether the child is hosted in an embedding frame
    pub is_embedded: bool,
}

/// Read-only view of what a child knows about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    /// Assigned id, if any
    pub id: Option<String>,
    /// Assigned name, if any
    pub name: Option<String>,
    /// Parent name, if any
    pub parent_name: Option<String>,
    /// Whether the child is hosted in an embedding frame
    pub is_embedded: bool,
}

impl TabInfo {
    /// Build the view from an optional identity.
    pub fn new(identity: Option<&Identity>, is_embedded: bool) -> Self {
        Self {
            id: identity.map(|i| i.id.clone()),
            name: identity.map(|i| i.name.clone()),
            parent_name: identity.map(|i| i.parent_name.clone()),
            is_embedded,
        }
    }
}
