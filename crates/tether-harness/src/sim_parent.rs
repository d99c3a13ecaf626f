//! Simulated parent endpoint.
//!
//! Answers the child side of the protocol the way a spawning context would:
//! every `LOADED` gets a `HANDSHAKE_WITH_PARENT` carrying an identity, a child
//! that announces an id it already holds keeps it, and the root's name is
//! passed in explicitly through [`SimParentConfig::root_name`].

use std::collections::BTreeMap;

use serde_json::Value;
use tether_proto::{
    HandshakeAck, Identity, MessageCodec, MessageData, MessageTag, ProtocolError, TabStatus,
    classify,
};
use tracing::{debug, info};

use crate::ids::IdSource;

/// Simulated parent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimParentConfig {
    /// Name of the root context, copied into every identity
    pub root_name: String,
    /// Origin the parent's messages come from
    pub origin: String,
    /// Prefix for generated child names
    pub child_name_prefix: String,
}

impl Default for SimParentConfig {
    fn default() -> Self {
        Self {
            root_name: "root".to_owned(),
            origin: "https://parent.example".to_owned(),
            child_name_prefix: "child".to_owned(),
        }
    }
}

/// What the parent knows about one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRecord {
    /// Identity granted to the child
    pub identity: Identity,
    /// Whether the child acknowledged the latest grant
    pub acknowledged: bool,
    /// Whether the child reported teardown since the latest grant
    pub unloaded: bool,
    /// Number of `LOADED` announcements seen
    pub announcements: usize,
    /// Whether the child reported being embedded
    pub is_embedded: bool,
    /// `CUSTOM` payloads received from the child
    pub messages: Vec<Value>,
}

/// Parent side of the protocol, driven synchronously.
pub struct SimParent {
    config: SimParentConfig,
    ids: Box<dyn IdSource>,
    codec: MessageCodec,
    children: BTreeMap<String, ChildRecord>,
    /// Latest child that announced itself; `CUSTOM` messages carry no id
    current: Option<String>,
}

impl SimParent {
    /// Create a parent.
    pub fn new(config: SimParentConfig, ids: Box<dyn IdSource>) -> Self {
        Self {
            config,
            ids,
            codec: MessageCodec::default(),
            children: BTreeMap::new(),
            current: None,
        }
    }

    /// Parent configuration.
    pub fn config(&self) -> &SimParentConfig {
        &self.config
    }

    /// Origin the parent sends from.
    pub fn origin(&self) -> &str {
        &self.config.origin
    }

    /// All known children, keyed by id.
    pub fn children(&self) -> &BTreeMap<String, ChildRecord> {
        &self.children
    }

    /// One child by id.
    pub fn child(&self, id: &str) -> Option<&ChildRecord> {
        self.children.get(id)
    }

    /// Process a message the child posted; returns wire strings to deliver
    /// back to the child.
    pub fn receive(&mut self, raw: &str) -> Result<Vec<String>, ProtocolError> {
        let data = MessageData::from(raw);
        let Some(classified) = classify(&data) else {
            debug!("parent ignoring untagged message");
            return Ok(vec![]);
        };

        match classified.tag {
            MessageTag::Loaded => {
                let status: TabStatus = self.codec.payload_as(&classified)?;
                let reply = self.on_loaded(status)?;
                Ok(vec![reply])
            },
            MessageTag::Handshake => {
                let ack: HandshakeAck = self.codec.payload_as(&classified)?;
                if let Some(child) = self.children.get_mut(&ack.id) {
                    child.acknowledged = true;
                    child.is_embedded = ack.is_embedded;
                    info!(id = %ack.id, "child acknowledged handshake");
                }
                Ok(vec![])
            },
            MessageTag::OnBeforeUnload => {
                let status: TabStatus = self.codec.payload_as(&classified)?;
                if let Some(child) = status.id.as_ref().and_then(|id| self.children.get_mut(id)) {
                    child.unloaded = true;
                }
                Ok(vec![])
            },
            MessageTag::Custom => {
                let payload = self.codec.payload(&classified)?.unwrap_or(Value::Null);
                if let Some(child) =
                    self.current.as_ref().and_then(|id| self.children.get_mut(id))
                {
                    child.messages.push(payload);
                }
                Ok(vec![])
            },
            tag => {
                debug!(%tag, "parent ignoring parent-to-child tag");
                Ok(vec![])
            },
        }
    }

    /// Application message for the child.
    pub fn communicate(&self, payload: &Value) -> Result<String, ProtocolError> {
        self.codec.encode(MessageTag::ParentCommunicated, Some(payload))
    }

    /// Disconnect notification for the child.
    pub fn disconnect(&self) -> String {
        MessageTag::ParentDisconnected.prefix().to_owned()
    }

    fn on_loaded(&mut self, status: TabStatus) -> Result<String, ProtocolError> {
        let id = status.id.unwrap_or_else(|| self.ids.next_id());
        let name = format!("{}-{}", self.config.child_name_prefix, self.children.len() + 1);
        let root_name = self.config.root_name.clone();

        let child = self.children.entry(id.clone()).or_insert_with(|| ChildRecord {
            identity: Identity::new(id.clone(), name, root_name),
            acknowledged: false,
            unloaded: false,
            announcements: 0,
            is_embedded: status.is_embedded,
            messages: Vec::new(),
        });
        child.announcements += 1;
        child.acknowledged = false;
        child.unloaded = false;

        debug!(%id, announcements = child.announcements, "granting identity");
        let reply = self.codec.encode_as(MessageTag::HandshakeWithParent, &child.identity)?;
        self.current = Some(id);
        Ok(reply)
    }
}
