//! Child endpoint state machine.
//!
//! This module implements the child side of the handshake: announcing the
//! child, accepting an identity from the parent, bounding the wait with an
//! expiry deadline, and routing application messages and disconnects.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time and restored data as parameters (no stored
//!   environment)
//! - Methods return `Result<Vec<ChildAction>, EndpointError>`
//! - Driver code executes actions (post messages, arm timers, invoke
//!   callbacks, ...)
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ activate ┌─────────────┐ HANDSHAKE_WITH_PARENT ┌─────────────┐
//! │ Init │─────────>│ AwaitingAck │──────────────────────>│ Established │
//! └──────┘          └─────────────┘                       └─────────────┘
//!                     │        │                                 │
//!            deadline │        │ PARENT_DISCONNECTED             │ PARENT_DISCONNECTED
//!                     ↓        ↓                                 ↓
//!               ┌─────────┐  ┌──────────────┐                    │
//!               │ Expired │─>│ Disconnected │<───────────────────┘
//!               └─────────┘  └──────────────┘
//! ```
//!
//! A handshake that arrives after expiry is still accepted and moves the
//! endpoint to `Established`; expiry only stops the child from waiting.
//!
//! # Resources
//!
//! The endpoint emits [`ChildAction::ArmExpiryTimer`] once per activation and
//! [`ChildAction::CancelExpiryTimer`] at most once: the deadline is taken out
//! of the endpoint when cancelled, so later handshakes find nothing to cancel.
//! Likewise [`ChildAction::RegisterListener`] is emitted once at activation
//! and [`ChildAction::UnregisterListener`] once, on disconnect.

use std::time::Instant;

use serde_json::Value;
use tether_proto::{
    Classified, Direction, HandshakeAck, Identity, MessageData, MessageTag, TabInfo, TabStatus,
    classify,
};
use tracing::{debug, info, warn};

use crate::{config::ChildConfig, error::EndpointError};

/// Handshake state of the child endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Created, not yet activated
    Init,
    /// `LOADED` sent, waiting for the parent's handshake
    AwaitingAck,
    /// Identity granted and acknowledged
    Established,
    /// No handshake arrived before the deadline
    Expired,
    /// Parent announced it is tearing down
    Disconnected,
}

/// Events surfaced to the integrating application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildEvent {
    /// Activation finished and `LOADED` was sent
    Ready,
    /// The parent granted an identity
    Initialized(Identity),
    /// Application message from the parent; absent payloads arrive as null
    ParentCommunication(Value),
    /// The parent is tearing down
    ParentDisconnected,
    /// No handshake arrived within the expiry limit
    HandshakeExpired,
}

/// Actions returned by the endpoint for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildAction {
    /// Start listening for inbound messages and keep the handle
    RegisterListener,
    /// Install the page teardown hook
    RegisterUnloadHook,
    /// Deliver an encoded message to the parent
    Post {
        /// Tag of the message, for logging and routing
        tag: MessageTag,
        /// Encoded wire string
        message: String,
    },
    /// Start the handshake expiry timer
    ArmExpiryTimer {
        /// When the timer fires
        deadline: Instant,
    },
    /// Cancel the handshake expiry timer
    CancelExpiryTimer,
    /// Write the identity to the durable slot
    PersistSession(Identity),
    /// Invoke the matching application callback
    Notify(ChildEvent),
    /// Remove the listener registered at activation
    UnregisterListener,
}

/// Message delivered by the host channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel data
    pub data: MessageData,
    /// Origin of the sending context
    pub origin: String,
}

impl InboundMessage {
    /// Create an inbound message.
    pub fn new(data: impl Into<MessageData>, origin: impl Into<String>) -> Self {
        Self { data: data.into(), origin: origin.into() }
    }
}

/// Child endpoint state machine
///
/// Owns the handshake state, the identity and the expiry deadline. Pure: no
/// I/O, time is passed in.
#[derive(Debug, Clone)]
pub struct ChildEndpoint {
    config: ChildConfig,
    state: HandshakeState,
    identity: Option<Identity>,
    /// Identity came from the durable slot and has not been re-granted yet
    restored: bool,
    expiry_deadline: Option<Instant>,
    listening: bool,
}

impl ChildEndpoint {
    /// Create an endpoint in `Init`.
    pub fn new(config: ChildConfig) -> Self {
        Self {
            config,
            state: HandshakeState::Init,
            identity: None,
            restored: false,
            expiry_deadline: None,
            listening: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Configuration the endpoint was built with.
    pub fn config(&self) -> &ChildConfig {
        &self.config
    }

    /// Identity granted by the parent or restored from the slot.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Whether the current identity was restored rather than granted.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Deadline of the live expiry timer, if any.
    pub fn expiry_deadline(&self) -> Option<Instant> {
        self.expiry_deadline
    }

    /// Whether inbound messages are being processed.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// What the child knows about itself.
    pub fn tab_info(&self) -> TabInfo {
        TabInfo::new(self.identity.as_ref(), self.config.is_embedded())
    }

    /// Activate the endpoint.
    ///
    /// `restored` is the identity read from the durable slot, if any.
    ///
    /// # Errors
    /// Returns `InvalidState` unless in `Init`, and `DeadlineOverflow` when
    /// `now` plus the expiry limit cannot be represented.
    pub fn activate(
        &mut self,
        now: Instant,
        restored: Option<Identity>,
    ) -> Result<Vec<ChildAction>, EndpointError> {
        if self.state != HandshakeState::Init {
            return Err(self.invalid_state("activate"));
        }

        let status = TabStatus {
            id: restored.as_ref().map(|identity| identity.id.clone()),
            is_embedded: self.config.is_embedded(),
        };
        let loaded = self.config.codec().encode_as(MessageTag::Loaded, &status)?;
        let limit = self.config.handshake_expiry_limit();
        let deadline =
            now.checked_add(limit).ok_or(EndpointError::DeadlineOverflow { limit })?;

        self.restored = restored.is_some();
        self.identity = restored;
        self.state = HandshakeState::AwaitingAck;
        self.expiry_deadline = Some(deadline);
        self.listening = true;

        info!(
            restored = self.restored,
            is_embedded = self.config.is_embedded(),
            "child endpoint activated"
        );

        Ok(vec![
            ChildAction::RegisterListener,
            ChildAction::RegisterUnloadHook,
            ChildAction::Post { tag: MessageTag::Loaded, message: loaded },
            ChildAction::ArmExpiryTimer { deadline },
            ChildAction::Notify(ChildEvent::Ready),
        ])
    }

    /// Handle a message delivered by the host channel.
    ///
    /// Messages from a non-matching origin, non-text data and untagged text
    /// are dropped without error.
    ///
    /// # Errors
    /// Returns `Protocol(MalformedPayload)` when a handshake or application
    /// payload cannot be deserialized. State is left untouched.
    pub fn handle_message(
        &mut self,
        inbound: &InboundMessage,
    ) -> Result<Vec<ChildAction>, EndpointError> {
        if !self.listening {
            debug!(state = ?self.state, "listener inactive, dropping message");
            return Ok(vec![]);
        }

        if let Some(expected) = self.config.origin()
            && expected != inbound.origin
        {
            debug!(expected, origin = %inbound.origin, "origin mismatch, dropping message");
            return Ok(vec![]);
        }

        let Some(classified) = classify(&inbound.data) else {
            debug!(origin = %inbound.origin, "not a protocol message, dropping");
            return Ok(vec![]);
        };

        match classified.tag {
            MessageTag::HandshakeWithParent => self.on_handshake(&classified),
            MessageTag::ParentCommunicated => self.on_parent_communicated(&classified),
            MessageTag::ParentDisconnected => Ok(self.on_parent_disconnected()),
            tag => {
                debug!(%tag, "child-bound channel carried a child-to-parent tag, dropping");
                Ok(vec![])
            },
        }
    }

    /// Check the expiry deadline.
    ///
    /// Fires [`ChildEvent::HandshakeExpired`] once, the first time `now`
    /// reaches the deadline.
    pub fn tick(&mut self, now: Instant) -> Vec<ChildAction> {
        match self.expiry_deadline {
            Some(deadline) if now >= deadline => {
                self.expiry_deadline = None;
                self.state = HandshakeState::Expired;
                warn!(
                    limit_ms = self.config.handshake_expiry_limit().as_millis() as u64,
                    "handshake expired"
                );
                vec![ChildAction::Notify(ChildEvent::HandshakeExpired)]
            },
            _ => vec![],
        }
    }

    /// Page teardown: tell the parent the child is going away.
    ///
    /// Fire-and-forget. Before activation no hook is installed and nothing is
    /// sent.
    pub fn before_unload(&mut self) -> Result<Vec<ChildAction>, EndpointError> {
        if self.state == HandshakeState::Init {
            return Ok(vec![]);
        }

        let status = TabStatus {
            id: self.identity.as_ref().map(|identity| identity.id.clone()),
            is_embedded: self.config.is_embedded(),
        };
        let message = self.config.codec().encode_as(MessageTag::OnBeforeUnload, &status)?;

        Ok(vec![ChildAction::Post { tag: MessageTag::OnBeforeUnload, message }])
    }

    /// Send an application message to the parent with the `CUSTOM` tag.
    pub fn send_to_parent(&self, payload: &Value) -> Result<Vec<ChildAction>, EndpointError> {
        self.send_with_tag(MessageTag::Custom, Some(payload))
    }

    /// Send a message to the parent with an explicit child-to-parent tag.
    ///
    /// # Errors
    /// `WrongDirection` for parent-to-child tags, `InvalidState` before
    /// activation or after disconnect.
    pub fn send_with_tag(
        &self,
        tag: MessageTag,
        payload: Option<&Value>,
    ) -> Result<Vec<ChildAction>, EndpointError> {
        if tag.direction() != Direction::ChildToParent {
            return Err(EndpointError::WrongDirection { tag });
        }

        if matches!(self.state, HandshakeState::Init | HandshakeState::Disconnected) {
            return Err(self.invalid_state("send to parent"));
        }

        let message = self.config.codec().encode(tag, payload)?;
        Ok(vec![ChildAction::Post { tag, message }])
    }

    fn on_handshake(
        &mut self,
        classified: &Classified<'_>,
    ) -> Result<Vec<ChildAction>, EndpointError> {
        let identity: Identity = self.config.codec().payload_as(classified)?;
        let ack = HandshakeAck { id: identity.id.clone(), is_embedded: self.config.is_embedded() };
        let ack = self.config.codec().encode_as(MessageTag::Handshake, &ack)?;

        let mut actions = Vec::with_capacity(4);
        if self.expiry_deadline.take().is_some() {
            actions.push(ChildAction::CancelExpiryTimer);
        }

        let previous = self.state;
        self.state = HandshakeState::Established;
        self.restored = false;
        self.identity = Some(identity.clone());

        info!(id = %identity.id, name = %identity.name, from = ?previous, "handshake established");

        actions.push(ChildAction::PersistSession(identity.clone()));
        actions.push(ChildAction::Post { tag: MessageTag::Handshake, message: ack });
        actions.push(ChildAction::Notify(ChildEvent::Initialized(identity)));
        Ok(actions)
    }

    fn on_parent_communicated(
        &mut self,
        classified: &Classified<'_>,
    ) -> Result<Vec<ChildAction>, EndpointError> {
        if !self.accepts_application_messages() {
            debug!(state = ?self.state, "application message before handshake, dropping");
            return Ok(vec![]);
        }

        let payload = self.config.codec().payload(classified)?.unwrap_or(Value::Null);
        Ok(vec![ChildAction::Notify(ChildEvent::ParentCommunication(payload))])
    }

    fn on_parent_disconnected(&mut self) -> Vec<ChildAction> {
        let mut actions = vec![ChildAction::Notify(ChildEvent::ParentDisconnected)];
        if self.expiry_deadline.take().is_some() {
            actions.push(ChildAction::CancelExpiryTimer);
        }
        actions.push(ChildAction::UnregisterListener);

        info!(from = ?self.state, "parent disconnected");
        self.state = HandshakeState::Disconnected;
        self.listening = false;
        actions
    }

    /// Established, or still waiting but already holding a restored identity.
    fn accepts_application_messages(&self) -> bool {
        match self.state {
            HandshakeState::Established => true,
            HandshakeState::AwaitingAck => self.restored,
            _ => false,
        }
    }

    fn invalid_state(&self, operation: &str) -> EndpointError {
        EndpointError::InvalidState { state: self.state, operation: operation.to_owned() }
    }
}
