//! World state for scenario execution.
//!
//! The World owns the child endpoint, the simulated parent and the durable
//! slot, executes child actions synchronously, tracks metrics, and provides
//! the accessors oracles verify against.

use std::time::{Duration, Instant};

use serde_json::Value;
use tether_core::{
    ChildAction, ChildConfig, ChildEndpoint, ChildEvent, EndpointError, HandshakeState,
    InboundMessage, MemorySlot, PeerKind, SessionPersistence, TransportSelector,
};
use tether_proto::{ProtocolError, TabInfo};
use tracing::debug;

use crate::{sim_host::SimContexts, sim_parent::SimParent};

/// World state containing the child, the parent and metrics.
pub struct World {
    config: ChildConfig,
    child: ChildEndpoint,
    parent: SimParent,
    contexts: SimContexts,
    selector: TransportSelector,
    slot: MemorySlot,
    now: Instant,
    timer: Option<Instant>,
    listener: bool,
    drop_parent_replies: bool,
    events: Vec<ChildEvent>,
    routes: Vec<PeerKind>,
    unroutable: usize,
    child_errors: Vec<EndpointError>,
    parent_errors: Vec<ProtocolError>,
    sent_by_child: usize,
    delivered_to_child: usize,
    dropped_to_child: usize,
    activations: usize,
    listeners_registered: usize,
    listeners_removed: usize,
    timers_armed: usize,
    timers_cancelled: usize,
}

impl World {
    pub(crate) fn new(config: ChildConfig, parent: SimParent, contexts: SimContexts) -> Self {
        let selector = TransportSelector::from_config(&config);
        Self {
            child: ChildEndpoint::new(config.clone()),
            config,
            parent,
            contexts,
            selector,
            slot: MemorySlot::new(),
            now: Instant::now(),
            timer: None,
            listener: false,
            drop_parent_replies: false,
            events: Vec::new(),
            routes: Vec::new(),
            unroutable: 0,
            child_errors: Vec::new(),
            parent_errors: Vec::new(),
            sent_by_child: 0,
            delivered_to_child: 0,
            dropped_to_child: 0,
            activations: 0,
            listeners_registered: 0,
            listeners_removed: 0,
            timers_armed: 0,
            timers_cancelled: 0,
        }
    }

    /// The child endpoint.
    pub fn child(&self) -> &ChildEndpoint {
        &self.child
    }

    /// Child handshake state.
    pub fn state(&self) -> HandshakeState {
        self.child.state()
    }

    /// What the child knows about itself.
    pub fn tab_info(&self) -> TabInfo {
        self.child.tab_info()
    }

    /// The simulated parent.
    pub fn parent(&self) -> &SimParent {
        &self.parent
    }

    /// The child's durable slot.
    pub fn slot(&self) -> &MemorySlot {
        &self.slot
    }

    /// Every event the child reported, across reloads.
    pub fn events(&self) -> &[ChildEvent] {
        &self.events
    }

    /// Number of reported events matching `wanted`.
    pub fn count_events(&self, wanted: impl Fn(&ChildEvent) -> bool) -> usize {
        self.events.iter().filter(|event| wanted(event)).count()
    }

    /// Peer each child message was routed to, in send order.
    pub fn routes(&self) -> &[PeerKind] {
        &self.routes
    }

    /// Child messages that found no peer to go to.
    pub fn unroutable(&self) -> usize {
        self.unroutable
    }

    /// Errors the child returned for inbound messages.
    pub fn child_errors(&self) -> &[EndpointError] {
        &self.child_errors
    }

    /// Errors the parent hit decoding child messages.
    pub fn parent_errors(&self) -> &[ProtocolError] {
        &self.parent_errors
    }

    /// Messages posted by the child.
    pub fn sent_by_child(&self) -> usize {
        self.sent_by_child
    }

    /// Messages delivered to the child.
    pub fn delivered_to_child(&self) -> usize {
        self.delivered_to_child
    }

    /// Parent replies lost in transit.
    pub fn dropped_to_child(&self) -> usize {
        self.dropped_to_child
    }

    /// Number of activations (one plus the number of reloads).
    pub fn activations(&self) -> usize {
        self.activations
    }

    /// Whether a listener is registered right now.
    pub fn has_listener(&self) -> bool {
        self.listener
    }

    /// Total listener registrations and removals.
    pub fn listener_counts(&self) -> (usize, usize) {
        (self.listeners_registered, self.listeners_removed)
    }

    /// Total timer arms and cancels.
    pub fn timer_counts(&self) -> (usize, usize) {
        (self.timers_armed, self.timers_cancelled)
    }

    /// Whether an expiry timer is live right now.
    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub(crate) fn set_drop_parent_replies(&mut self, drop: bool) {
        self.drop_parent_replies = drop;
    }

    pub(crate) fn activate(&mut self) -> Result<(), String> {
        let persistence = SessionPersistence::new(Box::new(self.slot.clone()));
        let restored = persistence.restore();
        let actions = self
            .child
            .activate(self.now, restored)
            .map_err(|err| format!("activation failed: {err}"))?;
        self.activations += 1;
        self.execute(actions);
        self.pump();
        Ok(())
    }

    pub(crate) fn advance(&mut self, by: Duration) -> Result<(), String> {
        self.now = self
            .now
            .checked_add(by)
            .ok_or_else(|| format!("clock cannot advance by {by:?}"))?;
        if let Some(deadline) = self.timer
            && self.now >= deadline
        {
            self.timer = None;
            let actions = self.child.tick(self.now);
            self.execute(actions);
            self.pump();
        }
        Ok(())
    }

    /// Page reload: teardown notice, then a fresh endpoint over the same slot.
    pub(crate) fn reload(&mut self) -> Result<(), String> {
        self.unload();
        self.child = ChildEndpoint::new(self.config.clone());
        self.timer = None;
        self.listener = false;
        self.activate()
    }

    pub(crate) fn unload(&mut self) {
        match self.child.before_unload() {
            Ok(actions) => self.execute(actions),
            Err(err) => self.child_errors.push(err),
        }
        self.pump();
    }

    pub(crate) fn parent_sends(&mut self, payload: &Value) {
        match self.parent.communicate(payload) {
            Ok(raw) => {
                let origin = self.parent.origin().to_owned();
                self.deliver_to_child(&InboundMessage::new(raw, origin));
            },
            Err(err) => self.parent_errors.push(err),
        }
        self.pump();
    }

    pub(crate) fn parent_disconnects(&mut self) {
        let raw = self.parent.disconnect();
        let origin = self.parent.origin().to_owned();
        self.deliver_to_child(&InboundMessage::new(raw, origin));
        self.pump();
    }

    pub(crate) fn child_sends(&mut self, payload: &Value) {
        match self.child.send_to_parent(payload) {
            Ok(actions) => self.execute(actions),
            Err(err) => self.child_errors.push(err),
        }
        self.pump();
    }

    pub(crate) fn inject(&mut self, inbound: &InboundMessage) {
        self.deliver_to_child(inbound);
        self.pump();
    }

    /// Shuttle messages between child and parent until both are quiet.
    fn pump(&mut self) {
        loop {
            let posted = self.contexts.drain();
            if posted.is_empty() {
                return;
            }

            for message in posted {
                self.sent_by_child += 1;
                let replies = match self.parent.receive(&message.message) {
                    Ok(replies) => replies,
                    Err(err) => {
                        self.parent_errors.push(err);
                        continue;
                    },
                };

                for reply in replies {
                    if self.drop_parent_replies {
                        debug!("dropping parent reply in transit");
                        self.dropped_to_child += 1;
                        continue;
                    }
                    let origin = self.parent.origin().to_owned();
                    self.deliver_to_child(&InboundMessage::new(reply, origin));
                }
            }
        }
    }

    fn deliver_to_child(&mut self, inbound: &InboundMessage) {
        if !self.listener {
            debug!("child has no listener, message lost");
            return;
        }

        self.delivered_to_child += 1;
        match self.child.handle_message(inbound) {
            Ok(actions) => self.execute(actions),
            Err(err) => self.child_errors.push(err),
        }
    }

    fn execute(&mut self, actions: Vec<ChildAction>) {
        for action in actions {
            match action {
                ChildAction::RegisterListener => {
                    self.listener = true;
                    self.listeners_registered += 1;
                },
                ChildAction::RegisterUnloadHook => {},
                ChildAction::Post { message, .. } => {
                    match self.selector.send(&self.contexts, &message) {
                        Ok(peer) => self.routes.push(peer),
                        Err(err) => {
                            debug!(%err, "child message had nowhere to go");
                            self.unroutable += 1;
                        },
                    }
                },
                ChildAction::ArmExpiryTimer { deadline } => {
                    self.timer = Some(deadline);
                    self.timers_armed += 1;
                },
                ChildAction::CancelExpiryTimer => {
                    if self.timer.take().is_some() {
                        self.timers_cancelled += 1;
                    }
                },
                ChildAction::PersistSession(identity) => {
                    SessionPersistence::new(Box::new(self.slot.clone())).persist(&identity);
                },
                ChildAction::Notify(event) => self.events.push(event),
                ChildAction::UnregisterListener => {
                    if self.listener {
                        self.listener = false;
                        self.listeners_removed += 1;
                    }
                },
            }
        }
    }
}
