//! Simulated host for the child runtime.
//!
//! [`SimHost`] builds a [`SimDriver`] (handed to the runtime) and a
//! [`SimHandle`] (kept by the test) that share state. The handle injects
//! channel messages and teardown, and inspects what the child posted and
//! which listeners are registered.
//!
//! Time comes from the tokio clock so that `tokio::time::pause` drives both
//! the runtime's timer and [`SimDriver::now`].

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use tether_core::{ContextTree, InboundMessage, PeerContext, PeerKind, TargetOrigin};
use tether_proto::MessageData;
use tether_runtime::{Driver, HostEvent, ListenerHandle};
use tokio::sync::mpsc;
use tracing::trace;

/// A message the child posted to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    /// Peer that received it
    pub peer: PeerKind,
    /// Wire string
    pub message: String,
    /// Origin restriction it was posted with
    pub target_origin: TargetOrigin,
}

type Outbox = Arc<Mutex<Vec<Posted>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A peer context recording everything posted to it.
#[derive(Debug, Clone)]
struct SimPeer {
    kind: PeerKind,
    outbox: Outbox,
}

impl PeerContext for SimPeer {
    fn post_message(&self, message: &str, target_origin: &TargetOrigin) {
        trace!(peer = ?self.kind, %target_origin, "child posted message");
        lock(&self.outbox).push(Posted {
            peer: self.kind,
            message: message.to_owned(),
            target_origin: target_origin.clone(),
        });
    }
}

/// Context tree with a configurable set of peers sharing one outbox.
#[derive(Debug, Clone, Default)]
pub struct SimContexts {
    embedding_parent: Option<SimPeer>,
    opener: Option<SimPeer>,
    top: Option<SimPeer>,
    outbox: Outbox,
}

impl SimContexts {
    /// No peers at all: every send reports no transport.
    pub fn isolated() -> Self {
        Self::default()
    }

    /// Add an embedding parent frame.
    #[must_use]
    pub fn with_embedding_parent(mut self) -> Self {
        self.embedding_parent = Some(self.peer(PeerKind::EmbeddingParent));
        self
    }

    /// Add an opener.
    #[must_use]
    pub fn with_opener(mut self) -> Self {
        self.opener = Some(self.peer(PeerKind::Opener));
        self
    }

    /// Add a distinct top-level ancestor.
    #[must_use]
    pub fn with_top(mut self) -> Self {
        self.top = Some(self.peer(PeerKind::Top));
        self
    }

    /// Everything posted so far, oldest first.
    pub fn posted(&self) -> Vec<Posted> {
        lock(&self.outbox).clone()
    }

    /// Remove and return everything posted so far.
    pub fn drain(&self) -> Vec<Posted> {
        std::mem::take(&mut *lock(&self.outbox))
    }

    fn peer(&self, kind: PeerKind) -> SimPeer {
        SimPeer { kind, outbox: Arc::clone(&self.outbox) }
    }
}

impl ContextTree for SimContexts {
    fn embedding_parent(&self) -> Option<&dyn PeerContext> {
        self.embedding_parent.as_ref().map(|peer| peer as &dyn PeerContext)
    }

    fn opener(&self) -> Option<&dyn PeerContext> {
        self.opener.as_ref().map(|peer| peer as &dyn PeerContext)
    }

    fn top(&self) -> Option<&dyn PeerContext> {
        self.top.as_ref().map(|peer| peer as &dyn PeerContext)
    }
}

/// Errors produced by the simulated host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// Listener registration was configured to fail
    #[error("host refused to register a message listener")]
    ListenerRefused,
}

#[derive(Debug, Default)]
struct HostState {
    listeners: HashSet<u64>,
    next_listener: u64,
    listeners_added: usize,
    listeners_removed: usize,
    unload_hook_installed: bool,
    refuse_listener: bool,
}

/// Builder for a simulated host.
#[derive(Debug, Default)]
pub struct SimHost {
    contexts: SimContexts,
    refuse_listener: bool,
}

impl SimHost {
    /// Host whose child was opened as a new window (opener present).
    pub fn window() -> Self {
        Self { contexts: SimContexts::default().with_opener(), refuse_listener: false }
    }

    /// Host whose child is an embedded frame (embedding parent and top).
    pub fn frame() -> Self {
        Self {
            contexts: SimContexts::default().with_embedding_parent().with_top(),
            refuse_listener: false,
        }
    }

    /// Host with a custom context tree.
    pub fn with_contexts(contexts: SimContexts) -> Self {
        Self { contexts, refuse_listener: false }
    }

    /// Make listener registration fail.
    #[must_use]
    pub fn refuse_listener(mut self) -> Self {
        self.refuse_listener = true;
        self
    }

    /// Produce the driver and the test handle.
    pub fn build(self) -> (SimDriver, SimHandle) {
        let (sender, events) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(HostState {
            refuse_listener: self.refuse_listener,
            ..HostState::default()
        }));

        let driver =
            SimDriver { events, contexts: self.contexts.clone(), state: Arc::clone(&state) };
        let handle = SimHandle { sender, contexts: self.contexts, state };
        (driver, handle)
    }
}

/// [`Driver`] backed by in-memory state.
#[derive(Debug)]
pub struct SimDriver {
    events: mpsc::UnboundedReceiver<HostEvent>,
    contexts: SimContexts,
    state: Arc<Mutex<HostState>>,
}

impl Driver for SimDriver {
    type Error = SimError;

    fn next_event(&mut self) -> impl std::future::Future<Output = Option<HostEvent>> + Send {
        async move {
            loop {
                let event = self.events.recv().await?;
                let listening = !lock(&self.state).listeners.is_empty();
                match event {
                    HostEvent::Message(_) if !listening => {
                        trace!("no listener registered, message discarded by host");
                    },
                    other => return Some(other),
                }
            }
        }
    }

    fn add_message_listener(&mut self) -> Result<ListenerHandle, SimError> {
        let mut state = lock(&self.state);
        if state.refuse_listener {
            return Err(SimError::ListenerRefused);
        }
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id);
        state.listeners_added += 1;
        Ok(ListenerHandle::new(id))
    }

    fn remove_message_listener(&mut self, handle: ListenerHandle) {
        let mut state = lock(&self.state);
        if state.listeners.remove(&handle.id()) {
            state.listeners_removed += 1;
        }
    }

    fn install_unload_hook(&mut self) -> Result<(), SimError> {
        lock(&self.state).unload_hook_installed = true;
        Ok(())
    }

    fn contexts(&self) -> &dyn ContextTree {
        &self.contexts
    }

    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Test-side handle to a simulated host.
#[derive(Debug, Clone)]
pub struct SimHandle {
    sender: mpsc::UnboundedSender<HostEvent>,
    contexts: SimContexts,
    state: Arc<Mutex<HostState>>,
}

impl SimHandle {
    /// Deliver channel data from `origin`. Returns false once the driver is
    /// gone.
    pub fn deliver(&self, data: impl Into<MessageData>, origin: &str) -> bool {
        self.sender.send(HostEvent::Message(InboundMessage::new(data, origin))).is_ok()
    }

    /// Tear the child's page down.
    pub fn unload(&self) -> bool {
        self.sender.send(HostEvent::Unload).is_ok()
    }

    /// Everything the child posted so far.
    pub fn posted(&self) -> Vec<Posted> {
        self.contexts.posted()
    }

    /// Remove and return everything the child posted so far.
    pub fn drain_posted(&self) -> Vec<Posted> {
        self.contexts.drain()
    }

    /// Number of listeners currently registered.
    pub fn active_listeners(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    /// Total listener registrations.
    pub fn listeners_added(&self) -> usize {
        lock(&self.state).listeners_added
    }

    /// Total successful listener removals.
    pub fn listeners_removed(&self) -> usize {
        lock(&self.state).listeners_removed
    }

    /// Make later listener registrations fail, or succeed again.
    pub fn set_refuse_listener(&self, refuse: bool) {
        lock(&self.state).refuse_listener = refuse;
    }

    /// Whether the teardown hook was installed.
    pub fn unload_hook_installed(&self) -> bool {
        lock(&self.state).unload_hook_installed
    }
}
