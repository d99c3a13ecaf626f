//! Driver trait for abstracting host I/O.
//!
//! The [`Driver`] trait decouples the runtime from a specific host. A browser
//! binding, an embedding shell or the simulation harness each implement it,
//! while the generic [`crate::Runtime`] handles all orchestration.

use std::{future::Future, time::Instant};

use tether_core::{ContextTree, InboundMessage};

/// Event produced by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A message arrived on the channel
    Message(InboundMessage),
    /// The child's page is being torn down
    Unload,
}

/// Handle to a registered message listener.
///
/// Returned by [`Driver::add_message_listener`] and consumed by
/// [`Driver::remove_message_listener`]. Removal needs the exact handle that
/// registration produced, and consuming it means a listener cannot be removed
/// twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// Wrap a host-specific listener id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Host-specific listener id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Abstracts host I/O for the child runtime.
pub trait Driver: Send {
    /// Host-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Wait for the next host event.
    ///
    /// Only delivers [`HostEvent::Message`] while a listener is registered.
    /// Returns `None` when the host shuts the channel down. Must be cancel
    /// safe: the runtime races it against the expiry timer.
    fn next_event(&mut self) -> impl Future<Output = Option<HostEvent>> + Send;

    /// Start delivering inbound messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the listener.
    fn add_message_listener(&mut self) -> Result<ListenerHandle, Self::Error>;

    /// Stop delivering inbound messages for this listener.
    fn remove_message_listener(&mut self, handle: ListenerHandle);

    /// Arrange for [`HostEvent::Unload`] to be delivered on teardown.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot install the hook.
    fn install_unload_hook(&mut self) -> Result<(), Self::Error>;

    /// Contexts surrounding the child, for outbound delivery.
    fn contexts(&self) -> &dyn ContextTree;

    /// Current time, on the same clock as the runtime's timer.
    fn now(&self) -> Instant;
}
