//! Generic orchestration loop.
//!
//! [`Runtime`] pairs a [`ChildEndpoint`] with a [`Driver`] and executes every
//! action the endpoint returns. It owns the two scoped resources of a child:
//!
//! - the expiry timer, kept as the deadline the event loop sleeps towards and
//!   cleared by the first cancel
//! - the listener handle, stored when the listener is registered and handed
//!   back to the driver, once, on disconnect

use std::time::Instant;

use serde_json::Value;
use tether_core::{
    ChildAction, ChildConfig, ChildEndpoint, ChildEvent, SessionPersistence, TransportSelector,
};
use tether_proto::TabInfo;
use tracing::{debug, trace, warn};

use crate::{ChildCallbacks, Driver, HostEvent, ListenerHandle, RuntimeError};

/// What woke the event loop.
enum Wake {
    Host(Option<HostEvent>),
    Expiry,
}

/// Runs a child endpoint against a host driver.
pub struct Runtime<D: Driver, C: ChildCallbacks> {
    driver: D,
    callbacks: C,
    endpoint: ChildEndpoint,
    selector: TransportSelector,
    persistence: SessionPersistence,
    listener: Option<ListenerHandle>,
    timer: Option<Instant>,
}

impl<D: Driver, C: ChildCallbacks> Runtime<D, C> {
    /// Create a runtime. Nothing happens until [`Self::start`] or
    /// [`Self::run`].
    pub fn new(
        driver: D,
        config: ChildConfig,
        persistence: SessionPersistence,
        callbacks: C,
    ) -> Self {
        let selector = TransportSelector::from_config(&config);
        Self {
            driver,
            callbacks,
            endpoint: ChildEndpoint::new(config),
            selector,
            persistence,
            listener: None,
            timer: None,
        }
    }

    /// The endpoint state machine.
    pub fn endpoint(&self) -> &ChildEndpoint {
        &self.endpoint
    }

    /// The host driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the host driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// The application callbacks.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// What the child knows about itself.
    pub fn tab_info(&self) -> TabInfo {
        self.endpoint.tab_info()
    }

    /// Whether a message listener is currently registered.
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Deadline of the live expiry timer, if any.
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer
    }

    /// Activate the endpoint: restore the stored identity, register the
    /// listener and unload hook, announce the child and arm the timer.
    ///
    /// Called by [`Self::run`] when the configuration enables auto start;
    /// otherwise the integrator calls it.
    ///
    /// # Errors
    ///
    /// When the driver refuses the listener or the unload hook, the endpoint
    /// is put back in `Init` and anything already registered is removed, so
    /// `start` can be retried.
    pub fn start(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let restored = self.persistence.restore();
        let inactive = self.endpoint.clone();
        let actions = self.endpoint.activate(self.driver.now(), restored)?;
        if let Err(err) = self.execute(actions) {
            warn!(%err, "activation failed, endpoint reset");
            self.endpoint = inactive;
            self.timer = None;
            if let Some(handle) = self.listener.take() {
                self.driver.remove_message_listener(handle);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Process one host event.
    ///
    /// # Errors
    ///
    /// A malformed payload is returned as
    /// [`RuntimeError::Endpoint`]; the endpoint is left as it was.
    pub fn dispatch(&mut self, event: HostEvent) -> Result<(), RuntimeError<D::Error>> {
        match event {
            HostEvent::Message(inbound) => {
                if self.listener.is_none() {
                    trace!("no listener registered, ignoring message");
                    return Ok(());
                }
                let actions = self.endpoint.handle_message(&inbound)?;
                self.execute(actions)
            },
            HostEvent::Unload => {
                let actions = self.endpoint.before_unload()?;
                self.execute(actions)
            },
        }
    }

    /// The expiry timer fired.
    pub fn fire_expiry(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let Some(deadline) = self.timer.take() else {
            return Ok(());
        };
        let now = self.driver.now().max(deadline);
        let actions = self.endpoint.tick(now);
        self.execute(actions)
    }

    /// Send an application message to the parent.
    pub fn send_to_parent(&mut self, payload: &Value) -> Result<(), RuntimeError<D::Error>> {
        let actions = self.endpoint.send_to_parent(payload)?;
        self.execute(actions)
    }

    /// Run until the page unloads or the host closes the channel.
    ///
    /// Malformed payloads are reported through
    /// [`ChildCallbacks::on_malformed_payload`] and the loop keeps going.
    pub async fn run(&mut self) -> Result<(), RuntimeError<D::Error>> {
        if self.endpoint.config().auto_start()
            && self.endpoint.state() == tether_core::HandshakeState::Init
        {
            self.start()?;
        }

        loop {
            let deadline = self.timer;
            let wake = tokio::select! {
                event = self.driver.next_event() => Wake::Host(event),
                () = expiry(deadline) => Wake::Expiry,
            };

            match wake {
                Wake::Host(None) => {
                    debug!("host channel closed");
                    return Ok(());
                },
                Wake::Host(Some(HostEvent::Unload)) => {
                    self.dispatch(HostEvent::Unload)?;
                    return Ok(());
                },
                Wake::Host(Some(event)) => match self.dispatch(event) {
                    Err(RuntimeError::Endpoint(err)) if err.is_malformed_payload() => {
                        self.callbacks.on_malformed_payload(&err);
                    },
                    other => other?,
                },
                Wake::Expiry => self.fire_expiry()?,
            }
        }
    }

    fn execute(&mut self, actions: Vec<ChildAction>) -> Result<(), RuntimeError<D::Error>> {
        for action in actions {
            match action {
                ChildAction::RegisterListener => {
                    if self.listener.is_none() {
                        let handle =
                            self.driver.add_message_listener().map_err(RuntimeError::Driver)?;
                        self.listener = Some(handle);
                    }
                },
                ChildAction::RegisterUnloadHook => {
                    self.driver.install_unload_hook().map_err(RuntimeError::Driver)?;
                },
                ChildAction::Post { tag, message } => {
                    match self.selector.send(self.driver.contexts(), &message) {
                        Ok(peer) => debug!(%tag, ?peer, "posted message"),
                        Err(err) => warn!(%tag, %err, "dropping outbound message"),
                    }
                },
                ChildAction::ArmExpiryTimer { deadline } => {
                    self.timer = Some(deadline);
                },
                ChildAction::CancelExpiryTimer => {
                    if self.timer.take().is_none() {
                        trace!("expiry timer already cleared");
                    }
                },
                ChildAction::PersistSession(identity) => {
                    self.persistence.persist(&identity);
                },
                ChildAction::Notify(event) => self.notify(event),
                ChildAction::UnregisterListener => {
                    if let Some(handle) = self.listener.take() {
                        self.driver.remove_message_listener(handle);
                    }
                },
            }
        }
        Ok(())
    }

    fn notify(&mut self, event: ChildEvent) {
        match event {
            ChildEvent::Ready => self.callbacks.on_ready(),
            ChildEvent::Initialized(identity) => self.callbacks.on_initialize(&identity),
            ChildEvent::ParentCommunication(payload) => {
                self.callbacks.on_parent_communication(payload);
            },
            ChildEvent::ParentDisconnected => self.callbacks.on_parent_disconnect(),
            ChildEvent::HandshakeExpired => self.callbacks.on_handshake_expiry(),
        }
    }
}

/// Sleep until `deadline`, or forever if there is none.
async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
