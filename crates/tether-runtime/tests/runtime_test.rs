//! Runtime tests against the simulated host.
//!
//! Each test wires a [`Runtime`] to a `SimDriver`, plays the parent's side
//! by hand through a `SimParent`, and checks what reached the callbacks and
//! the host. Timers run on tokio's paused clock, so expiry is instant and
//! deterministic.

use std::time::Duration;

use serde_json::json;
use tether_core::{
    ChildConfig, EndpointError, HandshakeState, InboundMessage, MemorySlot, PeerKind,
    SESSION_KEY, SessionPersistence, SessionSlot, TargetOrigin,
};
use tether_harness::{
    CounterIds, RecordingCallbacks, SimContexts, SimDriver, SimError, SimHandle, SimHost,
    SimParent, SimParentConfig,
};
use tether_proto::{Identity, MessageCodec, MessageData, MessageTag, TabInfo};
use tether_runtime::{HostEvent, Runtime, RuntimeError};
use tokio::time::timeout;

/// Long enough for any expiry in these tests to fire.
const IDLE: Duration = Duration::from_secs(60);

struct Fixture {
    runtime: Runtime<SimDriver, RecordingCallbacks>,
    host: SimHandle,
    parent: SimParent,
    callbacks: RecordingCallbacks,
}

impl Fixture {
    fn new(host: SimHost, config: ChildConfig, slot: &MemorySlot) -> Self {
        let (driver, handle) = host.build();
        let callbacks = RecordingCallbacks::new();
        let persistence = SessionPersistence::new(Box::new(slot.clone()));
        Self {
            runtime: Runtime::new(driver, config, persistence, callbacks.clone()),
            host: handle,
            parent: SimParent::new(SimParentConfig::default(), Box::new(CounterIds::new())),
            callbacks,
        }
    }

    fn window() -> Self {
        Self::new(SimHost::window(), ChildConfig::default(), &MemorySlot::new())
    }

    /// Hand everything the child posted to the parent and queue its replies.
    fn relay(&mut self) -> usize {
        let mut relayed = 0;
        for posted in self.host.drain_posted() {
            let replies = self.parent.receive(&posted.message).expect("parent decodes child");
            for reply in replies {
                assert!(self.host.deliver(reply, self.parent.origin()));
            }
            relayed += 1;
        }
        relayed
    }

    fn deliver(&self, raw: &str) {
        assert!(self.host.deliver(raw, self.parent.origin()));
    }

    async fn run_until_idle(&mut self) {
        let outcome = timeout(IDLE, self.runtime.run()).await;
        assert!(outcome.is_err(), "runtime stopped early: {outcome:?}");
    }
}

fn tag_of(raw: &str) -> MessageTag {
    MessageCodec::default()
        .decode(&MessageData::from(raw))
        .expect("decodable")
        .expect("tagged")
        .tag
}

#[tokio::test(start_paused = true)]
async fn handshake_completes_through_the_runtime() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");

    let announced = fx.host.posted();
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0].peer, PeerKind::Opener);
    assert_eq!(announced[0].target_origin, TargetOrigin::Any);
    assert_eq!(tag_of(&announced[0].message), MessageTag::Loaded);
    assert!(fx.host.unload_hook_installed());

    assert_eq!(fx.relay(), 1);
    fx.host.unload();
    fx.runtime.run().await.expect("clean shutdown");

    let log = fx.callbacks.snapshot();
    assert_eq!(log.ready, 1);
    assert_eq!(log.initialized, vec![Identity::new("tab-1", "child-1", "root")]);
    assert_eq!(fx.runtime.endpoint().state(), HandshakeState::Established);
    assert_eq!(fx.runtime.timer_deadline(), None);

    // Acknowledgment, then the teardown notice
    let tags: Vec<_> = fx.host.posted().iter().map(|posted| tag_of(&posted.message)).collect();
    assert_eq!(tags, vec![MessageTag::Handshake, MessageTag::OnBeforeUnload]);
    fx.relay();
    let record = fx.parent.child("tab-1").expect("granted");
    assert!(record.acknowledged);
    assert!(record.unloaded);
}

#[tokio::test(start_paused = true)]
async fn run_starts_automatically() {
    let mut fx = Fixture::window();
    fx.run_until_idle().await;

    assert_eq!(fx.callbacks.snapshot().ready, 1);
    assert_eq!(fx.host.listeners_added(), 1);
    assert_eq!(fx.host.posted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_parent_expires_exactly_once() {
    let mut fx = Fixture::window();
    let started = tokio::time::Instant::now();
    fx.runtime.start().expect("start");

    let deadline = fx.runtime.timer_deadline().expect("timer armed");
    assert_eq!(deadline - started.into_std(), Duration::from_millis(5_000));

    fx.run_until_idle().await;

    let log = fx.callbacks.snapshot();
    assert_eq!(log.expiries, 1);
    assert!(log.initialized.is_empty());
    assert_eq!(fx.runtime.endpoint().state(), HandshakeState::Expired);
    assert_eq!(fx.runtime.timer_deadline(), None);

    // Still listening: a late handshake is accepted
    assert!(fx.runtime.has_listener());
    fx.relay();
    fx.run_until_idle().await;
    assert_eq!(fx.runtime.endpoint().state(), HandshakeState::Established);
    assert_eq!(fx.callbacks.snapshot().expiries, 1);
}

#[tokio::test(start_paused = true)]
async fn custom_expiry_limit_is_honoured() {
    let config = ChildConfig::builder()
        .handshake_expiry_limit(Duration::from_millis(250))
        .build()
        .expect("valid config");
    let mut fx = Fixture::new(SimHost::window(), config, &MemorySlot::new());

    let started = tokio::time::Instant::now();
    fx.runtime.start().expect("start");
    let deadline = fx.runtime.timer_deadline().expect("timer armed");
    assert_eq!(deadline - started.into_std(), Duration::from_millis(250));

    fx.run_until_idle().await;
    assert_eq!(fx.callbacks.snapshot().expiries, 1);
}

#[tokio::test(start_paused = true)]
async fn handshake_in_time_cancels_expiry() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");
    fx.relay();
    fx.run_until_idle().await;

    let log = fx.callbacks.snapshot();
    assert_eq!(log.expiries, 0);
    assert_eq!(log.initialized.len(), 1);
    assert_eq!(fx.runtime.timer_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn parent_messages_reach_the_callback() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");
    fx.relay();

    let message = fx.parent.communicate(&json!({"theme": "dark"})).expect("encode");
    fx.deliver(&message);
    fx.deliver("__PARENT_COMMUNICATED__");
    fx.run_until_idle().await;

    let log = fx.callbacks.snapshot();
    assert_eq!(log.communications, vec![json!({"theme": "dark"}), serde_json::Value::Null]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_removes_the_listener_once() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");
    fx.relay();

    let disconnect = fx.parent.disconnect();
    fx.deliver(&disconnect);
    fx.deliver(&disconnect);
    fx.run_until_idle().await;

    let log = fx.callbacks.snapshot();
    assert_eq!(log.disconnects, 1);
    assert_eq!(fx.host.listeners_added(), 1);
    assert_eq!(fx.host.listeners_removed(), 1);
    assert_eq!(fx.host.active_listeners(), 0);
    assert!(!fx.runtime.has_listener());
    assert_eq!(fx.runtime.endpoint().state(), HandshakeState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_waiting_prevents_expiry() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");
    fx.host.drain_posted();

    fx.deliver(&fx.parent.disconnect());
    fx.run_until_idle().await;

    let log = fx.callbacks.snapshot();
    assert_eq!(log.disconnects, 1);
    assert_eq!(log.expiries, 0);
    assert_eq!(fx.runtime.timer_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_goes_to_the_callback() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");
    fx.host.drain_posted();

    fx.deliver("__HANDSHAKE_WITH_PARENT__{oops");
    fx.deliver(r#"__HANDSHAKE_WITH_PARENT__{"id":"7","name":"late","parentName":"root"}"#);
    fx.host.unload();
    fx.runtime.run().await.expect("malformed payload is not fatal");

    let log = fx.callbacks.snapshot();
    assert_eq!(log.malformed.len(), 1);
    assert!(log.malformed[0].is_malformed_payload());
    assert_eq!(log.initialized, vec![Identity::new("7", "late", "root")]);
}

#[tokio::test(start_paused = true)]
async fn dispatch_surfaces_malformed_payloads() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");

    let event = HostEvent::Message(InboundMessage::new(
        "__HANDSHAKE_WITH_PARENT__[1,2",
        fx.parent.origin(),
    ));
    let err = fx.runtime.dispatch(event).expect_err("malformed");
    assert!(err.is_malformed_payload());
    assert_eq!(fx.runtime.endpoint().state(), HandshakeState::AwaitingAck);
}

#[tokio::test(start_paused = true)]
async fn origin_filter_drops_foreign_messages() {
    let config = ChildConfig::builder().origin("https://parent.example").build().expect("valid");
    let mut fx = Fixture::new(SimHost::window(), config, &MemorySlot::new());
    fx.runtime.start().expect("start");

    let announced = fx.host.posted();
    assert_eq!(
        announced[0].target_origin,
        TargetOrigin::Exact("https://parent.example".to_owned())
    );
    fx.host.drain_posted();

    assert!(fx.host.deliver(
        r#"__HANDSHAKE_WITH_PARENT__{"id":"x","name":"evil","parentName":"root"}"#,
        "https://evil.example",
    ));
    fx.run_until_idle().await;

    let log = fx.callbacks.snapshot();
    assert!(log.initialized.is_empty());
    assert_eq!(log.expiries, 1);
}

#[tokio::test(start_paused = true)]
async fn manual_start_waits_for_the_integrator() {
    let config = ChildConfig::builder().auto_start(false).build().expect("valid");
    let mut fx = Fixture::new(SimHost::window(), config, &MemorySlot::new());

    fx.run_until_idle().await;
    assert_eq!(fx.runtime.endpoint().state(), HandshakeState::Init);
    assert_eq!(fx.callbacks.snapshot().ready, 0);
    assert!(fx.host.posted().is_empty());
    assert_eq!(fx.host.listeners_added(), 0);

    fx.runtime.start().expect("start");
    assert_eq!(fx.callbacks.snapshot().ready, 1);
    assert_eq!(fx.host.posted().len(), 1);

    let again = fx.runtime.start();
    assert!(matches!(again, Err(RuntimeError::Endpoint(EndpointError::InvalidState { .. }))));
}

#[tokio::test(start_paused = true)]
async fn identity_survives_a_reload() {
    let slot = MemorySlot::new();

    let mut first = Fixture::new(SimHost::window(), ChildConfig::default(), &slot);
    first.runtime.start().expect("start");
    first.relay();
    first.host.unload();
    first.runtime.run().await.expect("clean shutdown");
    first.relay();

    // Same page, same slot, fresh runtime; the parent carries over.
    let mut second = Fixture::new(SimHost::window(), ChildConfig::default(), &slot);
    second.parent = first.parent;
    second.runtime.start().expect("start");
    assert_eq!(second.runtime.tab_info().id.as_deref(), Some("tab-1"));

    second.relay();
    second.host.unload();
    second.runtime.run().await.expect("clean shutdown");

    let log = second.callbacks.snapshot();
    assert_eq!(log.initialized, vec![Identity::new("tab-1", "child-1", "root")]);
    let record = second.parent.child("tab-1").expect("granted");
    assert_eq!(record.announcements, 2);
    assert_eq!(second.parent.children().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stored_identity_is_known_before_any_handshake() {
    let mut slot = MemorySlot::new();
    slot.set(SESSION_KEY, r#"{"id":"42","name":"child-1","parentName":"root"}"#).expect("set");
    let config = ChildConfig::builder().embedded(true).build().expect("valid");
    let mut fx = Fixture::new(SimHost::frame(), config, &slot);

    fx.runtime.start().expect("start");

    assert_eq!(
        fx.runtime.tab_info(),
        TabInfo {
            id: Some("42".to_owned()),
            name: Some("child-1".to_owned()),
            parent_name: Some("root".to_owned()),
            is_embedded: true,
        }
    );
    assert!(fx.callbacks.snapshot().initialized.is_empty());
}

#[tokio::test(start_paused = true)]
async fn child_messages_reach_the_parent() {
    let mut fx = Fixture::window();
    fx.runtime.start().expect("start");

    let early = fx.runtime.send_to_parent(&json!({"early": true}));
    assert!(early.is_ok(), "sending while waiting is allowed: {early:?}");

    fx.relay();
    fx.run_until_idle().await;
    fx.runtime.send_to_parent(&json!({"clicked": 3})).expect("send");
    fx.relay();

    let record = fx.parent.child("tab-1").expect("granted");
    assert_eq!(record.messages, vec![json!({"early": true}), json!({"clicked": 3})]);
}

#[tokio::test(start_paused = true)]
async fn embedded_frame_talks_to_the_embedding_parent() {
    let config = ChildConfig::builder().embedded(true).build().expect("valid");
    let mut fx = Fixture::new(SimHost::frame(), config, &MemorySlot::new());
    fx.runtime.start().expect("start");

    assert_eq!(fx.host.posted()[0].peer, PeerKind::EmbeddingParent);
    assert!(fx.runtime.tab_info().is_embedded);
}

#[tokio::test(start_paused = true)]
async fn isolated_child_starts_without_a_transport() {
    let (driver, host) = SimHost::with_contexts(SimContexts::isolated()).build();
    let callbacks = RecordingCallbacks::new();
    let mut runtime = Runtime::new(
        driver,
        ChildConfig::default(),
        SessionPersistence::unavailable(),
        callbacks.clone(),
    );

    runtime.start().expect("missing transport is not fatal");
    assert!(host.posted().is_empty());
    assert_eq!(callbacks.snapshot().ready, 1);
    assert_eq!(runtime.endpoint().state(), HandshakeState::AwaitingAck);
}

#[tokio::test(start_paused = true)]
async fn refused_listener_is_a_driver_error() {
    let (driver, host) = SimHost::window().refuse_listener().build();
    let callbacks = RecordingCallbacks::new();
    let mut runtime = Runtime::new(
        driver,
        ChildConfig::default(),
        SessionPersistence::unavailable(),
        callbacks.clone(),
    );

    let err = runtime.start().expect_err("listener refused");
    assert!(matches!(err, RuntimeError::Driver(SimError::ListenerRefused)));

    // Nothing half-started: no announcement, no timer, back in Init
    assert_eq!(runtime.endpoint().state(), HandshakeState::Init);
    assert_eq!(runtime.endpoint().expiry_deadline(), None);
    assert_eq!(runtime.timer_deadline(), None);
    assert!(!runtime.has_listener());
    assert!(host.posted().is_empty());
    assert_eq!(callbacks.snapshot().ready, 0);

    host.set_refuse_listener(false);
    runtime.start().expect("retry succeeds");
    assert_eq!(runtime.endpoint().state(), HandshakeState::AwaitingAck);
    assert!(runtime.timer_deadline().is_some());
    assert_eq!(host.active_listeners(), 1);
    assert_eq!(host.posted().len(), 1);

    let outcome = timeout(IDLE, runtime.run()).await;
    assert!(outcome.is_err(), "runtime stopped early: {outcome:?}");
    assert_eq!(callbacks.snapshot().expiries, 1);
}
