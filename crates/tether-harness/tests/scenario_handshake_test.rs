//! Scenario tests for the child handshake.
//!
//! The child announces itself on activation, the simulated parent answers
//! with an identity, and the child acknowledges. These tests drive that flow
//! through the scenario framework and verify the final world with oracles.

use serde_json::json;
use tether_core::{ChildConfig, ChildEvent, HandshakeState, PeerKind, SESSION_KEY, SessionSlot};
use tether_harness::{
    IdSource, SimContexts, SimParentConfig,
    scenario::{Scenario, oracle},
};
use tether_proto::Identity;

/// Hands out the same id every time.
struct FixedId(&'static str);

impl IdSource for FixedId {
    fn next_id(&mut self) -> String {
        self.0.to_owned()
    }
}

#[test]
fn scenario_handshake_opened_window() {
    let result = Scenario::new("opened window handshake")
        .seed(7)
        .oracle(oracle::all_of(vec![
            oracle::established(),
            oracle::no_errors(),
            oracle::check(|world| {
                let ready = world.count_events(|event| matches!(event, ChildEvent::Ready));
                let initialized =
                    world.count_events(|event| matches!(event, ChildEvent::Initialized(_)));
                if (ready, initialized) != (1, 1) {
                    return Err(format!("ready/init counts {ready}/{initialized}"));
                }

                // LOADED and the acknowledgment
                if world.sent_by_child() != 2 {
                    return Err(format!("child sent {} messages", world.sent_by_child()));
                }
                if world.delivered_to_child() != 1 {
                    return Err(format!("child received {} messages", world.delivered_to_child()));
                }
                Ok(())
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_handshake_identity_is_granted_by_parent() {
    let result = Scenario::new("identity from parent")
        .ids(Box::new(FixedId("42")))
        .parent_config(SimParentConfig { root_name: "root".into(), ..SimParentConfig::default() })
        .oracle(Box::new(|world| {
            let expected = Identity::new("42", "child-1", "root");
            let info = world.tab_info();
            if info.id.as_deref() != Some("42")
                || info.name.as_deref() != Some("child-1")
                || info.parent_name.as_deref() != Some("root")
            {
                return Err(format!("unexpected tab info {info:?}"));
            }

            let initialized = world
                .events()
                .iter()
                .find_map(|event| match event {
                    ChildEvent::Initialized(identity) => Some(identity.clone()),
                    _ => None,
                })
                .ok_or("no initialization event")?;
            if initialized != expected {
                return Err(format!("initialized with {initialized:?}"));
            }
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_handshake_persists_identity() {
    let result = Scenario::new("identity persisted")
        .ids(Box::new(FixedId("42")))
        .oracle(Box::new(|world| {
            let stored = world
                .slot()
                .get(SESSION_KEY)
                .map_err(|err| err.to_string())?
                .ok_or("nothing persisted")?;
            let identity: Identity = serde_json::from_str(&stored).map_err(|err| err.to_string())?;
            if identity != Identity::new("42", "child-1", "root") {
                return Err(format!("persisted {identity:?}"));
            }
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_handshake_embedded_frame() {
    let config = ChildConfig::builder().embedded(true).build().unwrap();

    let result = Scenario::new("embedded frame handshake")
        .child_config(config)
        .contexts(SimContexts::isolated().with_embedding_parent().with_top())
        .oracle(oracle::all_of(vec![
            oracle::established(),
            oracle::check(|world| {
                if world.routes().iter().any(|peer| *peer != PeerKind::EmbeddingParent) {
                    return Err(format!("routed via {:?}", world.routes()));
                }
                let id = world.tab_info().id.ok_or("no id")?;
                let record = world.parent().child(&id).ok_or("parent lost the child")?;
                if !record.is_embedded {
                    return Err("parent does not know the child is embedded".to_owned());
                }
                if !world.tab_info().is_embedded {
                    return Err("child does not report itself embedded".to_owned());
                }
                Ok(())
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_handshake_not_embedded_falls_back_to_top() {
    // A frame whose config says it is not embedded talks to the top context
    let result = Scenario::new("top fallback")
        .contexts(SimContexts::isolated().with_embedding_parent().with_top())
        .oracle(oracle::all_of(vec![
            oracle::established(),
            oracle::check(|world| {
                if world.routes() != [PeerKind::Top, PeerKind::Top] {
                    return Err(format!("routed via {:?}", world.routes()));
                }
                Ok(())
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_handshake_origin_mismatch_is_ignored() {
    let config = ChildConfig::builder().origin("https://trusted.example").build().unwrap();

    let result = Scenario::new("untrusted parent")
        .child_config(config)
        .oracle(oracle::all_of(vec![
            oracle::state_is(HandshakeState::AwaitingAck),
            oracle::no_errors(),
            oracle::check(|world| {
                if world.tab_info().id.is_some() {
                    return Err("child accepted an identity from the wrong origin".to_owned());
                }
                Ok(())
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_handshake_origin_match_is_accepted() {
    let config = ChildConfig::builder().origin("https://trusted.example").build().unwrap();
    let parent = SimParentConfig {
        origin: "https://trusted.example".into(),
        ..SimParentConfig::default()
    };

    let result = Scenario::new("trusted parent")
        .child_config(config)
        .parent_config(parent)
        .oracle(oracle::established())
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_handshake_application_messages_both_ways() {
    let result = Scenario::new("application messages")
        .ids(Box::new(FixedId("42")))
        .parent_sends(json!({"theme": "dark"}))
        .child_sends(json!({"clicked": 3}))
        .oracle(oracle::all_of(vec![
            oracle::established(),
            oracle::no_errors(),
            oracle::check(|world| {
                let received: Vec<_> = world
                    .events()
                    .iter()
                    .filter_map(|event| match event {
                        ChildEvent::ParentCommunication(payload) => Some(payload.clone()),
                        _ => None,
                    })
                    .collect();
                if received != vec![json!({"theme": "dark"})] {
                    return Err(format!("child received {received:?}"));
                }

                let record = world.parent().child("42").ok_or("parent lost the child")?;
                if record.messages != vec![json!({"clicked": 3})] {
                    return Err(format!("parent received {:?}", record.messages));
                }
                Ok(())
            }),
        ]))
        .run();

    assert!(result.is_ok(), "scenario failed: {result:?}");
}

#[test]
fn scenario_oracle_failure_names_scenario() {
    let result = Scenario::new("deliberately failing")
        .oracle(oracle::state_is(HandshakeState::Expired))
        .run();

    let err = result.unwrap_err();
    assert!(err.contains("deliberately failing"), "{err}");
    assert!(err.contains("Expired"), "{err}");
}
