//! Reusable oracle building blocks.

use tether_core::{ChildEvent, HandshakeState};

use crate::scenario::{OracleFn, World};

/// Child ends in `state`.
pub fn state_is(state: HandshakeState) -> OracleFn {
    Box::new(move |world: &World| {
        if world.state() == state {
            Ok(())
        } else {
            Err(format!("expected state {state:?}, found {:?}", world.state()))
        }
    })
}

/// Child completed the handshake and the parent saw the acknowledgment.
pub fn established() -> OracleFn {
    Box::new(|world: &World| {
        state_is(HandshakeState::Established)(world)?;
        let id = world.tab_info().id.ok_or("established child has no id")?;
        let record = world.parent().child(&id).ok_or_else(|| format!("parent never granted {id}"))?;
        if !record.acknowledged {
            return Err(format!("parent has no acknowledgment from {id}"));
        }
        if world.has_timer() {
            return Err("expiry timer still live after handshake".to_owned());
        }
        Ok(())
    })
}

/// Child gave up waiting and reported expiry exactly `times` times.
pub fn expired(times: usize) -> OracleFn {
    Box::new(move |world: &World| {
        let fired = world.count_events(|event| matches!(event, ChildEvent::HandshakeExpired));
        if fired != times {
            return Err(format!("expected {times} expiry notifications, found {fired}"));
        }
        Ok(())
    })
}

/// Child processed a disconnect and released its listener.
pub fn disconnected() -> OracleFn {
    Box::new(|world: &World| {
        state_is(HandshakeState::Disconnected)(world)?;
        if world.has_listener() {
            return Err("listener still registered after disconnect".to_owned());
        }
        if world.has_timer() {
            return Err("expiry timer still live after disconnect".to_owned());
        }
        Ok(())
    })
}

/// Neither side hit a decoding or state error.
pub fn no_errors() -> OracleFn {
    Box::new(|world: &World| {
        if let Some(err) = world.child_errors().first() {
            return Err(format!("child error: {err}"));
        }
        if let Some(err) = world.parent_errors().first() {
            return Err(format!("parent error: {err}"));
        }
        Ok(())
    })
}

/// Every oracle must pass; the first failure wins.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world: &World| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// Wrap an ad hoc check so it can sit next to the stock oracles.
pub fn check(f: impl Fn(&World) -> Result<(), String> + 'static) -> OracleFn {
    Box::new(f)
}
