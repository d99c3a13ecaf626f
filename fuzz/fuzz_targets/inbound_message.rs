//! Feed arbitrary channel text to an activated child.
//!
//! The endpoint must never panic, and a rejected message must leave its
//! state unchanged.

#![no_main]

use std::time::Instant;

use libfuzzer_sys::fuzz_target;
use tether_core::{ChildConfig, ChildEndpoint, InboundMessage};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut endpoint = ChildEndpoint::new(ChildConfig::default());
    if endpoint.activate(Instant::now(), None).is_err() {
        return;
    }

    for line in text.split('\n') {
        let before = endpoint.state();
        if endpoint.handle_message(&InboundMessage::new(line, "https://fuzz.example")).is_err() {
            assert_eq!(endpoint.state(), before);
        }
    }
});
