//! Decode arbitrary channel text.
//!
//! Any input must either be ignored, decode to a message, or fail with a
//! malformed-payload error. Decoded messages must re-encode to text that
//! classifies under the same tag.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_proto::{MessageCodec, MessageData, classify};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let codec = MessageCodec::default();
    let data = MessageData::from(text);
    match codec.decode(&data) {
        Ok(None) => assert!(classify(&data).is_none()),
        Ok(Some(message)) => {
            let encoded = codec.encode_message(&message).expect("decoded payload re-encodes");
            let again = MessageData::from(encoded.as_str());
            let classified = classify(&again).expect("re-encoded message is tagged");
            assert_eq!(classified.tag, message.tag);
        },
        Err(err) => assert!(err.is_malformed_payload()),
    }
});
