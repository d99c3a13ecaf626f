//! Wire format for the Tether protocol.
//!
//! Every message travels as a single string: a literal type tag followed by
//! the serialized payload. The channel carrying these strings is
//! origin-agnostic and unreliable, so the receiving side classifies each
//! message by the one tag it starts with and only then parses the remainder.
//!
//! Tags form a closed set ([`MessageTag`]). Classification is a strict prefix
//! match resolved once per message; a tag literal that happens to appear
//! inside a payload never changes how the message is read.
//!
//! Payloads are structured values (`serde_json::Value`) run through a
//! pluggable [`PayloadCodec`]. The default is [`JsonCodec`].
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod errors;
pub mod message;
pub mod payloads;
pub mod tag;

pub use codec::{Classified, CodecError, JsonCodec, MessageCodec, PayloadCodec, classify};
pub use errors::{ProtocolError, Result};
pub use message::{Message, MessageData};
pub use payloads::{HandshakeAck, Identity, TabInfo, TabStatus};
pub use tag::{Direction, MessageTag};
