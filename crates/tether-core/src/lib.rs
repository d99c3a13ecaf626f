//! Tether protocol core logic
//!
//! Pure state machine logic for the child side of the Tether handshake,
//! completely decoupled from I/O. The child announces itself, receives an
//! identity from its parent, acknowledges it, and from then on accepts
//! application messages until the parent disconnects.
//!
//! # Architecture
//!
//! [`ChildEndpoint`] never touches a timer, a listener or a storage slot. Its
//! methods take the current time and any restored data as parameters and
//! return declarative [`ChildAction`]s. A runtime or test harness executes
//! them: posting through the [`TransportSelector`], writing the
//! [`SessionPersistence`] slot, arming and cancelling the expiry timer,
//! registering and removing the message listener, and invoking callbacks.
//!
//! # Components
//!
//! - [`endpoint`]: Handshake state machine (activation, handshake, expiry,
//!   application messages, disconnect, teardown)
//! - [`config`]: Validated, immutable endpoint configuration
//! - [`transport`]: Peer context abstraction and send-time peer selection
//! - [`session`]: Durable slot abstraction and identity persistence policy
//! - [`error`]: Endpoint, transport and configuration errors

pub mod config;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod transport;

pub use config::{ChildConfig, ChildConfigBuilder, DEFAULT_HANDSHAKE_EXPIRY, MAX_HANDSHAKE_EXPIRY};
pub use endpoint::{ChildAction, ChildEndpoint, ChildEvent, HandshakeState, InboundMessage};
pub use error::{ConfigError, EndpointError, TransportError};
pub use session::{MemorySlot, SESSION_KEY, SessionPersistence, SessionSlot, SlotError};
pub use transport::{ContextTree, PeerContext, PeerKind, TargetOrigin, TransportSelector};
