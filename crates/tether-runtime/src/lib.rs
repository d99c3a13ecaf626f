//! Runtime for the Tether child endpoint
//!
//! Executes the actions produced by [`tether_core::ChildEndpoint`] against a
//! host, so the same orchestration runs in production and in simulation.
//!
//! # Components
//!
//! - [`Driver`]: Trait for host I/O (events, listener registration, peers)
//! - [`Runtime`]: Orchestration loop owning the expiry timer and the listener
//!   handle
//! - [`ChildCallbacks`]: Application hooks invoked on endpoint events

mod callbacks;
mod driver;
mod error;
mod runtime;

pub use callbacks::ChildCallbacks;
pub use driver::{Driver, HostEvent, ListenerHandle};
pub use error::RuntimeError;
pub use runtime::Runtime;
