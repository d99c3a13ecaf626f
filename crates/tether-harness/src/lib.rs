//! Deterministic simulation harness for Tether protocol testing.
//!
//! In-memory implementations of the host collaborators (peer contexts,
//! listener registry, durable slot), a simulated parent that answers the
//! child's announcements, and a scenario framework that enforces the Oracle
//! Pattern.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod callbacks;
pub mod ids;
pub mod scenario;
pub mod sim_host;
pub mod sim_parent;

pub use callbacks::{CallbackLog, RecordingCallbacks};
pub use ids::{CounterIds, IdSource, SeededIds};
pub use sim_host::{Posted, SimContexts, SimDriver, SimError, SimHandle, SimHost};
pub use sim_parent::{ChildRecord, SimParent, SimParentConfig};
