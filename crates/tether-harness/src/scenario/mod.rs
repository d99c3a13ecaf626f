//! Scenario testing with mandatory oracles.
//!
//! A scenario wires one child endpoint to a [`crate::SimParent`] through
//! simulated contexts, runs a list of steps on a virtual clock, and then
//! hands the final [`World`] to an oracle. A scenario without an oracle
//! cannot be run.

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario};
pub use world::World;

/// Verification function run against the final world state.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
