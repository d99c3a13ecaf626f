//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::time::Duration;

use serde_json::Value;
use tether_core::{ChildConfig, InboundMessage};

use crate::{
    ids::{IdSource, SeededIds},
    scenario::{OracleFn, World},
    sim_host::SimContexts,
    sim_parent::{SimParent, SimParentConfig},
};

/// One scripted step, run in order after activation.
#[derive(Debug, Clone)]
enum Step {
    Advance(Duration),
    Reload,
    Unload,
    ParentSends(Value),
    ParentDisconnects,
    ChildSends(Value),
    Inject(InboundMessage),
    DropParentReplies(bool),
}

/// Scenario builder.
///
/// Describe the child, the parent, the contexts and a list of steps. Must
/// call `.oracle()` to get a [`RunnableScenario`] that can be executed.
pub struct Scenario {
    name: String,
    child: ChildConfig,
    parent: SimParentConfig,
    contexts: SimContexts,
    ids: Option<Box<dyn IdSource>>,
    seed: u64,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with default child and parent configuration.
    ///
    /// The child lives in an opened window unless [`Scenario::contexts`]
    /// says otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            child: ChildConfig::default(),
            parent: SimParentConfig::default(),
            contexts: SimContexts::isolated().with_opener(),
            ids: None,
            seed: 0,
            steps: Vec::new(),
        }
    }

    /// Child configuration.
    pub fn child_config(mut self, config: ChildConfig) -> Self {
        self.child = config;
        self
    }

    /// Parent configuration.
    pub fn parent_config(mut self, config: SimParentConfig) -> Self {
        self.parent = config;
        self
    }

    /// Peer contexts reachable from the child.
    pub fn contexts(mut self, contexts: SimContexts) -> Self {
        self.contexts = contexts;
        self
    }

    /// Seed for the parent's id generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Replace the parent's id generator. Overrides [`Scenario::seed`].
    pub fn ids(mut self, ids: Box<dyn IdSource>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Move the virtual clock forward, firing a due expiry timer.
    pub fn advance(mut self, by: Duration) -> Self {
        self.steps.push(Step::Advance(by));
        self
    }

    /// Tear the child down and start a fresh one over the same durable slot.
    pub fn reload(mut self) -> Self {
        self.steps.push(Step::Reload);
        self
    }

    /// Run the child's teardown hook without reloading.
    pub fn unload(mut self) -> Self {
        self.steps.push(Step::Unload);
        self
    }

    /// Parent sends an application payload.
    pub fn parent_sends(mut self, payload: Value) -> Self {
        self.steps.push(Step::ParentSends(payload));
        self
    }

    /// Parent announces it is going away.
    pub fn parent_disconnects(mut self) -> Self {
        self.steps.push(Step::ParentDisconnects);
        self
    }

    /// Child sends an application payload to the parent.
    pub fn child_sends(mut self, payload: Value) -> Self {
        self.steps.push(Step::ChildSends(payload));
        self
    }

    /// Deliver an arbitrary message to the child's channel.
    pub fn inject(mut self, inbound: InboundMessage) -> Self {
        self.steps.push(Step::Inject(inbound));
        self
    }

    /// Lose every parent reply from here on.
    pub fn drop_parent_replies(mut self) -> Self {
        self.steps.push(Step::DropParentReplies(true));
        self
    }

    /// Stop losing parent replies.
    pub fn deliver_parent_replies(mut self) -> Self {
        self.steps.push(Step::DropParentReplies(false));
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Activates the child (which announces itself and, unless replies are
    /// dropped, completes the handshake synchronously), runs every step in
    /// order, then invokes the oracle on the final world.
    pub fn run(self) -> Result<(), String> {
        let Scenario { name, child, parent, contexts, ids, seed, steps } = self.scenario;

        let ids: Box<dyn IdSource> = match ids {
            Some(ids) => ids,
            None => Box::new(SeededIds::with_seed(seed)),
        };
        let mut world = World::new(child, SimParent::new(parent, ids), contexts);

        // Drops requested before anything else apply to the first handshake.
        let mut steps = steps.into_iter().peekable();
        while let Some(Step::DropParentReplies(drop)) = steps.peek() {
            world.set_drop_parent_replies(*drop);
            steps.next();
        }

        world.activate().map_err(|err| format!("Scenario '{name}': {err}"))?;

        for step in steps {
            match step {
                Step::Advance(by) => {
                    world.advance(by).map_err(|err| format!("Scenario '{name}': {err}"))?;
                },
                Step::Reload => {
                    world.reload().map_err(|err| format!("Scenario '{name}': reload: {err}"))?;
                },
                Step::Unload => world.unload(),
                Step::ParentSends(payload) => world.parent_sends(&payload),
                Step::ParentDisconnects => world.parent_disconnects(),
                Step::ChildSends(payload) => world.child_sends(&payload),
                Step::Inject(inbound) => world.inject(&inbound),
                Step::DropParentReplies(drop) => world.set_drop_parent_replies(drop),
            }
        }

        (self.oracle)(&world).map_err(|err| format!("Scenario '{name}' oracle failed: {err}"))
    }
}
