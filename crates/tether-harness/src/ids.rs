//! Identifier generation for the simulated parent.
//!
//! The parent needs ids that are unique enough to tell its children apart.
//! [`SeededIds`] draws them from a seeded RNG for reproducibility and falls
//! back to a monotonic counter if a draw ever repeats.

use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of child identifiers.
pub trait IdSource: Send {
    /// Produce an identifier not handed out before by this source.
    fn next_id(&mut self) -> String;
}

/// Monotonic counter ids: `tab-1`, `tab-2`, ...
#[derive(Debug, Clone, Default)]
pub struct CounterIds {
    issued: u64,
}

impl CounterIds {
    /// Start counting from one.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for CounterIds {
    fn next_id(&mut self) -> String {
        self.issued += 1;
        format!("tab-{}", self.issued)
    }
}

/// Random 64-bit hex ids from a seeded RNG.
#[derive(Debug, Clone)]
pub struct SeededIds {
    rng: ChaCha8Rng,
    issued: HashSet<String>,
    fallback: CounterIds,
}

impl SeededIds {
    /// Deterministic source for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            issued: HashSet::new(),
            fallback: CounterIds::new(),
        }
    }
}

impl IdSource for SeededIds {
    fn next_id(&mut self) -> String {
        let candidate = format!("{:016x}", self.rng.r#gen::<u64>());
        if self.issued.insert(candidate.clone()) {
            return candidate;
        }

        loop {
            let fallback = self.fallback.next_id();
            if self.issued.insert(fallback.clone()) {
                return fallback;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_monotonic() {
        let mut ids = CounterIds::new();
        assert_eq!(ids.next_id(), "tab-1");
        assert_eq!(ids.next_id(), "tab-2");
    }

    #[test]
    fn same_seed_same_ids() {
        let mut a = SeededIds::with_seed(7);
        let mut b = SeededIds::with_seed(7);
        for _ in 0..8 {
            assert_eq!(a.next_id(), b.next_id());
        }
    }

    #[test]
    fn ids_do_not_repeat() {
        let mut ids = SeededIds::with_seed(1);
        let drawn: HashSet<String> = (0..256).map(|_| ids.next_id()).collect();
        assert_eq!(drawn.len(), 256);
    }
}
