//! Epsilon-greedy action selection

use rand::Rng;
use serde::Serialize;

use qgrid_core::ACTION_COUNT;

use crate::q_table::{max_value, QValues};

/// Source of the random draws made by the policy.
///
/// Implemented for every [`rand::Rng`], so a seeded `StdRng` can be passed
/// directly. Tests can supply scripted draws instead.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`
    fn unit(&mut self) -> f64;

    /// Uniform index in `[0, len)`; `len` is never zero
    fn index(&mut self, len: usize) -> usize;
}

impl<R: Rng> RandomSource for R {
    fn unit(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        self.gen_range(0..len)
    }
}

/// Result of one policy decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub action_index: usize,
    pub was_exploration: bool,
}

/// Epsilon-greedy policy with uniform random tie-breaking on exploitation
#[derive(Debug, Clone, Copy, Default)]
pub struct EpsilonGreedyPolicy;

impl EpsilonGreedyPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Pick an action for `q_values` at exploration rate `epsilon`.
    ///
    /// With probability `epsilon` any of the four actions is chosen uniformly.
    /// Otherwise the choice is uniform over every action whose value equals the
    /// maximum exactly, so an untrained cell has no bias toward the first action.
    pub fn select<S: RandomSource + ?Sized>(
        &self,
        q_values: &QValues,
        epsilon: f64,
        rng: &mut S,
    ) -> Selection {
        if rng.unit() < epsilon {
            return Selection {
                action_index: rng.index(ACTION_COUNT),
                was_exploration: true,
            };
        }

        Selection {
            action_index: Self::greedy(q_values, rng),
            was_exploration: false,
        }
    }

    /// Greedy choice with random tie-break
    pub fn greedy<S: RandomSource + ?Sized>(q_values: &QValues, rng: &mut S) -> usize {
        let best = max_value(q_values);
        let mut tied = [0usize; ACTION_COUNT];
        let mut count = 0;
        for (i, value) in q_values.iter().enumerate() {
            if *value == best {
                tied[count] = i;
                count += 1;
            }
        }

        match count {
            // Only reachable when every value is NaN
            0 => rng.index(ACTION_COUNT),
            1 => tied[0],
            n => tied[rng.index(n)],
        }
    }
}
