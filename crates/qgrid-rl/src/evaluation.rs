//! Greedy rollouts for measuring what the table has learned

use serde::Serialize;

use qgrid_core::{Action, Cell};

use crate::environment::GridEnvironment;
use crate::policy::{EpsilonGreedyPolicy, RandomSource};
use crate::q_table::QTable;

/// How a rollout ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutOutcome {
    ReachedGoal,
    HitHazard,
    TimedOut,
}

/// One greedy trajectory from the start cell
#[derive(Debug, Clone, Serialize)]
pub struct Rollout {
    /// Visited cells, starting with the start cell
    pub path: Vec<Cell>,
    pub outcome: RolloutOutcome,
    pub total_reward: f64,
}

impl Rollout {
    /// Number of moves taken
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate of several rollouts
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub rollouts: usize,
    pub successes: usize,
    pub hazards: usize,
    pub timeouts: usize,
    pub success_rate: f64,
    pub mean_path_length: f64,
}

/// Default rollout length cap for a grid of side `size`
pub fn default_max_steps(size: usize) -> usize {
    4 * size * size
}

/// Follow the greedy policy (epsilon = 0) from the start cell without
/// touching the table.
pub fn rollout<S: RandomSource + ?Sized>(
    env: &GridEnvironment,
    table: &QTable,
    rng: &mut S,
    max_steps: usize,
) -> Rollout {
    let mut position = env.start();
    let mut path = vec![position];
    let mut total_reward = 0.0;

    for _ in 0..max_steps {
        let action = Action::ALL[EpsilonGreedyPolicy::greedy(&table.read(position), rng)];
        let transition = env.transition(position, action);
        total_reward += transition.reward;
        position = transition.next;
        path.push(position);

        if transition.done {
            let outcome = if position == env.goal() {
                RolloutOutcome::ReachedGoal
            } else {
                RolloutOutcome::HitHazard
            };
            return Rollout {
                path,
                outcome,
                total_reward,
            };
        }
    }

    Rollout {
        path,
        outcome: RolloutOutcome::TimedOut,
        total_reward,
    }
}

pub fn evaluate<S: RandomSource + ?Sized>(
    env: &GridEnvironment,
    table: &QTable,
    rng: &mut S,
    rollouts: usize,
    max_steps: usize,
) -> EvaluationReport {
    let mut successes = 0;
    let mut hazards = 0;
    let mut timeouts = 0;
    let mut total_length = 0;

    for _ in 0..rollouts {
        let run = rollout(env, table, rng, max_steps);
        total_length += run.len();
        match run.outcome {
            RolloutOutcome::ReachedGoal => successes += 1,
            RolloutOutcome::HitHazard => hazards += 1,
            RolloutOutcome::TimedOut => timeouts += 1,
        }
    }

    let (success_rate, mean_path_length) = if rollouts > 0 {
        (
            successes as f64 / rollouts as f64,
            total_length as f64 / rollouts as f64,
        )
    } else {
        (0.0, 0.0)
    };

    EvaluationReport {
        rollouts,
        successes,
        hazards,
        timeouts,
        success_rate,
        mean_path_length,
    }
}
