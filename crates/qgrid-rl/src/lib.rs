//! qgrid RL - Tabular Q-learning on a grid world
//!
//! This crate provides the grid environment, the sparse Q-table, the
//! epsilon-greedy policy, the learning agent and the timed training loop
//! that drives it.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::float_cmp)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod environment;
pub mod evaluation;
pub mod policy;
pub mod q_table;
pub mod trainer;

pub use agent::{AgentState, LearningParams, QLearningAgent, Snapshot};
pub use environment::{GridEnvironment, Rewards, Transition};
pub use evaluation::{EvaluationReport, Rollout, RolloutOutcome};
pub use policy::{EpsilonGreedyPolicy, RandomSource, Selection};
pub use q_table::{heatmap_intensity, QTable, QValues};
pub use trainer::{
    StopReason, TrainerConfig, TrainerHandle, TrainingLoop, TrainingRun, TrainingSummary,
};
