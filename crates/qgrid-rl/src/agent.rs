//! Q-learning agent - the single owner of the table and the episode state

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use qgrid_core::{Action, Cell, GridError, Result};

use crate::environment::{GridEnvironment, Transition};
use crate::evaluation::{self, EvaluationReport, Rollout};
use crate::policy::{EpsilonGreedyPolicy, RandomSource};
use crate::q_table::{max_value, QTable, QValues};

/// Hyperparameters of the learning rule and the exploration schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParams {
    /// Step size alpha
    pub learning_rate: f64,
    /// Discount gamma
    pub discount_factor: f64,
    /// Epsilon at the start of a run and after every reset
    pub initial_epsilon: f64,
    /// Multiplier applied to epsilon after each episode
    pub epsilon_decay: f64,
    /// Below this epsilon exploration is frozen at zero
    pub mastery_threshold: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            discount_factor: 0.9,
            initial_epsilon: 0.5,
            epsilon_decay: 0.9,
            mastery_threshold: 0.05,
        }
    }
}

impl LearningParams {
    pub fn validate(&self) -> Result<()> {
        check_range(
            "learning_rate",
            self.learning_rate,
            |v| v > 0.0 && v <= 1.0,
            "a value in (0, 1]",
        )?;
        check_unit("discount_factor", self.discount_factor)?;
        check_unit("initial_epsilon", self.initial_epsilon)?;
        check_unit("epsilon_decay", self.epsilon_decay)?;
        check_unit("mastery_threshold", self.mastery_threshold)
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<()> {
    check_range(name, value, |v| (0.0..=1.0).contains(&v), "a value in [0, 1]")
}

fn check_range(
    name: &'static str,
    value: f64,
    ok: impl Fn(f64) -> bool,
    expected: &'static str,
) -> Result<()> {
    // NaN fails every comparison, so it is rejected here too
    if ok(value) {
        Ok(())
    } else {
        Err(GridError::InvalidParameter {
            name,
            value,
            expected,
        })
    }
}

/// Mutable episode state, owned by the agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub position: Cell,
    pub episode_count: u64,
    pub cumulative_reward: f64,
    pub epsilon: f64,
    pub last_action_was_exploratory: bool,
    pub total_steps: u64,
    episode_steps: u64,
    episode_return: f64,
}

impl AgentState {
    fn new(start: Cell, epsilon: f64) -> Self {
        Self {
            position: start,
            episode_count: 0,
            cumulative_reward: 0.0,
            epsilon,
            last_action_was_exploratory: false,
            total_steps: 0,
            episode_steps: 0,
            episode_return: 0.0,
        }
    }
}

/// Observable view of the agent after a step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub position: Cell,
    pub episode_count: u64,
    pub cumulative_reward: f64,
    pub epsilon: f64,
    pub was_exploration: bool,
    pub total_steps: u64,
    /// Exploration has been frozen at zero
    pub mastered: bool,
}

/// Tabular Q-learning agent for a [`GridEnvironment`].
///
/// All mutation goes through `&mut self`, so one agent has exactly one writer.
pub struct QLearningAgent<R = StdRng> {
    env: GridEnvironment,
    params: LearningParams,
    policy: EpsilonGreedyPolicy,
    q_table: QTable,
    state: AgentState,
    rng: R,
}

impl QLearningAgent<StdRng> {
    /// Agent with a reproducible random stream
    pub fn with_seed(env: GridEnvironment, params: LearningParams, seed: u64) -> Result<Self> {
        Self::new(env, params, StdRng::seed_from_u64(seed))
    }

    /// Agent seeded from the operating system
    pub fn from_entropy(env: GridEnvironment, params: LearningParams) -> Result<Self> {
        Self::new(env, params, StdRng::from_entropy())
    }
}

impl<R: RandomSource> QLearningAgent<R> {
    pub fn new(env: GridEnvironment, params: LearningParams, rng: R) -> Result<Self> {
        params.validate()?;
        let state = AgentState::new(env.start(), params.initial_epsilon);
        Ok(Self {
            env,
            params,
            policy: EpsilonGreedyPolicy::new(),
            q_table: QTable::new(),
            state,
            rng,
        })
    }

    /// Select, move, update the table and do episode bookkeeping.
    pub fn step(&mut self) -> Snapshot {
        let position = self.state.position;
        let q_values = self.q_table.read(position);

        let selection = self
            .policy
            .select(&q_values, self.state.epsilon, &mut self.rng);
        self.state.last_action_was_exploratory = selection.was_exploration;

        let action = Action::ALL[selection.action_index];
        let Transition { next, reward, done } = self.env.transition(position, action);

        // Terminal cells are never written, so they bootstrap from zero.
        let max_next_q = max_value(&self.q_table.read(next));
        let current = q_values[selection.action_index];
        let updated = current
            + self.params.learning_rate
                * (reward + self.params.discount_factor * max_next_q - current);
        self.q_table.write(position, selection.action_index, updated);

        self.state.cumulative_reward += reward;
        self.state.total_steps += 1;
        self.state.episode_steps += 1;
        self.state.episode_return += reward;

        if done {
            self.finish_episode(next);
        } else {
            self.state.position = next;
        }

        self.snapshot()
    }

    /// Run `steps` steps and return the final snapshot
    pub fn run_steps(&mut self, steps: u64) -> Snapshot {
        for _ in 0..steps {
            self.step();
        }
        self.snapshot()
    }

    fn finish_episode(&mut self, terminal: Cell) {
        self.state.episode_count += 1;

        let threshold = self.params.mastery_threshold;
        let previous = self.state.epsilon;
        let decayed = (previous * self.params.epsilon_decay).max(0.0);

        if decayed < threshold {
            if previous >= threshold {
                info!(
                    episode = self.state.episode_count,
                    steps = self.state.total_steps,
                    "Exploration below {threshold}, freezing epsilon and clearing cumulative reward"
                );
                self.state.cumulative_reward = 0.0;
            }
            self.state.epsilon = 0.0;
        } else {
            self.state.epsilon = decayed;
        }

        debug!(
            episode = self.state.episode_count,
            length = self.state.episode_steps,
            episode_return = self.state.episode_return,
            reached_goal = terminal == self.env.goal(),
            epsilon = self.state.epsilon,
            "Episode finished"
        );

        self.state.position = self.env.start();
        self.state.episode_steps = 0;
        self.state.episode_return = 0.0;
    }

    /// Clear all learning and restart from the initial exploration rate
    pub fn reset(&mut self) {
        self.q_table.clear();
        self.state = AgentState::new(self.env.start(), self.params.initial_epsilon);
        info!("Agent reset");
    }

    /// Manual exploration override
    pub fn set_epsilon(&mut self, value: f64) -> Result<()> {
        check_unit("epsilon", value)?;
        debug!(from = self.state.epsilon, to = value, "Epsilon overridden");
        self.state.epsilon = value;
        Ok(())
    }

    /// Greedy action at `cell` using the current table, ties broken at random
    pub fn greedy_action(&mut self, cell: Cell) -> Action {
        let values = self.q_table.read(cell);
        Action::ALL[EpsilonGreedyPolicy::greedy(&values, &mut self.rng)]
    }

    /// Greedy rollouts from the start cell; the table is left untouched
    pub fn evaluate(&mut self, rollouts: usize, max_steps: usize) -> EvaluationReport {
        evaluation::evaluate(&self.env, &self.q_table, &mut self.rng, rollouts, max_steps)
    }

    /// One greedy trajectory from the start cell; the table is left untouched
    pub fn greedy_rollout(&mut self, max_steps: usize) -> Rollout {
        evaluation::rollout(&self.env, &self.q_table, &mut self.rng, max_steps)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            position: self.state.position,
            episode_count: self.state.episode_count,
            cumulative_reward: self.state.cumulative_reward,
            epsilon: self.state.epsilon,
            was_exploration: self.state.last_action_was_exploratory,
            total_steps: self.state.total_steps,
            mastered: self.state.epsilon < self.params.mastery_threshold,
        }
    }

    pub fn q_values_for(&self, cell: Cell) -> QValues {
        self.q_table.read(cell)
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn environment(&self) -> &GridEnvironment {
        &self.env
    }

    pub fn params(&self) -> &LearningParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::scripted::ScriptedRandom;

    fn scripted_agent(units: &[f64], indices: &[usize]) -> QLearningAgent<ScriptedRandom> {
        QLearningAgent::new(
            GridEnvironment::reference(),
            LearningParams::default(),
            ScriptedRandom::new(units, indices),
        )
        .unwrap()
    }

    #[test]
    fn test_first_exploitation_step_updates_one_component() {
        for tie_pick in 0..4 {
            // u = 0.9 >= epsilon 0.5, then pick among the four tied zeros
            let mut agent = scripted_agent(&[0.9], &[tie_pick]);
            let snapshot = agent.step();

            assert!(!snapshot.was_exploration);
            let values = agent.q_values_for(Cell::new(0, 0));
            let mut expected = [0.0; 4];
            expected[tie_pick] = -0.05;
            for (got, want) in values.iter().zip(expected) {
                assert!((got - want).abs() < 1e-12, "{values:?} vs {expected:?}");
            }
        }
    }

    #[test]
    fn test_exploration_flag_recorded() {
        let mut agent = scripted_agent(&[0.1], &[3]);
        let snapshot = agent.step();

        assert!(snapshot.was_exploration);
        assert!(agent.state().last_action_was_exploratory);
        assert_eq!(snapshot.position, Cell::new(1, 0));
    }

    #[test]
    fn test_blocked_move_costs_step_and_stays() {
        // Up from (0, 0) hits the wall
        let mut agent = scripted_agent(&[0.1], &[0]);
        let snapshot = agent.step();

        assert_eq!(snapshot.position, Cell::new(0, 0));
        assert!((snapshot.cumulative_reward + 0.1).abs() < 1e-12);
        assert_eq!(snapshot.episode_count, 0);
    }

    #[test]
    fn test_hazard_ends_episode_and_decays_epsilon() {
        // Right to (1, 0), then Down into the hazard at (1, 1)
        let mut agent = scripted_agent(&[0.1, 0.1], &[3, 1]);
        agent.step();
        let snapshot = agent.step();

        assert_eq!(snapshot.episode_count, 1);
        assert_eq!(snapshot.position, Cell::new(0, 0));
        assert!((snapshot.epsilon - 0.45).abs() < 1e-12);
        assert!((snapshot.cumulative_reward - (-100.1)).abs() < 1e-9);
        assert!((agent.q_values_for(Cell::new(1, 0))[1] - (-50.0)).abs() < 1e-12);
        assert_eq!(agent.q_values_for(Cell::new(1, 1)), [0.0; 4]);
    }

    #[test]
    fn test_mastery_crossing_clears_reward_once() {
        // Right into (1, 0), then Down into the hazard, twice
        let mut agent = scripted_agent(&[0.0, 0.0, 0.0, 0.0], &[3, 1, 3, 1]);
        agent.set_epsilon(0.055).unwrap();

        agent.step();
        let snapshot = agent.step();
        assert_eq!(snapshot.epsilon, 0.0);
        assert_eq!(snapshot.cumulative_reward, 0.0);
        assert!(snapshot.mastered);

        // A later episode with epsilon already frozen keeps the score
        agent.state.cumulative_reward = -7.0;
        agent.finish_episode(Cell::new(1, 1));
        assert_eq!(agent.snapshot().epsilon, 0.0);
        assert_eq!(agent.snapshot().cumulative_reward, -7.0);
    }

    #[test]
    fn test_manual_raise_rearms_mastery_reset() {
        let mut agent = scripted_agent(&[], &[]);
        agent.set_epsilon(0.05).unwrap();
        agent.state.cumulative_reward = -3.0;
        agent.finish_episode(Cell::new(4, 4));
        assert_eq!(agent.snapshot().cumulative_reward, 0.0);

        agent.set_epsilon(0.054).unwrap();
        agent.state.cumulative_reward = -2.0;
        agent.finish_episode(Cell::new(4, 4));
        assert_eq!(agent.snapshot().cumulative_reward, 0.0);
        assert_eq!(agent.snapshot().epsilon, 0.0);
    }

    #[test]
    fn test_manual_low_epsilon_does_not_trigger_reset() {
        let mut agent = scripted_agent(&[], &[]);
        agent.set_epsilon(0.04).unwrap();
        agent.state.cumulative_reward = -5.0;
        agent.finish_episode(Cell::new(4, 4));

        assert_eq!(agent.snapshot().epsilon, 0.0);
        assert_eq!(agent.snapshot().cumulative_reward, -5.0);
    }

    #[test]
    fn test_set_epsilon_rejects_out_of_range() {
        let mut agent = scripted_agent(&[], &[]);
        assert!(agent.set_epsilon(-0.1).is_err());
        assert!(agent.set_epsilon(1.01).is_err());
        assert!(agent.set_epsilon(f64::NAN).is_err());
        assert_eq!(agent.snapshot().epsilon, 0.5);

        agent.set_epsilon(1.0).unwrap();
        assert_eq!(agent.snapshot().epsilon, 1.0);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut agent =
            QLearningAgent::with_seed(GridEnvironment::reference(), LearningParams::default(), 3)
                .unwrap();
        agent.run_steps(500);
        assert!(!agent.q_table().is_empty());

        agent.reset();
        let snapshot = agent.snapshot();
        assert_eq!(snapshot.episode_count, 0);
        assert_eq!(snapshot.epsilon, 0.5);
        assert_eq!(snapshot.cumulative_reward, 0.0);
        assert_eq!(snapshot.total_steps, 0);
        assert_eq!(snapshot.position, Cell::new(0, 0));
        assert!(agent.q_table().is_empty());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = LearningParams {
            learning_rate: 0.0,
            ..LearningParams::default()
        };
        assert!(QLearningAgent::with_seed(GridEnvironment::reference(), params, 1).is_err());

        let params = LearningParams {
            discount_factor: 1.5,
            ..LearningParams::default()
        };
        assert!(QLearningAgent::with_seed(GridEnvironment::reference(), params, 1).is_err());
    }
}
