//! Training loop - drives the agent on a timer and publishes its state
//!
//! The loop owns the agent on a single task:
//! - steps it once per tick of a tokio interval that skips missed ticks
//! - publishes each snapshot on a watch channel (observers never block it)
//! - applies control commands received through a [`TrainerHandle`]
//! - hands the agent back when it stops

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use qgrid_core::{GridError, Result};

use crate::agent::{QLearningAgent, Snapshot};
use crate::policy::RandomSource;
use crate::q_table::QTable;

/// Shortest accepted step interval
pub const MIN_STEP_INTERVAL: Duration = Duration::from_millis(1);
/// Longest accepted step interval
pub const MAX_STEP_INTERVAL: Duration = Duration::from_millis(10_000);

const COMMAND_BUFFER: usize = 32;

/// Driver settings
#[derive(Debug, Clone, Copy)]
pub struct TrainerConfig {
    pub step_interval: Duration,
    /// Stop on its own after this many steps
    pub max_steps: Option<u64>,
    /// Wait for [`TrainerHandle::resume`] before the first step
    pub start_paused: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(50),
            max_steps: None,
            start_paused: false,
        }
    }
}

pub fn validate_step_interval(interval: Duration) -> Result<()> {
    if (MIN_STEP_INTERVAL..=MAX_STEP_INTERVAL).contains(&interval) {
        Ok(())
    } else {
        Err(GridError::InvalidParameter {
            name: "step_interval_ms",
            value: interval.as_secs_f64() * 1000.0,
            expected: "a value in [1, 10000] ms",
        })
    }
}

enum TrainerCommand {
    Pause,
    Resume,
    SetEpsilon(f64, oneshot::Sender<Result<()>>),
    SetStepInterval(Duration),
    Reset,
    QTable(oneshot::Sender<QTable>),
    Stop,
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stopped,
    StepBudget,
    HandleDropped,
}

/// Summary of one training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Steps taken by this loop, across resets
    pub steps: u64,
    pub stop_reason: StopReason,
    pub final_snapshot: Snapshot,
}

/// Agent returned by a finished loop
pub struct TrainingRun<R> {
    pub agent: QLearningAgent<R>,
    pub summary: TrainingSummary,
}

/// Control and observation side of a running loop
#[derive(Clone)]
pub struct TrainerHandle {
    commands: mpsc::Sender<TrainerCommand>,
    snapshots: watch::Receiver<Snapshot>,
    run_id: Uuid,
}

impl TrainerHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        *self.snapshots.borrow()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(TrainerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(TrainerCommand::Resume).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(TrainerCommand::Reset).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(TrainerCommand::Stop).await
    }

    /// Manual exploration override, validated by the agent
    pub async fn set_epsilon(&self, value: f64) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(TrainerCommand::SetEpsilon(value, tx)).await?;
        rx.await.map_err(|_| Self::closed())?
    }

    /// Change the pacing; has no effect on what a step does
    pub async fn set_step_interval(&self, interval: Duration) -> Result<()> {
        validate_step_interval(interval)?;
        self.send(TrainerCommand::SetStepInterval(interval)).await
    }

    /// Copy of the current table, for rendering
    pub async fn q_table(&self) -> Result<QTable> {
        let (tx, rx) = oneshot::channel();
        self.send(TrainerCommand::QTable(tx)).await?;
        rx.await.map_err(|_| Self::closed())
    }

    async fn send(&self, command: TrainerCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| Self::closed())
    }

    fn closed() -> GridError {
        GridError::Trainer("training loop has stopped".to_string())
    }
}

/// The driver task's state
pub struct TrainingLoop<R> {
    agent: QLearningAgent<R>,
    config: TrainerConfig,
    commands: mpsc::Receiver<TrainerCommand>,
    snapshots: watch::Sender<Snapshot>,
    run_id: Uuid,
}

impl<R: RandomSource + Send + 'static> TrainingLoop<R> {
    /// Move `agent` onto a new task and start driving it
    pub fn spawn(
        agent: QLearningAgent<R>,
        config: TrainerConfig,
    ) -> Result<(TrainerHandle, JoinHandle<TrainingRun<R>>)> {
        validate_step_interval(config.step_interval)?;

        let run_id = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(agent.snapshot());

        let handle = TrainerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            run_id,
        };

        let training_loop = Self {
            agent,
            config,
            commands: command_rx,
            snapshots: snapshot_tx,
            run_id,
        };

        let span = info_span!("trainer", run_id = %run_id);
        let join = tokio::spawn(training_loop.run().instrument(span));

        Ok((handle, join))
    }

    async fn run(mut self) -> TrainingRun<R> {
        let started_at = Utc::now();
        let mut ticker = Self::ticker(self.config.step_interval);
        let mut paused = self.config.start_paused;
        let mut steps: u64 = 0;

        info!(
            interval_ms = self.config.step_interval.as_millis() as u64,
            max_steps = ?self.config.max_steps,
            paused,
            "Training loop started"
        );

        let stop_reason = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None => break StopReason::HandleDropped,
                    Some(TrainerCommand::Stop) => break StopReason::Stopped,
                    Some(TrainerCommand::Pause) => {
                        debug!("Training paused");
                        paused = true;
                    }
                    Some(TrainerCommand::Resume) => {
                        debug!("Training resumed");
                        paused = false;
                        ticker.reset();
                    }
                    Some(TrainerCommand::SetEpsilon(value, reply)) => {
                        let result = self.agent.set_epsilon(value);
                        if result.is_ok() {
                            self.publish();
                        }
                        let _ = reply.send(result);
                    }
                    Some(TrainerCommand::SetStepInterval(interval)) => {
                        debug!(interval_ms = interval.as_millis() as u64, "Step interval changed");
                        self.config.step_interval = interval;
                        ticker = Self::ticker(interval);
                    }
                    Some(TrainerCommand::Reset) => {
                        self.agent.reset();
                        self.publish();
                    }
                    Some(TrainerCommand::QTable(reply)) => {
                        let _ = reply.send(self.agent.q_table().clone());
                    }
                },
                _ = ticker.tick(), if !paused => {
                    if self.budget_spent(steps) {
                        break StopReason::StepBudget;
                    }

                    let snapshot = self.agent.step();
                    self.snapshots.send_replace(snapshot);
                    steps += 1;

                    if self.budget_spent(steps) {
                        break StopReason::StepBudget;
                    }
                }
            }
        };

        let final_snapshot = self.agent.snapshot();
        info!(
            steps,
            episodes = final_snapshot.episode_count,
            reason = ?stop_reason,
            "Training loop stopped"
        );

        TrainingRun {
            agent: self.agent,
            summary: TrainingSummary {
                run_id: self.run_id,
                started_at,
                finished_at: Utc::now(),
                steps,
                stop_reason,
                final_snapshot,
            },
        }
    }

    fn budget_spent(&self, steps: u64) -> bool {
        self.config.max_steps.is_some_and(|max| steps >= max)
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.agent.snapshot());
    }

    fn ticker(period: Duration) -> Interval {
        let mut ticker = tokio::time::interval(period);
        // A late tick is dropped rather than replayed in a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LearningParams;
    use crate::environment::GridEnvironment;
    use rand::rngs::StdRng;

    fn agent() -> QLearningAgent<StdRng> {
        QLearningAgent::with_seed(GridEnvironment::reference(), LearningParams::default(), 17)
            .unwrap()
    }

    fn config(max_steps: Option<u64>, start_paused: bool) -> TrainerConfig {
        TrainerConfig {
            step_interval: Duration::from_millis(50),
            max_steps,
            start_paused,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_step_budget() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(Some(25), false)).unwrap();

        let run = join.await.unwrap();
        assert_eq!(run.summary.stop_reason, StopReason::StepBudget);
        assert_eq!(run.summary.steps, 25);
        assert_eq!(run.agent.snapshot().total_steps, 25);
        assert_eq!(run.summary.run_id, handle.run_id());
        assert_eq!(handle.snapshot().total_steps, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_step_budget_takes_no_step() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(Some(0), false)).unwrap();

        let run = join.await.unwrap();
        assert_eq!(run.summary.stop_reason, StopReason::StepBudget);
        assert_eq!(run.summary.steps, 0);
        assert_eq!(run.agent.snapshot().total_steps, 0);
        assert!(run.agent.q_table().is_empty());
        assert_eq!(handle.snapshot().total_steps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_loop_does_not_step() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(None, true)).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.snapshot().total_steps, 0);

        handle.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(520)).await;
        handle.pause().await.unwrap();
        // Round trip so the pause has been applied
        handle.q_table().await.unwrap();
        let after_pause = handle.snapshot().total_steps;
        assert!(after_pause > 0 && after_pause <= 11, "{after_pause} steps");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.snapshot().total_steps, after_pause);

        handle.stop().await.unwrap();
        let run = join.await.unwrap();
        assert_eq!(run.summary.stop_reason, StopReason::Stopped);
        assert_eq!(run.summary.steps, after_pause);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_epsilon_through_handle() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(None, true)).unwrap();

        handle.set_epsilon(0.2).await.unwrap();
        assert_eq!(handle.snapshot().epsilon, 0.2);
        assert!(handle.set_epsilon(2.0).await.is_err());
        assert_eq!(handle.snapshot().epsilon, 0.2);

        handle.stop().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_through_handle() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(None, false)).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.q_table().await.unwrap().is_empty());

        handle.pause().await.unwrap();
        handle.reset().await.unwrap();
        assert!(handle.q_table().await.unwrap().is_empty());
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.total_steps, 0);
        assert_eq!(snapshot.epsilon, 0.5);

        handle.stop().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_interval_change() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(None, false)).unwrap();

        assert!(handle.set_step_interval(Duration::ZERO).await.is_err());
        handle
            .set_step_interval(Duration::from_millis(500))
            .await
            .unwrap();
        handle.q_table().await.unwrap();
        let before = handle.snapshot().total_steps;

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        let taken = handle.snapshot().total_steps - before;
        // New interval ticks immediately, then every 500 ms
        assert!((4..=6).contains(&taken), "{taken} steps");

        handle.stop().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_loop() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(None, true)).unwrap();
        drop(handle);

        let run = join.await.unwrap();
        assert_eq!(run.summary.stop_reason, StopReason::HandleDropped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_after_stop_fail() {
        let (handle, join) = TrainingLoop::spawn(agent(), config(Some(1), false)).unwrap();
        join.await.unwrap();

        assert!(matches!(handle.pause().await, Err(GridError::Trainer(_))));
        assert!(handle.q_table().await.is_err());
    }

    #[test]
    fn test_rejects_invalid_interval() {
        assert!(validate_step_interval(Duration::ZERO).is_err());
        assert!(validate_step_interval(Duration::from_secs(11)).is_err());
        assert!(validate_step_interval(Duration::from_millis(50)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_serializes() {
        let (_handle, join) = TrainingLoop::spawn(agent(), config(Some(3), false)).unwrap();
        let run = join.await.unwrap();

        let json = serde_json::to_value(&run.summary).unwrap();
        assert_eq!(json["stop_reason"], "step_budget");
        assert_eq!(json["steps"], 3);
        assert_eq!(json["final_snapshot"]["total_steps"], 3);
        assert!(json["run_id"].is_string());
    }
}
