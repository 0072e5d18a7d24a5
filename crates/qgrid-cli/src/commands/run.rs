//! Live training: the loop steps on a timer while the terminal redraws

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use qgrid_rl::{GridEnvironment, QLearningAgent, TrainerConfig, TrainerHandle, TrainingLoop};

use crate::config::Config;
use crate::render;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Args)]
pub struct RunArgs {
    /// Stop after this many steps (runs until Ctrl+C when omitted)
    #[arg(short, long)]
    steps: Option<u64>,

    /// Milliseconds between steps (defaults to trainer.step_interval_ms)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Random seed (defaults to trainer.seed, then OS entropy)
    #[arg(long)]
    seed: Option<u64>,

    /// Exploration rate to start from instead of learning.initial_epsilon
    #[arg(long)]
    epsilon: Option<f64>,
}

pub async fn run(args: RunArgs, config: &Config) -> Result<()> {
    let (agent, trainer_config) = prepare(&args, config)?;
    let env = agent.environment().clone();
    let (handle, join) =
        TrainingLoop::spawn(agent, trainer_config).context("Invalid trainer settings")?;

    info!(run_id = %handle.run_id(), "Live training started, press Ctrl+C to stop");
    watch(&handle, &env).await;

    if let Err(e) = handle.stop().await {
        debug!("Training loop already finished: {}", e);
    }
    drop(handle);

    let run = join.await.context("Training task failed")?;
    let summary = &run.summary;
    let elapsed = (summary.finished_at - summary.started_at)
        .to_std()
        .unwrap_or(Duration::ZERO);

    println!();
    println!("Run {} stopped ({:?})", summary.run_id, summary.stop_reason);
    println!(
        "{} steps in {:.1}s, {} episodes",
        summary.steps,
        elapsed.as_secs_f64(),
        summary.final_snapshot.episode_count
    );

    Ok(())
}

/// Agent and driver settings for a live run.
///
/// The epsilon override is applied here, before the loop takes its first step.
fn prepare(args: &RunArgs, config: &Config) -> Result<(QLearningAgent, TrainerConfig)> {
    let mut config = config.clone();
    if let Some(interval_ms) = args.interval_ms {
        config.trainer.step_interval_ms = interval_ms;
    }

    let mut agent = config.build_agent(args.seed)?;
    if let Some(epsilon) = args.epsilon {
        agent.set_epsilon(epsilon).context("Invalid --epsilon value")?;
    }

    Ok((agent, config.trainer_config(args.steps)))
}

/// Redraw on every published snapshot until the loop ends or Ctrl+C.
///
/// Only the latest snapshot is kept by the channel, so a slow terminal skips
/// frames instead of holding back the trainer.
async fn watch(handle: &TrainerHandle, env: &GridEnvironment) {
    let mut updates = handle.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *updates.borrow_and_update();
                let Ok(table) = handle.q_table().await else {
                    break;
                };
                print!(
                    "{CLEAR_SCREEN}{}\n{}\n",
                    render::grid(env, &table, Some(snapshot.position)),
                    render::stats(&snapshot)
                );
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, stopping training");
                break;
            }
        }
    }
}
