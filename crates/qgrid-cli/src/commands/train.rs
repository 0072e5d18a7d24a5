//! Headless training

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use qgrid_rl::evaluation::default_max_steps;
use qgrid_rl::{EvaluationReport, QLearningAgent, Rollout, Snapshot};

use crate::config::Config;
use crate::render;

#[derive(Args)]
pub struct TrainArgs {
    /// Number of steps to train for (defaults to trainer.train_steps)
    #[arg(short, long)]
    steps: Option<u64>,

    /// Random seed (defaults to trainer.seed, then OS entropy)
    #[arg(long)]
    seed: Option<u64>,

    /// Greedy evaluation rollouts after training (defaults to trainer.evaluation_rollouts)
    #[arg(short, long)]
    evaluate: Option<usize>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct TrainOutput {
    snapshot: Snapshot,
    evaluation: EvaluationReport,
    greedy_path: Rollout,
    best_values: Vec<Vec<f64>>,
}

pub async fn run(args: TrainArgs, config: &Config) -> Result<()> {
    let mut agent = config.build_agent(args.seed)?;
    let steps = args.steps.unwrap_or(config.trainer.train_steps);
    let rollouts = args.evaluate.unwrap_or(config.trainer.evaluation_rollouts);

    info!(steps, rollouts, "Training");
    let output = train(&mut agent, steps, rollouts);

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to encode result")?;
        println!("{json}");
        return Ok(());
    }

    println!("Training finished");
    println!("=================\n");
    println!("{}\n", render::stats(&output.snapshot));
    println!("{}", render::grid(agent.environment(), agent.q_table(), None));
    println!("Greedy path: {}", render::path(&output.greedy_path));
    println!("Evaluation:  {}", render::evaluation(&output.evaluation));

    Ok(())
}

fn train(agent: &mut QLearningAgent, steps: u64, rollouts: usize) -> TrainOutput {
    let snapshot = agent.run_steps(steps);
    let max_steps = default_max_steps(agent.environment().size());
    let evaluation = agent.evaluate(rollouts, max_steps);
    let greedy_path = agent.greedy_rollout(max_steps);

    let best_values = agent
        .q_table()
        .value_grid(agent.environment().size())
        .outer_iter()
        .map(|row| row.to_vec())
        .collect();

    TrainOutput {
        snapshot,
        evaluation,
        greedy_path,
        best_values,
    }
}
