//! qgrid CLI - Train and watch a tabular Q-learning agent
//!
//! `qgrid train` runs headless and reports what the agent learned;
//! `qgrid run` drives the agent on a timer and redraws the grid live.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_async)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod render;

use crate::config::Config;
use commands::{config as config_cmd, run, train};

#[derive(Parser)]
#[command(name = "qgrid")]
#[command(author, version, about = "qgrid - tabular Q-learning on a grid world", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (logs every finished episode)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./qgrid.toml, then ~/.config/qgrid/qgrid.toml)
    #[arg(short, long, global = true, env = "QGRID_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train headless and print the learned values
    Train(train::TrainArgs),

    /// Train live, redrawing the grid after every step
    Run(run::RunArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config_cmd::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging based on verbosity
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.trainer.log_level.as_str()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("qgrid={log_level},qgrid_rl={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Train(args) => train::run(args, &config).await,
        Commands::Run(args) => run::run(args, &config).await,
        Commands::Config(cmd) => config_cmd::run(cmd, &config, cli.config.as_deref()).await,
    }
}
