//! Configuration management commands

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::config::Config;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (file, environment and defaults merged)
    Show,
    /// Write a configuration file with the default values
    Init {
        /// Output path
        #[arg(short, long, default_value = "qgrid.toml")]
        output: String,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// `explicit` is the `--config` / `QGRID_CONFIG` path the configuration was loaded with
pub async fn run(cmd: ConfigCommands, config: &Config, explicit: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(config, explicit).await,
        ConfigCommands::Init { output, force } => init(Path::new(&output), force).await,
    }
}

async fn show(config: &Config, explicit: Option<&Path>) -> Result<()> {
    println!("Current Configuration");
    println!("=====================\n");
    println!("{}\n", source_line(explicit));
    println!("{}", config.to_toml()?);
    Ok(())
}

fn source_line(explicit: Option<&Path>) -> String {
    match Config::resolve_path(explicit) {
        Some(path) => format!("Config file: {}", path.display()),
        None => "No configuration file found. Using defaults.".to_string(),
    }
}

async fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Configuration file already exists: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let contents = Config::default().to_toml()?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Configuration file created: {}", path.display());

    Ok(())
}
