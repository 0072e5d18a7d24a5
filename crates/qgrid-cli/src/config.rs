//! Configuration loading for the qgrid CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use qgrid_core::Cell;
use qgrid_rl::{GridEnvironment, LearningParams, QLearningAgent, Rewards, TrainerConfig};

/// Prefix of environment overrides, e.g. `QGRID__LEARNING__LEARNING_RATE`
pub const ENV_PREFIX: &str = "QGRID";

/// Configuration for the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub learning: LearningParams,
    pub trainer: TrainerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub size: usize,
    pub start: Cell,
    pub goal: Cell,
    pub hazards: Vec<Cell>,
    pub goal_reward: f64,
    pub hazard_reward: f64,
    pub step_reward: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        let env = GridEnvironment::reference();
        let rewards = env.rewards();
        Self {
            size: env.size(),
            start: env.start(),
            goal: env.goal(),
            hazards: env.hazards().collect(),
            goal_reward: rewards.goal,
            hazard_reward: rewards.hazard,
            step_reward: rewards.step,
        }
    }
}

impl GridConfig {
    pub fn to_environment(&self) -> qgrid_core::Result<GridEnvironment> {
        GridEnvironment::new(
            self.size,
            self.start,
            self.goal,
            self.hazards.iter().copied(),
            Rewards {
                goal: self.goal_reward,
                hazard: self.hazard_reward,
                step: self.step_reward,
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSettings {
    pub step_interval_ms: u64,
    /// Steps run by `qgrid train`
    pub train_steps: u64,
    /// Greedy rollouts run after `qgrid train`
    pub evaluation_rollouts: usize,
    /// Fixed seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub log_level: String,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            step_interval_ms: 50,
            train_steps: 20_000,
            evaluation_rollouts: 100,
            seed: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(explicit, ENV_PREFIX)
    }

    pub fn load_with_prefix(explicit: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let config_path = Self::resolve_path(explicit);

        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

        if let Some(path) = &config_path {
            tracing::info!("Loading config from: {:?}", path);
            builder = builder.add_source(File::from(path.clone()).required(explicit.is_some()));
        } else {
            tracing::info!("No config file found, using defaults");
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// File `load` reads: the explicit path if given, otherwise the first one found
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        }
    }

    /// Find the configuration file: ./qgrid.toml, then ~/.config/qgrid/qgrid.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from("qgrid.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("qgrid").join("qgrid.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn environment(&self) -> Result<GridEnvironment> {
        self.grid
            .to_environment()
            .context("Invalid [grid] configuration")
    }

    pub fn trainer_config(&self, max_steps: Option<u64>) -> TrainerConfig {
        TrainerConfig {
            step_interval: std::time::Duration::from_millis(self.trainer.step_interval_ms),
            max_steps,
            start_paused: false,
        }
    }

    /// Agent for this configuration; `seed` overrides the configured one
    pub fn build_agent(&self, seed: Option<u64>) -> Result<QLearningAgent> {
        let env = self.environment()?;
        let agent = match seed.or(self.trainer.seed) {
            Some(seed) => QLearningAgent::with_seed(env, self.learning, seed),
            None => QLearningAgent::from_entropy(env, self.learning),
        };
        agent.context("Invalid [learning] configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_build_reference_grid() {
        let config = Config::default();
        assert_eq!(config.environment().unwrap(), GridEnvironment::reference());
        assert_eq!(config.learning, LearningParams::default());
        assert_eq!(config.trainer.step_interval_ms, 50);
        assert_eq!(config.trainer.train_steps, 20_000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[grid]
size = 4
goal = {{ x = 3, y = 3 }}
hazards = [{{ x = 1, y = 2 }}]

[learning]
learning_rate = 0.3

[trainer]
seed = 9
"#
        )
        .unwrap();

        let config = Config::load_with_prefix(Some(file.path()), "QGRID_TEST_FILE").unwrap();
        assert_eq!(config.grid.size, 4);
        assert_eq!(config.grid.goal, Cell::new(3, 3));
        assert_eq!(config.grid.hazards, vec![Cell::new(1, 2)]);
        assert_eq!(config.grid.start, Cell::new(0, 0));
        assert_eq!(config.learning.learning_rate, 0.3);
        assert_eq!(config.learning.discount_factor, 0.9);
        assert_eq!(config.trainer.seed, Some(9));

        let env = config.environment().unwrap();
        assert_eq!(env.size(), 4);
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("QGRID_TEST_ENV__TRAINER__STEP_INTERVAL_MS", "250");
        std::env::set_var("QGRID_TEST_ENV__LEARNING__DISCOUNT_FACTOR", "0.8");

        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let config = Config::load_with_prefix(Some(file.path()), "QGRID_TEST_ENV").unwrap();

        assert_eq!(config.trainer.step_interval_ms, 250);
        assert_eq!(config.learning.discount_factor, 0.8);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Config::load_with_prefix(Some(&missing), "QGRID_TEST_MISSING").is_err());
    }

    #[test]
    fn test_invalid_grid_rejected() {
        let mut config = Config::default();
        config.grid.hazards.push(config.grid.goal);
        assert!(config.environment().is_err());
        assert!(config.build_agent(Some(1)).is_err());
    }

    #[test]
    fn test_invalid_learning_rejected() {
        let mut config = Config::default();
        config.learning.initial_epsilon = 2.0;
        assert!(config.build_agent(Some(1)).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.trainer.seed = Some(4);
        let text = config.to_toml().unwrap();
        assert!(text.contains("[grid]"));
        assert!(text.contains("[learning]"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.grid.hazards, config.grid.hazards);
        assert_eq!(parsed.trainer.seed, Some(4));
    }
}
