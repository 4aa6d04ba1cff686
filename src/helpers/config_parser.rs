use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::config::BOUNDARY_EPSILON;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub world: WorldConfig,
    pub agent: AgentConfig,
    pub rl: RLConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    pub pad: f32,
    pub interior_walls: bool,
    pub agent_count: usize,
    pub max_items: usize,
    pub item_radius: f32,
    pub item_speed: f32,
    pub item_max_age: usize,
    pub spawn_interval: usize,
    pub spawn_probability: f32,
    pub seed: Option<u64>,
}
impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 700.0,
            height: 500.0,
            pad: 10.0,
            interior_walls: true,
            agent_count: 1,
            max_items: 30,
            item_radius: 10.0,
            item_speed: 0.0,
            item_max_age: 5000,
            spawn_interval: 10,
            spawn_probability: 0.25,
            seed: None,
        }
    }
}

impl WorldConfig {
    /// Rejects worlds too small to keep agents off the bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let min = 2.0 * BOUNDARY_EPSILON;
        if !(self.width.is_finite() && self.width > min) {
            return Err(ConfigError::Invalid(format!(
                "world width {} must exceed {min}",
                self.width
            )));
        }
        if !(self.height.is_finite() && self.height > min) {
            return Err(ConfigError::Invalid(format!(
                "world height {} must exceed {min}",
                self.height
            )));
        }
        if !(self.pad >= 0.0 && 2.0 * self.pad < self.width.min(self.height)) {
            return Err(ConfigError::Invalid(format!(
                "pad {} does not fit a {}x{} world",
                self.pad, self.width, self.height
            )));
        }
        if !(self.item_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "item_radius {} must be positive",
                self.item_radius
            )));
        }
        if !(0.0..=1.0).contains(&self.spawn_probability) {
            return Err(ConfigError::Invalid(format!(
                "spawn_probability {} outside [0, 1]",
                self.spawn_probability
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentVariant {
    /// Two wheels, five wheel-speed actions.
    DifferentialDrive,
    /// Four axis-aligned velocity nudges.
    Holonomic,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub variant: AgentVariant,
    pub radius: f32,
    pub eye_count: usize,
    pub eye_spacing: f32,
    pub eye_offset: f32,
    pub eye_range: f32,
    pub speed: f32,
    pub max_speed: f32,
    pub friction: f32,
    pub rewards: RewardsConfig,
}
impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            variant: AgentVariant::DifferentialDrive,
            radius: 10.0,
            eye_count: 9,
            eye_spacing: 0.25,
            eye_offset: 3.0,
            eye_range: 85.0,
            speed: 1.0,
            max_speed: 2.0,
            friction: 0.95,
            rewards: RewardsConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct RewardsConfig {
    pub food: f32,
    pub poison: f32,
    pub proximity_shaping: bool,
}
impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            food: 5.0,
            poison: -6.0,
            proximity_shaping: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    TemporalDifference,
    Tabular,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct RLConfig {
    pub learn: bool,
    pub learner: LearnerKind,
    pub worker_thread: bool,
    pub ticks: usize,
    pub report_every: usize,
    pub save_path: String,
    pub load_path: Option<String>,
    pub brain: BrainConfig,
    pub tabular: TabularConfig,
}
impl Default for RLConfig {
    fn default() -> Self {
        Self {
            learn: true,
            learner: LearnerKind::TemporalDifference,
            worker_thread: false,
            ticks: 20000,
            report_every: 1000,
            save_path: "models".to_string(),
            load_path: None,
            brain: BrainConfig::default(),
            tabular: TabularConfig::default(),
        }
    }
}

/// One layer of the value network.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerDef {
    Input { width: usize },
    Fc { num_neurons: usize },
    Regression { num_neurons: usize },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    pub learning_rate: f32,
    pub momentum: f32,
    pub batch_size: usize,
    pub l2_decay: f32,
}
impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.0,
            batch_size: 64,
            l2_decay: 0.01,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BrainConfig {
    pub temporal_window: usize,
    pub experience_size: usize,
    /// Defaults to `min(experience_size * 0.1, 1000)`.
    pub start_learn_threshold: Option<usize>,
    pub gamma: f32,
    pub learning_steps_total: usize,
    pub learning_steps_burnin: usize,
    pub epsilon_min: f32,
    pub epsilon_test_time: f32,
    pub random_action_distribution: Option<Vec<f32>>,
    pub hidden_layer_sizes: Vec<usize>,
    pub layer_defs: Option<Vec<LayerDef>>,
    pub trainer: TrainerConfig,
    pub seed: Option<u64>,
}
impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            temporal_window: 1,
            experience_size: 30000,
            start_learn_threshold: None,
            gamma: 0.8,
            learning_steps_total: 100000,
            learning_steps_burnin: 3000,
            epsilon_min: 0.05,
            epsilon_test_time: 0.01,
            random_action_distribution: None,
            hidden_layer_sizes: Vec::new(),
            layer_defs: None,
            trainer: TrainerConfig::default(),
            seed: None,
        }
    }
}
impl BrainConfig {
    pub fn start_learn_threshold(&self) -> usize {
        self.start_learn_threshold
            .unwrap_or_else(|| ((self.experience_size as f32 * 0.1).floor() as usize).min(1000))
    }
    pub fn window_size(&self) -> usize {
        self.temporal_window.max(2)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRule {
    QLearning,
    Sarsa,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TabularConfig {
    pub alpha: f32,
    pub gamma: f32,
    pub epsilon: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,
    pub bins: usize,
    pub rule: UpdateRule,
    pub q_init: f32,
    pub tderror_clamp: f32,
    pub seed: Option<u64>,
}
impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.9995,
            bins: 4,
            rule: UpdateRule::QLearning,
            q_init: 0.0,
            tderror_clamp: 1.0,
            seed: None,
        }
    }
}

pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let config_file = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(config_file.as_str()).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.world.validate()?;
    Ok(config)
}

/// Looks for `config.toml` in the working directory, then its parent.
/// Falls back to defaults when neither exists.
pub fn read_config() -> Result<Config, ConfigError> {
    let cwd = env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    let mut path = cwd.clone();
    path.push("config.toml");
    if path.is_file() {
        return parse_config(&path);
    }
    if let Some(parent) = cwd.parent() {
        let path = parent.join("config.toml");
        if path.is_file() {
            return parse_config(&path);
        }
    }
    info!("no config.toml found, using defaults");
    Ok(Config::default())
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.rl.brain, BrainConfig::default());
        assert_eq!(cfg.agent.variant, AgentVariant::DifferentialDrive);
        assert_eq!(cfg.rl.brain.start_learn_threshold(), 1000);
        assert_eq!(cfg.rl.brain.window_size(), 2);
    }

    #[test]
    fn test_partial_document() {
        let cfg: Config = toml::from_str(
            r#"
            [agent]
            variant = "holonomic"
            eye_count = 30

            [rl]
            learner = "tabular"

            [rl.brain]
            experience_size = 500
            temporal_window = 3
            layer_defs = [
                { type = "input", width = 10 },
                { type = "fc", num_neurons = 8 },
                { type = "regression", num_neurons = 4 },
            ]

            [rl.brain.trainer]
            batch_size = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.variant, AgentVariant::Holonomic);
        assert_eq!(cfg.agent.eye_count, 30);
        assert_eq!(cfg.rl.learner, LearnerKind::Tabular);
        assert_eq!(cfg.rl.brain.start_learn_threshold(), 50);
        assert_eq!(cfg.rl.brain.window_size(), 3);
        assert_eq!(cfg.rl.brain.trainer.batch_size, 8);
        assert_eq!(cfg.rl.brain.trainer.learning_rate, 0.01);
        assert_eq!(
            cfg.rl.brain.layer_defs.as_deref(),
            Some(
                &[
                    LayerDef::Input { width: 10 },
                    LayerDef::Fc { num_neurons: 8 },
                    LayerDef::Regression { num_neurons: 4 },
                ][..]
            )
        );
    }

    #[test]
    fn test_degenerate_world_is_rejected() {
        assert!(WorldConfig::default().validate().is_ok());
        let narrow = WorldConfig {
            width: 1.5,
            ..WorldConfig::default()
        };
        assert!(matches!(narrow.validate(), Err(ConfigError::Invalid(_))));
        let flat = WorldConfig {
            height: 0.0,
            ..WorldConfig::default()
        };
        assert!(flat.validate().is_err());
        let padded = WorldConfig {
            pad: 300.0,
            ..WorldConfig::default()
        };
        assert!(padded.validate().is_err());

        let path = std::env::temp_dir().join("td_sandbox_narrow_world.toml");
        fs::write(&path, "[world]\nwidth = 1.5\n").unwrap();
        assert!(matches!(parse_config(&path), Err(ConfigError::Invalid(_))));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml");
        let cfg = parse_config(&path).unwrap();
        assert_eq!(cfg.world.width, 700.0);
    }

    #[test]
    fn test_bad_document_is_an_error() {
        let dir = std::env::temp_dir().join("td_sandbox_config_test.toml");
        fs::write(&dir, "[rl\nlearn = ").unwrap();
        assert!(matches!(parse_config(&dir), Err(ConfigError::Parse { .. })));
        let _ = fs::remove_file(&dir);
    }
}
