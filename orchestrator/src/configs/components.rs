use std::{collections::BTreeMap, fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OrchestratorError, Result, checkpoint::PrefixDetection};

fn one() -> f32 {
    1.
}

/// A loss function and the weight its value is scaled by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossConfig {
    /// The registry entry to build, the entry's own name when absent.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default = "one")]
    pub weight: f32,
    #[serde(default)]
    pub opts: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub opts: Option<Value>,
}

fn slow() -> String {
    "gen".to_string()
}

fn fast() -> String {
    "dis".to_string()
}

/// The two time-scale update rule: the slow component trains at half the base rate, the fast one
/// at twice it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TturConfig {
    #[serde(rename = "if_ttur", alias = "enabled")]
    pub enabled: bool,
    pub lr: f32,
    #[serde(default = "slow")]
    pub slow: String,
    #[serde(default = "fast")]
    pub fast: String,
}

/// One optimizer per component, plus the optional `"TTUR"` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizersConfig {
    #[serde(rename = "TTUR", default, skip_serializing_if = "Option::is_none")]
    pub ttur: Option<TturConfig>,
    #[serde(flatten)]
    pub components: BTreeMap<String, OptimizerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub opts: Option<Value>,
}

/// A reporting metric and the unit its score is printed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionConfig {
    /// The registry entry to build, the entry's own name when absent.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub opts: Option<Value>,
    #[serde(default)]
    pub unit: String,
}

fn checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn interval() -> u64 {
    100
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "checkpoint_dir")]
    pub dir: PathBuf,
    /// Save every `interval` iterations.
    #[serde(default = "interval")]
    pub interval: u64,
    #[serde(default = "yes")]
    pub keep_schedulers: bool,
    #[serde(default)]
    pub prefix_detection: PrefixDetection,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: checkpoint_dir(),
            interval: interval(),
            keep_schedulers: true,
            prefix_detection: PrefixDetection::default(),
        }
    }
}

fn iterations() -> u64 {
    200
}

fn batch_size() -> usize {
    32
}

fn latent_dim() -> usize {
    4
}

/// The parameters of the bundled training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "iterations")]
    pub iterations: u64,
    #[serde(default = "batch_size")]
    pub batch_size: usize,
    #[serde(default = "latent_dim")]
    pub latent_dim: usize,
    #[serde(default)]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: iterations(),
            batch_size: batch_size(),
            latent_dim: latent_dim(),
            seed: 0,
        }
    }
}

/// A complete run: the model's options and every component built around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Handed as is to the model constructor.
    pub model: Value,
    #[serde(default)]
    pub losses: BTreeMap<String, LossConfig>,
    #[serde(default)]
    pub optimizers: OptimizersConfig,
    #[serde(default)]
    pub schedulers: BTreeMap<String, SchedulerConfig>,
    #[serde(default)]
    pub criteria: BTreeMap<String, CriterionConfig>,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub use_accelerator: bool,
}

impl AlgorithmConfig {
    /// Loads an `AlgorithmConfig` from a JSON file.
    ///
    /// # Errors
    /// `OrchestratorError::Io` if the file can't be read, `OrchestratorError::InvalidConfig` if it
    /// can't be parsed or describes an impossible run.
    pub fn from_json_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;

        Self::from_json_str(&content)
            .map_err(|e| OrchestratorError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Parses an `AlgorithmConfig` from JSON text.
    ///
    /// # Errors
    /// `OrchestratorError::InvalidConfig` if `content` can't be parsed or describes an impossible
    /// run.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| OrchestratorError::InvalidConfig(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.checkpoint.interval == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "checkpoint interval must be positive".into(),
            ));
        }

        if let Some(name) = self
            .schedulers
            .keys()
            .find(|name| !self.optimizers.components.contains_key(*name))
        {
            return Err(OrchestratorError::InvalidConfig(format!(
                "scheduler `{name}` has no optimizer to drive"
            )));
        }

        Ok(())
    }
}
