use std::path::PathBuf;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{ComponentKind, OrchestratorError, Result};

/// Parses the options of component `name`, falling back to its defaults when there are none.
pub(crate) fn parse<T>(kind: ComponentKind, name: &str, opts: Option<&Value>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match opts {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value).map_err(|source| OrchestratorError::InvalidOptions {
            kind,
            name: name.to_string(),
            source,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgdOptions {
    pub lr: f32,
    pub momentum: f32,
    pub weight_decay: f32,
}

impl Default for SgdOptions {
    fn default() -> Self {
        Self {
            lr: 1e-2,
            momentum: 0.,
            weight_decay: 0.,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamOptions {
    pub lr: f32,
    pub betas: (f32, f32),
    pub eps: f32,
    pub weight_decay: f32,
}

impl Default for AdamOptions {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            betas: (0.9, 0.999),
            eps: 1e-8,
            weight_decay: 0.,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepLrOptions {
    pub step_size: u64,
    pub gamma: f32,
}

impl Default for StepLrOptions {
    fn default() -> Self {
        Self {
            step_size: 1,
            gamma: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiStepLrOptions {
    pub milestones: Vec<u64>,
    pub gamma: f32,
}

impl Default for MultiStepLrOptions {
    fn default() -> Self {
        Self {
            milestones: Vec::new(),
            gamma: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CosineAnnealingLrOptions {
    #[serde(alias = "T_max")]
    pub t_max: u64,
    pub eta_min: f32,
}

impl Default for CosineAnnealingLrOptions {
    fn default() -> Self {
        Self {
            t_max: 1,
            eta_min: 0.,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialLrOptions {
    pub gamma: f32,
}

impl Default for ExponentialLrOptions {
    fn default() -> Self {
        Self { gamma: 0.99 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharbonnierOptions {
    pub eps: f32,
}

impl Default for CharbonnierOptions {
    fn default() -> Self {
        Self { eps: 1e-6 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpipsNet {
    #[default]
    Alex,
}

/// Without `weights` the backbone is randomly initialized from `seed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LpipsOptions {
    pub net: LpipsNet,
    pub weights: Option<PathBuf>,
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_options_give_defaults() {
        let opts: AdamOptions = parse(ComponentKind::Optimizer, "Adam", None).unwrap();
        assert_eq!(opts, AdamOptions::default());

        let opts: AdamOptions =
            parse(ComponentKind::Optimizer, "Adam", Some(&Value::Null)).unwrap();
        assert_eq!(opts, AdamOptions::default());
    }

    #[test]
    fn partial_options_keep_other_defaults() {
        let value = json!({ "lr": 0.5 });
        let opts: SgdOptions = parse(ComponentKind::Optimizer, "SGD", Some(&value)).unwrap();

        assert_eq!(opts.lr, 0.5);
        assert_eq!(opts.momentum, 0.);
    }

    #[test]
    fn accepts_upper_case_t_max() {
        let value = json!({ "T_max": 50 });
        let opts: CosineAnnealingLrOptions =
            parse(ComponentKind::Scheduler, "CosineAnnealingLR", Some(&value)).unwrap();

        assert_eq!(opts.t_max, 50);
    }

    #[test]
    fn wrong_types_are_invalid_options() {
        let value = json!({ "lr": "fast" });
        let err = parse::<SgdOptions>(ComponentKind::Optimizer, "SGD", Some(&value)).unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::InvalidOptions { kind: ComponentKind::Optimizer, ref name, .. }
                if name == "SGD"
        ));
    }
}
