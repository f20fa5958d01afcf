use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn one() -> f32 {
    1.
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActFnConfig {
    Sigmoid {
        #[serde(default = "one")]
        amp: f32,
    },
    Relu,
    LeakyRelu {
        slope: f32,
    },
    Tanh,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitConfig {
    Const {
        value: f32,
    },
    Uniform {
        low: f32,
        high: f32,
    },
    Normal {
        mean: f32,
        std_dev: f32,
    },
    XavierUniform,
    Xavier,
    #[default]
    Kaiming,
    LecunUniform,
    Lecun,
}

fn eps() -> f32 {
    1e-5
}

fn momentum() -> f32 {
    0.1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerConfig {
    Dense {
        dim: (usize, usize),
        #[serde(default)]
        init: InitConfig,
        #[serde(default)]
        act_fn: Option<ActFnConfig>,
    },
    BatchNorm {
        features: usize,
        #[serde(default = "eps")]
        eps: f32,
        #[serde(default = "momentum")]
        momentum: f32,
    },
    Dropout {
        p: f32,
    },
    Activation {
        act_fn: ActFnConfig,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialConfig {
    #[serde(default)]
    pub seed: u64,
    pub layers: Vec<LayerConfig>,
}

/// Named sequential modules, e.g. a generator and a discriminator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub modules: BTreeMap<String, SequentialConfig>,
}
