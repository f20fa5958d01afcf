//! Everything an algorithm run is described with, as read from JSON.

mod components;
mod model;
mod options;
pub mod ttur;

pub use components::{
    AlgorithmConfig, CheckpointConfig, CriterionConfig, LossConfig, OptimizerConfig,
    OptimizersConfig, SchedulerConfig, TrainingConfig, TturConfig,
};
pub use model::{ActFnConfig, InitConfig, LayerConfig, ModelConfig, SequentialConfig};
pub use options::{
    AdamOptions, CharbonnierOptions, CosineAnnealingLrOptions, ExponentialLrOptions, LpipsNet,
    LpipsOptions, MultiStepLrOptions, SgdOptions, StepLrOptions,
};
pub(crate) use options::parse;
