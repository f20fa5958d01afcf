//! Builds, trains and checkpoints the components of adversarial training algorithms.

mod algorithm;
pub mod bundle;
pub mod checkpoint;
pub mod configs;
pub mod error;
mod model;
pub mod registry;

pub use algorithm::Algorithm;
pub use error::{ComponentKind, ConstructionError, ItemLocation, OrchestratorError, Result};
pub use model::{Model, ModelConstructor, SequentialConstructor};
pub use registry::Registry;
