use std::{error::Error, fmt, io, path::PathBuf};

use distributed::WrapErr;
use machine_learning::MlErr;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// The boxed error a model constructor may fail with.
pub type ConstructionError = Box<dyn Error + Send + Sync>;

/// The families of components the registry can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Loss,
    Optimizer,
    Scheduler,
    Metric,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loss => "loss",
            Self::Optimizer => "optimizer",
            Self::Scheduler => "scheduler",
            Self::Metric => "metric",
        };

        write!(f, "{name}")
    }
}

/// Where a requested checkpoint item couldn't be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemLocation {
    /// The checkpoint file has no entry for it.
    Checkpoint,
    /// No live component matches it.
    Components,
}

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// A component name the registry doesn't know.
    UnsupportedComponent { kind: ComponentKind, name: String },
    /// The options of a known component couldn't be parsed.
    InvalidOptions {
        kind: ComponentKind,
        name: String,
        source: serde_json::Error,
    },
    /// Invalid configuration, caught before building anything.
    InvalidConfig(String),
    /// The user supplied constructor failed.
    ModelConstruction(ConstructionError),
    /// An operation needs a component that hasn't been created yet.
    NotCreated(&'static str),
    /// No live component goes by this name.
    UnknownComponent { bundle: &'static str, name: String },
    /// Wrapping a module for distributed training failed.
    DistributedWrap(WrapErr),
    CheckpointNotFound(PathBuf),
    CheckpointItemMissing { item: String, location: ItemLocation },
    /// The file exists but isn't a checkpoint this build can read.
    CorruptCheckpoint { path: PathBuf, reason: String },
    /// A saved module state mixes prefixed and bare keys.
    MixedPrefixes {
        item: String,
        prefixed: usize,
        bare: usize,
    },
    /// A save would record an iteration older than the last one saved or loaded.
    IterationRegressed { last: u64, got: u64 },
    /// A checkpoint item was found but couldn't be applied.
    ItemLoad { item: String, source: MlErr },
    Codec(bincode::Error),
    Ml(MlErr),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedComponent { kind, name } => {
                write!(f, "unsupported {kind} `{name}`")
            }
            Self::InvalidOptions { kind, name, source } => {
                write!(f, "invalid options for {kind} `{name}`: {source}")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::ModelConstruction(e) => write!(f, "model construction failed: {e}"),
            Self::NotCreated(what) => write!(f, "no {what} has been created yet"),
            Self::UnknownComponent { bundle, name } => {
                write!(f, "there is no {bundle} named `{name}`")
            }
            Self::DistributedWrap(e) => write!(f, "distributed wrap failed: {e}"),
            Self::CheckpointNotFound(path) => {
                write!(f, "checkpoint not found at {}", path.display())
            }
            Self::CheckpointItemMissing { item, location } => match location {
                ItemLocation::Checkpoint => write!(f, "the checkpoint has no item `{item}`"),
                ItemLocation::Components => write!(f, "no live component matches item `{item}`"),
            },
            Self::CorruptCheckpoint { path, reason } => {
                write!(f, "corrupt checkpoint {}: {reason}", path.display())
            }
            Self::MixedPrefixes {
                item,
                prefixed,
                bare,
            } => write!(
                f,
                "the state of `{item}` mixes {prefixed} prefixed and {bare} bare keys"
            ),
            Self::IterationRegressed { last, got } => write!(
                f,
                "refusing to save iteration {got}, iteration {last} was already recorded"
            ),
            Self::ItemLoad { item, source } => write!(f, "failed to load `{item}`: {source}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Ml(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidOptions { source, .. } => Some(source),
            Self::ModelConstruction(e) => Some(e.as_ref()),
            Self::DistributedWrap(e) => Some(e),
            Self::ItemLoad { source, .. } => Some(source),
            Self::Codec(e) => Some(e.as_ref()),
            Self::Ml(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<WrapErr> for OrchestratorError {
    fn from(e: WrapErr) -> Self {
        Self::DistributedWrap(e)
    }
}

impl From<bincode::Error> for OrchestratorError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec(e)
    }
}
