use std::{
    error::Error,
    fmt::{self, Display},
};

use machine_learning::MlErr;

pub type Result<T> = std::result::Result<T, WrapErr>;

/// Why a module couldn't be wrapped for distributed training.
#[derive(Debug)]
pub enum WrapErr {
    /// Wrapping requested without an initialized process group.
    NoProcessGroup,
    /// The module is already wrapped.
    AlreadyWrapped(String),
    /// Synchronizing the initial state across ranks failed.
    Sync { module: String, source: MlErr },
}

impl Display for WrapErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrapErr::NoProcessGroup => {
                write!(f, "no process group has been initialized")
            }
            WrapErr::AlreadyWrapped(module) => {
                write!(f, "module `{module}` is already wrapped")
            }
            WrapErr::Sync { module, source } => {
                write!(f, "failed to synchronize module `{module}`: {source}")
            }
        }
    }
}

impl Error for WrapErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WrapErr::Sync { source, .. } => Some(source),
            _ => None,
        }
    }
}
