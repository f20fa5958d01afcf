use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;
use safetensors::SafeTensorError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        key: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    StateDictMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    InvalidState(String),
    InvalidDistribution(String),
    EmptyInput(&'static str),
    RepresentationMismatch,
    ConstantInput,
    Collective(String),
    Shape(ShapeError),
    Safetensors(SafeTensorError),
    Io(io::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch { key, got, expected } => write!(
                f,
                "The tensor `{key}` has shape {got:?} but {expected:?} was expected"
            ),
            MlErr::StateDictMismatch {
                missing,
                unexpected,
            } => write!(
                f,
                "The state dict doesn't match the module, missing keys: {missing:?}, unexpected keys: {unexpected:?}"
            ),
            MlErr::InvalidState(msg) => write!(f, "Invalid saved state: {msg}"),
            MlErr::InvalidDistribution(msg) => write!(f, "Invalid distribution: {msg}"),
            MlErr::EmptyInput(what) => write!(f, "The {what} is empty"),
            MlErr::RepresentationMismatch => write!(
                f,
                "Both images must share the same representation, pixels or tensors"
            ),
            MlErr::ConstantInput => write!(
                f,
                "The correlation of a constant input is undefined"
            ),
            MlErr::Collective(msg) => write!(f, "Collective operation failed: {msg}"),
            MlErr::Shape(e) => write!(f, "Shape error: {e}"),
            MlErr::Safetensors(e) => write!(f, "Failed to read safetensors: {e}"),
            MlErr::Io(e) => write!(f, "Io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Safetensors(e) => Some(e),
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<SafeTensorError> for MlErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Safetensors(value)
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rand_distr::uniform::Error> for MlErr {
    fn from(value: rand_distr::uniform::Error) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}

impl From<rand_distr::NormalError> for MlErr {
    fn from(value: rand_distr::NormalError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}
