pub mod arch;
pub mod collective;
pub mod device;
pub mod error;
pub mod metrics;
pub mod optimization;
pub mod tensor;

pub use error::{MlErr, Result};
pub use tensor::{Param, StateDict, Tensor};
