mod ddp;
pub mod error;
mod group;
mod wrapper;

pub use ddp::{DistributedDataParallel, PREFIX};
pub use error::{Result, WrapErr};
pub use group::LocalGroup;
pub use wrapper::DistributedWrapper;
