//! Persisting and restoring the live components of an algorithm.
//!
//! A checkpoint is a single file holding the iteration it was taken at and one item per
//! component: `module_<name>`, `optim_<name>` and, optionally, `sched_<name>`.

mod codec;
mod items;
mod reconcile;

pub use codec::{CheckpointRecord, ItemState, MAGIC, VERSION, read, write};
pub use items::ItemName;
pub use reconcile::{PrefixDetection, Remap, reconcile};
