//! Learning rate schedules driven by a step counter.
//!
//! A scheduler doesn't own or borrow its optimizer between steps, it is handed the optimizer
//! it is bound to every time it steps.

mod policies;
mod lr_scheduler;

pub use policies::{CosineAnnealingLr, ExponentialLr, MultiStepLr, StepLr};
pub use lr_scheduler::{LrPolicy, LrScheduler, Scheduler, SchedulerState};
