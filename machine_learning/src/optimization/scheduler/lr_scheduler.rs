use serde::{Deserialize, Serialize};

use crate::{MlErr, Result, optimization::Optimizer};

/// Advances the learning rate of an optimizer.
pub trait Scheduler: Send {
    /// Advances the step counter by one and writes the new learning rate into `optimizer`.
    fn step(&mut self, optimizer: &mut dyn Optimizer);

    /// The amount of steps taken so far.
    fn last_epoch(&self) -> u64;

    /// The learning rate for the current step.
    fn learning_rate(&self) -> f32;

    fn state_dict(&self) -> SchedulerState;

    /// Restores a state produced by `state_dict`.
    ///
    /// # Errors
    /// If the state belongs to another kind of scheduler.
    fn load_state_dict(&mut self, state: &SchedulerState) -> Result<()>;
}

/// The serializable state of a scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub kind: String,
    pub base_lr: f32,
    pub last_epoch: u64,
}

/// A closed form learning rate schedule.
pub trait LrPolicy: Send {
    const KIND: &'static str;

    /// The learning rate after `epoch` steps, starting from `base_lr`.
    fn lr_at(&self, base_lr: f32, epoch: u64) -> f32;
}

/// A `Scheduler` following the closed form `P`.
#[derive(Debug, Clone)]
pub struct LrScheduler<P: LrPolicy> {
    policy: P,
    base_lr: f32,
    last_epoch: u64,
}

impl<P: LrPolicy> LrScheduler<P> {
    /// Creates a new scheduler, taking the optimizer's current learning rate as the base.
    ///
    /// # Arguments
    /// * `policy` - The schedule to follow.
    /// * `optimizer` - The optimizer this scheduler is bound to.
    pub fn new(policy: P, optimizer: &dyn Optimizer) -> Self {
        Self {
            policy,
            base_lr: optimizer.learning_rate(),
            last_epoch: 0,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }
}

impl<P: LrPolicy> Scheduler for LrScheduler<P> {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.last_epoch += 1;
        optimizer.set_learning_rate(self.learning_rate());
    }

    fn last_epoch(&self) -> u64 {
        self.last_epoch
    }

    fn learning_rate(&self) -> f32 {
        self.policy.lr_at(self.base_lr, self.last_epoch)
    }

    fn state_dict(&self) -> SchedulerState {
        SchedulerState {
            kind: P::KIND.to_string(),
            base_lr: self.base_lr,
            last_epoch: self.last_epoch,
        }
    }

    fn load_state_dict(&mut self, state: &SchedulerState) -> Result<()> {
        if state.kind != P::KIND {
            return Err(MlErr::InvalidState(format!(
                "expected the state of a `{}` scheduler, got `{}`",
                P::KIND,
                state.kind
            )));
        }

        self.base_lr = state.base_lr;
        self.last_epoch = state.last_epoch;
        Ok(())
    }
}
