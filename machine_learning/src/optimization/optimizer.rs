use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{MlErr, Param, Result, Tensor};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer: Send {
    /// Updates the given parameters using their accumulated gradients.
    ///
    /// # Arguments
    /// * `params` - The parameters to update, in the same order the optimizer was built for.
    ///
    /// # Returns
    /// An error if `params` doesn't match the optimizer's parameter group.
    fn step(&mut self, params: Vec<(String, &mut Param)>) -> Result<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);

    fn state_dict(&self) -> OptimizerState;

    /// Restores a state produced by `state_dict`.
    ///
    /// # Errors
    /// If the state belongs to another kind of optimizer or its buffers don't fit.
    fn load_state_dict(&mut self, state: &OptimizerState) -> Result<()>;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn step(&mut self, params: Vec<(String, &mut Param)>) -> Result<()> {
        (**self).step(params)
    }

    fn learning_rate(&self) -> f32 {
        (**self).learning_rate()
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        (**self).set_learning_rate(learning_rate)
    }

    fn state_dict(&self) -> OptimizerState {
        (**self).state_dict()
    }

    fn load_state_dict(&mut self, state: &OptimizerState) -> Result<()> {
        (**self).load_state_dict(state)
    }
}

/// The serializable state of an optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub kind: String,
    pub learning_rate: f32,
    pub step: u64,
    pub buffers: BTreeMap<String, Vec<Tensor>>,
}

impl OptimizerState {
    pub fn new(kind: &str, learning_rate: f32, step: u64) -> Self {
        Self {
            kind: kind.to_string(),
            learning_rate,
            step,
            buffers: BTreeMap::new(),
        }
    }

    pub fn with_buffer(mut self, name: &str, tensors: Vec<Tensor>) -> Self {
        self.buffers.insert(name.to_string(), tensors);
        self
    }

    /// Fails unless this state was produced by an optimizer of kind `kind`.
    pub(super) fn expect_kind(&self, kind: &str) -> Result<()> {
        if self.kind != kind {
            return Err(MlErr::InvalidState(format!(
                "expected the state of a `{kind}` optimizer, got `{}`",
                self.kind
            )));
        }

        Ok(())
    }

    pub(super) fn buffer(&self, name: &str) -> Result<&[Tensor]> {
        self.buffers
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| MlErr::InvalidState(format!("missing optimizer buffer `{name}`")))
    }
}
