use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::{Param, Result, StateDict, collective::ProcessGroup, device::Device};

/// A trainable network handled through a fixed contract.
///
/// Parameter and state names are stable identifiers: they are what checkpoints are keyed by.
pub trait Module: Send {
    /// Makes a forward pass, caching whatever `backward` needs.
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Propagates `d` (the derivative of the loss with respect to the last output) backwards,
    /// accumulating the gradient of every parameter.
    ///
    /// # Returns
    /// The derivative with respect to the last input.
    fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>>;

    fn named_params(&self) -> Vec<(String, &Param)>;

    fn named_params_mut(&mut self) -> Vec<(String, &mut Param)>;

    /// Every parameter value and buffer, by name.
    fn state_dict(&self) -> StateDict;

    /// Overwrites every parameter and buffer from `state`.
    ///
    /// # Errors
    /// If `state` misses a key, carries an unexpected key or a tensor of a different shape. In
    /// that case the module is left untouched.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;

    /// Switches layers with mode dependent behaviour (normalization, dropout). Idempotent.
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    fn to_device(&mut self, device: Device);

    fn device(&self) -> Device;

    /// Swaps every batch normalization layer for one whose statistics are shared across `group`.
    ///
    /// # Returns
    /// The amount of layers converted.
    fn convert_sync_batchnorm(&mut self, _group: &Arc<dyn ProcessGroup>) -> usize {
        0
    }

    /// Whether this module is wrapped for distributed gradient averaging.
    fn is_distributed(&self) -> bool {
        false
    }

    /// A line per layer describing the architecture.
    fn summary(&self) -> Vec<String> {
        Vec::new()
    }

    fn num_params(&self) -> usize {
        self.named_params().iter().map(|(_, p)| p.len()).sum()
    }

    fn zero_grad(&mut self) {
        self.named_params_mut()
            .into_iter()
            .for_each(|(_, p)| p.zero_grad());
    }
}

impl<M: Module + ?Sized> Module for Box<M> {
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        (**self).forward(x)
    }

    fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        (**self).backward(d)
    }

    fn named_params(&self) -> Vec<(String, &Param)> {
        (**self).named_params()
    }

    fn named_params_mut(&mut self) -> Vec<(String, &mut Param)> {
        (**self).named_params_mut()
    }

    fn state_dict(&self) -> StateDict {
        (**self).state_dict()
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        (**self).load_state_dict(state)
    }

    fn set_training(&mut self, training: bool) {
        (**self).set_training(training)
    }

    fn is_training(&self) -> bool {
        (**self).is_training()
    }

    fn to_device(&mut self, device: Device) {
        (**self).to_device(device)
    }

    fn device(&self) -> Device {
        (**self).device()
    }

    fn convert_sync_batchnorm(&mut self, group: &Arc<dyn ProcessGroup>) -> usize {
        (**self).convert_sync_batchnorm(group)
    }

    fn is_distributed(&self) -> bool {
        (**self).is_distributed()
    }

    fn summary(&self) -> Vec<String> {
        (**self).summary()
    }

    fn num_params(&self) -> usize {
        (**self).num_params()
    }

    fn zero_grad(&mut self) {
        (**self).zero_grad()
    }
}
