use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use super::{
    Module,
    layers::{Layer, SyncBatchNorm},
};
use crate::{
    Param, Result, StateDict, Tensor,
    collective::ProcessGroup,
    device::Device,
    tensor::{self, check_keys},
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// State keys are `"<layer index>.<field>"`, e.g. `"0.weight"` or `"1.running_mean"`.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    training: bool,
    device: Device,
}

impl Sequential {
    /// Creates a new `Sequential` in training mode, on the cpu.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
            training: true,
            device: Device::Cpu,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl Module for Sequential {
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let training = self.training;
        let mut out = x.to_owned();

        for layer in self.layers.iter_mut() {
            out = layer.forward(out.view(), training)?;
        }

        Ok(out)
    }

    fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut d = d.to_owned();

        for layer in self.layers.iter_mut().rev() {
            d = layer.backward(d.view())?;
        }

        Ok(d)
    }

    fn named_params(&self) -> Vec<(String, &Param)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .params()
                    .into_iter()
                    .map(move |(k, p)| (format!("{i}.{k}"), p))
            })
            .collect()
    }

    fn named_params_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .params_mut()
                    .into_iter()
                    .map(move |(k, p)| (format!("{i}.{k}"), p))
            })
            .collect()
    }

    fn state_dict(&self) -> StateDict {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .state()
                    .into_iter()
                    .map(move |(k, t)| (format!("{i}.{k}"), t.clone()))
            })
            .collect()
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let mut targets: Vec<(String, &mut Tensor)> = self
            .layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .state_mut()
                    .into_iter()
                    .map(move |(k, t)| (format!("{i}.{k}"), t))
            })
            .collect();

        check_keys(state, targets.iter().map(|(k, _)| k.as_str()))?;

        for (key, target) in targets.iter() {
            tensor::check_shape(key, state[key].shape(), target.shape())?;
        }

        for (key, target) in targets.iter_mut() {
            target.assign(&state[key.as_str()]);
        }

        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    fn device(&self) -> Device {
        self.device
    }

    fn convert_sync_batchnorm(&mut self, group: &Arc<dyn ProcessGroup>) -> usize {
        let mut converted = 0;

        for layer in self.layers.iter_mut() {
            if let Layer::BatchNorm(bn) = layer {
                let sync = SyncBatchNorm::from_batch_norm(bn.clone(), Arc::clone(group));
                *layer = Layer::SyncBatchNorm(sync);
                converted += 1;
            }
        }

        converted
    }

    fn summary(&self) -> Vec<String> {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, layer)| format!("({i}) {}", layer.describe()))
            .collect()
    }
}
