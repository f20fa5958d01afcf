use std::{fmt, sync::Arc};

use ndarray::{Array2, ArrayView2};

use super::BatchNorm;
use crate::{Param, Result, Tensor, collective::ProcessGroup};

/// Batch normalization whose statistics are computed over the whole process group.
///
/// Every training forward and backward pass is a collective call: all ranks must run it.
#[derive(Clone)]
pub struct SyncBatchNorm {
    inner: BatchNorm,
    group: Arc<dyn ProcessGroup>,
}

impl SyncBatchNorm {
    /// Converts a local `BatchNorm`, keeping its parameters and running statistics.
    pub fn from_batch_norm(inner: BatchNorm, group: Arc<dyn ProcessGroup>) -> Self {
        Self { inner, group }
    }

    pub fn forward(&mut self, x: ArrayView2<f32>, training: bool) -> Result<Array2<f32>> {
        let group = &self.group;
        self.inner.forward_reduced(x, training, |stats| {
            group.all_reduce_mean(stats)?;
            Ok(group.world_size())
        })
    }

    pub fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        let group = &self.group;
        self.inner.backward_reduced(d, |stats| {
            group.all_reduce_mean(stats)?;
            Ok(group.world_size())
        })
    }

    pub fn params(&self) -> Vec<(&'static str, &Param)> {
        self.inner.params()
    }

    pub fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        self.inner.params_mut()
    }

    pub fn buffers(&self) -> Vec<(&'static str, &Tensor)> {
        self.inner.buffers()
    }

    pub fn state_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        self.inner.state_mut()
    }

    pub fn describe(&self) -> String {
        format!(
            "Sync{} over {} rank(s)",
            self.inner.describe(),
            self.group.world_size()
        )
    }
}

impl fmt::Debug for SyncBatchNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncBatchNorm")
            .field("inner", &self.inner)
            .field("rank", &self.group.rank())
            .finish()
    }
}
