use ndarray::{Array2, ArrayView2};

use super::{Activation, BatchNorm, Dense, Dropout, SyncBatchNorm};
use crate::{Param, Result, Tensor};

/// Every layer a `Sequential` can hold.
#[derive(Clone, Debug)]
pub enum Layer {
    Dense(Dense),
    BatchNorm(BatchNorm),
    SyncBatchNorm(SyncBatchNorm),
    Dropout(Dropout),
    Activation(Activation),
}
use Layer::*;

impl Layer {
    pub fn forward(&mut self, x: ArrayView2<f32>, training: bool) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.forward(x),
            BatchNorm(l) => l.forward(x, training),
            SyncBatchNorm(l) => l.forward(x, training),
            Dropout(l) => Ok(l.forward(x, training)),
            Activation(l) => Ok(l.forward(x)),
        }
    }

    pub fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.backward(d),
            BatchNorm(l) => l.backward(d),
            SyncBatchNorm(l) => l.backward(d),
            Dropout(l) => Ok(l.backward(d)),
            Activation(l) => l.backward(d),
        }
    }

    pub fn params(&self) -> Vec<(&'static str, &Param)> {
        match self {
            Dense(l) => l.params(),
            BatchNorm(l) => l.params(),
            SyncBatchNorm(l) => l.params(),
            Dropout(_) | Activation(_) => Vec::new(),
        }
    }

    pub fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        match self {
            Dense(l) => l.params_mut(),
            BatchNorm(l) => l.params_mut(),
            SyncBatchNorm(l) => l.params_mut(),
            Dropout(_) | Activation(_) => Vec::new(),
        }
    }

    pub fn buffers(&self) -> Vec<(&'static str, &Tensor)> {
        match self {
            BatchNorm(l) => l.buffers(),
            SyncBatchNorm(l) => l.buffers(),
            _ => Vec::new(),
        }
    }

    /// Every tensor that makes up this layer's state, parameters first.
    pub fn state(&self) -> Vec<(&'static str, &Tensor)> {
        let params = self.params().into_iter().map(|(k, p)| (k, &p.value));
        params.chain(self.buffers()).collect()
    }

    pub fn state_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        match self {
            Dense(l) => l.state_mut(),
            BatchNorm(l) => l.state_mut(),
            SyncBatchNorm(l) => l.state_mut(),
            Dropout(_) | Activation(_) => Vec::new(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Dense(l) => l.describe(),
            BatchNorm(l) => l.describe(),
            SyncBatchNorm(l) => l.describe(),
            Dropout(l) => l.describe(),
            Activation(l) => l.describe(),
        }
    }
}
