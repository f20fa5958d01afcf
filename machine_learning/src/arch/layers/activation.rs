use ndarray::{Array2, ArrayView2};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A standalone element-wise activation.
#[derive(Clone, Debug)]
pub struct Activation {
    act_fn: ActFn,
    z: Array2<f32>,
}

impl Activation {
    pub fn new(act_fn: ActFn) -> Self {
        Self {
            act_fn,
            z: Array2::zeros((0, 0)),
        }
    }

    pub fn forward(&mut self, x: ArrayView2<f32>) -> Array2<f32> {
        self.z = x.to_owned();
        let act_fn = self.act_fn;
        x.mapv(|z| act_fn.f(z))
    }

    pub fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "activation delta",
                got: d.len(),
                expected: self.z.len(),
            });
        }

        let act_fn = self.act_fn;
        let mut d = d.to_owned();
        d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        Ok(d)
    }

    pub fn describe(&self) -> String {
        format!("Activation({})", self.act_fn.name())
    }
}
