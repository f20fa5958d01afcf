use ndarray::{Ix1, Ix2, IxDyn, prelude::*};
use rand::Rng;

use crate::{
    MlErr, Param, Result, Tensor,
    arch::{activations::ActFn, init::Init},
};

/// A fully connected layer, `a = act_fn(x * w + b)`.
///
/// Optimizations:
///   1. Find a way to not copy `x` in each `Dense::forward` call.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    weight: Param,
    bias: Param,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer.
    /// * `act_fn` - An optional activation applied to the output.
    /// * `init` - How to initialize the weights, biases start at zero.
    /// * `rng` - The random number generator used by `init`.
    ///
    /// # Returns
    /// A new `Dense` instance or an error if `init` is invalid.
    pub fn new<R: Rng>(
        dim: (usize, usize),
        act_fn: Option<ActFn>,
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        let weight = init.sample(rng, &[dim.0, dim.1], dim.0, dim.1)?;
        let bias = Tensor::zeros(IxDyn(&[dim.1]));
        let zeros = Array2::zeros((0, 0));

        Ok(Self {
            dim,
            act_fn,
            weight: Param::new(weight),
            bias: Param::new(bias),
            x: zeros.clone(),
            z: zeros,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let w = self.weight.value.view().into_dimensionality::<Ix2>()?;
        let b = self.bias.value.view().into_dimensionality::<Ix1>()?;

        let z = x.dot(&w) + &b;
        self.x = x.to_owned();

        let out = match self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.z = z;
        Ok(out)
    }

    pub fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut d = d.to_owned();

        if let Some(act_fn) = self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let dw = self.x.t().dot(&d);
        let db = d.sum_axis(Axis(0));
        self.weight.grad += &dw.into_dyn();
        self.bias.grad += &db.into_dyn();

        let w = self.weight.value.view().into_dimensionality::<Ix2>()?;
        Ok(d.dot(&w.t()))
    }

    pub fn params(&self) -> Vec<(&'static str, &Param)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }

    pub fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        vec![("weight", &mut self.weight), ("bias", &mut self.bias)]
    }

    pub fn state_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        vec![
            ("weight", &mut self.weight.value),
            ("bias", &mut self.bias.value),
        ]
    }

    pub fn describe(&self) -> String {
        let act = self.act_fn.map(|a| a.name()).unwrap_or("linear");
        format!("Dense({}, {}, {act})", self.dim.0, self.dim.1)
    }
}
