use ndarray::{Ix1, IxDyn, prelude::*};

use crate::{MlErr, Param, Result, Tensor};

/// Batch normalization over the feature columns of a batch.
///
/// Training batches are normalized with their own statistics, which also update the running
/// estimates. Evaluation uses the running estimates only.
#[derive(Clone, Debug)]
pub struct BatchNorm {
    features: usize,
    eps: f32,
    momentum: f32,
    weight: Param,
    bias: Param,
    running_mean: Tensor,
    running_var: Tensor,

    // Forward metadata
    xhat: Array2<f32>,
    inv_std: Array1<f32>,
    batch_stats: bool,
}

impl BatchNorm {
    /// Creates a new `BatchNorm` layer with unit scale and zero shift.
    ///
    /// # Arguments
    /// * `features` - The amount of columns of the incoming batches.
    /// * `eps` - Added to the variance for numerical stability.
    /// * `momentum` - The weight of each new batch in the running statistics.
    pub fn new(features: usize, eps: f32, momentum: f32) -> Self {
        Self {
            features,
            eps,
            momentum,
            weight: Param::new(Tensor::ones(IxDyn(&[features]))),
            bias: Param::new(Tensor::zeros(IxDyn(&[features]))),
            running_mean: Tensor::zeros(IxDyn(&[features])),
            running_var: Tensor::ones(IxDyn(&[features])),
            xhat: Array2::zeros((0, features)),
            inv_std: Array1::zeros(features),
            batch_stats: false,
        }
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn forward(&mut self, x: ArrayView2<f32>, training: bool) -> Result<Array2<f32>> {
        self.forward_reduced(x, training, |_| Ok(1))
    }

    pub fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.backward_reduced(d, |_| Ok(1))
    }

    /// Forward pass whose batch statistics go through `reduce` before being used.
    ///
    /// `reduce` receives `[column sums, column sums of squares, row count]` and may replace them
    /// with their mean across several workers, returning the amount of workers averaged.
    pub(super) fn forward_reduced<F>(
        &mut self,
        x: ArrayView2<f32>,
        training: bool,
        mut reduce: F,
    ) -> Result<Array2<f32>>
    where
        F: FnMut(&mut [f32]) -> Result<usize>,
    {
        let f = self.features;
        if x.ncols() != f {
            return Err(MlErr::SizeMismatch {
                what: "batch norm input features",
                got: x.ncols(),
                expected: f,
            });
        }

        let running_mean = self.running_mean.view().into_dimensionality::<Ix1>()?;
        let running_var = self.running_var.view().into_dimensionality::<Ix1>()?;

        let (mean, var) = if training {
            if x.nrows() == 0 {
                return Err(MlErr::EmptyInput("batch"));
            }

            let mut stats = Vec::with_capacity(2 * f + 1);
            stats.extend(x.sum_axis(Axis(0)));
            stats.extend(x.mapv(|v| v * v).sum_axis(Axis(0)));
            stats.push(x.nrows() as f32);

            let workers = reduce(&mut stats)?;
            let count = stats[2 * f];
            let mean = Array1::from_iter(stats[..f].iter().map(|s| s / count));
            let var = Array1::from_iter(
                stats[f..2 * f]
                    .iter()
                    .zip(&mean)
                    .map(|(sq, m)| (sq / count - m * m).max(0.)),
            );

            let n = count * workers as f32;
            let unbiased = if n > 1. { &var * (n / (n - 1.)) } else { var.clone() };
            let m = self.momentum;
            let new_mean = &running_mean * (1. - m) + &mean * m;
            let new_var = &running_var * (1. - m) + unbiased * m;
            self.running_mean = new_mean.into_dyn();
            self.running_var = new_var.into_dyn();

            (mean, var)
        } else {
            (running_mean.to_owned(), running_var.to_owned())
        };

        self.inv_std = var.mapv(|v| 1. / (v + self.eps).sqrt());
        self.xhat = (&x - &mean) * &self.inv_std;
        self.batch_stats = training;

        let gamma = self.weight.value.view().into_dimensionality::<Ix1>()?;
        let beta = self.bias.value.view().into_dimensionality::<Ix1>()?;
        Ok(&self.xhat * &gamma + &beta)
    }

    /// Backward pass whose batch reductions go through `reduce`, see `forward_reduced`.
    pub(super) fn backward_reduced<F>(
        &mut self,
        d: ArrayView2<f32>,
        mut reduce: F,
    ) -> Result<Array2<f32>>
    where
        F: FnMut(&mut [f32]) -> Result<usize>,
    {
        let f = self.features;
        if d.dim() != self.xhat.dim() {
            return Err(MlErr::SizeMismatch {
                what: "batch norm delta",
                got: d.len(),
                expected: self.xhat.len(),
            });
        }

        let d_xhat = &d * &self.xhat;
        let dgamma = d_xhat.sum_axis(Axis(0));
        let dbeta = d.sum_axis(Axis(0));
        self.weight.grad += &dgamma.view().into_dyn();
        self.bias.grad += &dbeta.view().into_dyn();

        let gamma = self.weight.value.view().into_dimensionality::<Ix1>()?;
        let scale = &gamma * &self.inv_std;

        if !self.batch_stats {
            return Ok(&d * &scale);
        }

        let mut stats = Vec::with_capacity(2 * f + 1);
        stats.extend(dbeta.iter().copied());
        stats.extend(dgamma.iter().copied());
        stats.push(d.nrows() as f32);

        reduce(&mut stats)?;
        let count = stats[2 * f];
        let mean_d = Array1::from_iter(stats[..f].iter().map(|s| s / count));
        let mean_dx = Array1::from_iter(stats[f..2 * f].iter().map(|s| s / count));

        Ok((&d - &mean_d - &self.xhat * &mean_dx) * &scale)
    }

    pub fn params(&self) -> Vec<(&'static str, &Param)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }

    pub fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        vec![("weight", &mut self.weight), ("bias", &mut self.bias)]
    }

    pub fn buffers(&self) -> Vec<(&'static str, &Tensor)> {
        vec![
            ("running_mean", &self.running_mean),
            ("running_var", &self.running_var),
        ]
    }

    pub fn state_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        vec![
            ("weight", &mut self.weight.value),
            ("bias", &mut self.bias.value),
            ("running_mean", &mut self.running_mean),
            ("running_var", &mut self.running_var),
        ]
    }

    pub fn describe(&self) -> String {
        format!(
            "BatchNorm({}, eps={}, momentum={})",
            self.features, self.eps, self.momentum
        )
    }
}
