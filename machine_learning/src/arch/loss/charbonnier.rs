use ndarray::{Array2, ArrayView2};

use super::LossFn;

/// A differentiable L1, `sqrt((y_pred - y)^2 + eps^2)` averaged.
#[derive(Clone, Copy, Debug)]
pub struct Charbonnier {
    eps: f32,
}

impl Charbonnier {
    pub fn new(eps: f32) -> Self {
        Self { eps }
    }
}

impl Default for Charbonnier {
    fn default() -> Self {
        Self::new(1e-6)
    }
}

impl LossFn for Charbonnier {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let eps2 = self.eps * self.eps;
        (&y_pred - &y)
            .mapv(|d| (d * d + eps2).sqrt())
            .mean()
            .unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let eps2 = self.eps * self.eps;
        let n = y_pred.len() as f32;
        (&y_pred - &y).mapv(|d| d / (d * d + eps2).sqrt() / n)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn close_to_l1() {
        let loss = Charbonnier::default();
        let y_pred = array![[3., -1.]];
        let y = array![[0., 0.]];

        assert!((loss.loss(y_pred.view(), y.view()) - 2.).abs() < 1e-5);
    }
}
