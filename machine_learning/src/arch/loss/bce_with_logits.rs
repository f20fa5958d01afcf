use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;

/// Binary cross entropy over raw logits, the usual adversarial objective.
///
/// Computed as `max(x, 0) - x * y + ln(1 + e^-|x|)` to stay stable for large logits.
#[derive(Default, Clone, Copy, Debug)]
pub struct BceWithLogits;

impl LossFn for BceWithLogits {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = y_pred.len();
        if n == 0 {
            return 0.;
        }

        let total = Zip::from(&y_pred)
            .and(&y)
            .fold(0., |acc, &x, &t| {
                acc + x.max(0.) - x * t + (-x.abs()).exp().ln_1p()
            });

        total / n as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len() as f32;
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&x, &t| (1. / (1. + (-x).exp()) - t) / n)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn zero_logit_is_ln2() {
        let x = array![[0.]];
        let t = array![[1.]];

        assert!((BceWithLogits.loss(x.view(), t.view()) - 2f32.ln()).abs() < 1e-6);
        assert!((BceWithLogits.loss_prime(x.view(), t.view())[[0, 0]] + 0.5).abs() < 1e-6);
    }
}
