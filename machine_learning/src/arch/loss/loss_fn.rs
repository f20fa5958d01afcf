use ndarray::{Array2, ArrayView2};

use crate::device::Device;

/// A differentiable objective between a prediction and its target.
///
/// Both arguments must share a shape.
pub trait LossFn: Send {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;

    fn lower_is_better(&self) -> bool {
        true
    }

    /// Moves any buffer the loss owns. Stateless losses have nothing to move.
    fn to_device(&mut self, _device: Device) {}
}
