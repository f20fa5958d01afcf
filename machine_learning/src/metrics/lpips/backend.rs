use ndarray::{Array1, Array3, ArrayView3};

use crate::Result;

/// A feature extractor LPIPS compares images through.
pub trait PerceptualBackend: Send + Sync {
    fn name(&self) -> &str;

    /// The feature taps of an RGB `(channel, height, width)` image valued in `[-1, 1]`.
    fn features(&self, image: ArrayView3<f32>) -> Result<Vec<Array3<f32>>>;

    /// A non-negative weight per channel of every tap.
    fn heads(&self) -> &[Array1<f32>];
}
