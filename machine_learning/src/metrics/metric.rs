use super::Image;
use crate::{Result, device::Device};

/// A scalar score between a reference image and a candidate, used for reporting only.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    /// Whether smaller scores mean a closer match.
    fn lower_is_better(&self) -> bool;

    /// Scores `candidate` against `reference`. Both must share representation and shape.
    fn compute(&self, reference: Image<'_>, candidate: Image<'_>) -> Result<f64>;

    /// Moves any weights the metric owns.
    fn to_device(&mut self, _device: Device) {}
}
