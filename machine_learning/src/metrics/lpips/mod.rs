//! Learned perceptual image patch similarity.
//!
//! Both images are normalized to `[-1, 1]`, pushed through a feature backbone and compared tap
//! by tap: features are unit normalized along channels, their squared difference is weighted
//! per channel by a non-negative head and averaged over space.

mod alexnet;
mod backend;

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;

pub use alexnet::AlexNet;
pub use backend::PerceptualBackend;

use super::{Image, Metric, image::pair};
use crate::{MlErr, Result};

const NORM_EPS: f32 = 1e-10;

pub struct Lpips {
    backend: Box<dyn PerceptualBackend>,
}

impl Lpips {
    pub fn new(backend: Box<dyn PerceptualBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn PerceptualBackend {
        self.backend.as_ref()
    }

    /// The per pixel distance, every tap upsampled (nearest) to the input size and summed.
    ///
    /// # Arguments
    /// * `reference` - The reference image.
    /// * `candidate` - The image to compare against the reference.
    ///
    /// # Returns
    /// A `(height, width)` map of distances.
    pub fn distance_map(&self, reference: Image<'_>, candidate: Image<'_>) -> Result<Array2<f32>> {
        let (a, b) = pair(&reference, &candidate, |img| img.to_signed())?;
        let (_, h, w) = a.dim();

        let mut out = Array2::zeros((h, w));
        for map in self.tap_maps(&a, &b)? {
            let (mh, mw) = map.dim();
            out.indexed_iter_mut().for_each(|((y, x), v)| {
                *v += map[[y * mh / h, x * mw / w]];
            });
        }

        Ok(out)
    }

    fn tap_maps(&self, a: &Array3<f32>, b: &Array3<f32>) -> Result<Vec<Array2<f32>>> {
        let (fa, fb) = rayon::join(
            || self.backend.features(a.view()),
            || self.backend.features(b.view()),
        );
        let (fa, fb) = (fa?, fb?);
        let heads = self.backend.heads();

        if fa.len() != heads.len() || fb.len() != heads.len() {
            return Err(MlErr::SizeMismatch {
                what: "perceptual taps",
                got: fa.len(),
                expected: heads.len(),
            });
        }

        fa.par_iter()
            .zip(fb.par_iter())
            .zip(heads.par_iter())
            .map(|((x, y), head)| {
                if head.len() != x.len_of(Axis(0)) {
                    return Err(MlErr::SizeMismatch {
                        what: "perceptual head channels",
                        got: head.len(),
                        expected: x.len_of(Axis(0)),
                    });
                }

                let diff = (unit_normalize(x) - unit_normalize(y)).mapv(|d| d * d);
                let weighted = diff
                    .axis_iter(Axis(0))
                    .zip(head)
                    .fold(Array2::zeros((x.dim().1, x.dim().2)), |acc, (c, &w)| {
                        acc + &c * w
                    });

                Ok(weighted)
            })
            .collect()
    }
}

fn unit_normalize(features: &Array3<f32>) -> Array3<f32> {
    let norm = features
        .mapv(|v| v * v)
        .sum_axis(Axis(0))
        .mapv(|s| s.sqrt() + NORM_EPS);

    features / &norm.insert_axis(Axis(0))
}

impl Metric for Lpips {
    fn name(&self) -> &str {
        "LPIPS"
    }

    fn lower_is_better(&self) -> bool {
        true
    }

    fn compute(&self, reference: Image<'_>, candidate: Image<'_>) -> Result<f64> {
        let (a, b) = pair(&reference, &candidate, |img| img.to_signed())?;

        let total = self
            .tap_maps(&a, &b)?
            .iter()
            .map(|map| map.mean().unwrap_or_default() as f64)
            .sum();

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array3, ArrayView3};

    use super::*;

    /// Two taps: the raw image and its channel mean.
    struct Identity {
        heads: Vec<Array1<f32>>,
    }

    impl PerceptualBackend for Identity {
        fn name(&self) -> &str {
            "identity"
        }

        fn features(&self, image: ArrayView3<f32>) -> Result<Vec<Array3<f32>>> {
            let mean = image.mean_axis(Axis(0)).unwrap().insert_axis(Axis(0));
            Ok(vec![image.to_owned(), mean])
        }

        fn heads(&self) -> &[Array1<f32>] {
            &self.heads
        }
    }

    fn lpips() -> Lpips {
        Lpips::new(Box::new(Identity {
            heads: vec![Array1::ones(3), Array1::ones(1)],
        }))
    }

    #[test]
    fn identical_images_are_at_zero() {
        let t = Array3::from_shape_fn((3, 4, 4), |(c, y, x)| (c + y + x) as f32 / 10.);
        let lpips = lpips();

        assert_eq!(lpips.compute((&t).into(), (&t).into()).unwrap(), 0.);
        assert!(lpips.lower_is_better());
    }

    #[test]
    fn pixels_and_tensors_agree() {
        let px = Array3::from_shape_fn((4, 4, 3), |(y, x, c)| (y * 40 + x * 10 + c * 5) as u8);
        let other = px.mapv(|v| v / 2);
        let as_tensor = |p: &Array3<u8>| {
            let mut t = Array3::zeros((3, 4, 4));
            for ((y, x, c), &v) in p.indexed_iter() {
                t[[2 - c, y, x]] = v as f32 / 255.;
            }
            t
        };

        let lpips = lpips();
        let from_px = lpips.compute((&px).into(), (&other).into()).unwrap();
        let from_t = lpips
            .compute((&as_tensor(&px)).into(), (&as_tensor(&other)).into())
            .unwrap();

        assert!(from_px > 0.);
        assert!((from_px - from_t).abs() < 1e-4);
    }

    #[test]
    fn map_covers_input() {
        let a = Array3::from_elem((3, 4, 6), 0.2f32);
        let b = Array3::from_shape_fn((3, 4, 6), |(c, _, x)| (c * x) as f32 / 20.);

        let map = lpips().distance_map((&a).into(), (&b).into()).unwrap();
        assert_eq!(map.dim(), (4, 6));
    }
}
