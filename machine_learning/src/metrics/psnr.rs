use super::{Image, Metric, image::pair};
use crate::Result;

/// Peak signal to noise ratio, `10 * log10(1 / mse)` over images valued in `[0, 1]`.
///
/// Identical images score `+inf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Psnr;

impl Metric for Psnr {
    fn name(&self) -> &str {
        "PSNR"
    }

    fn lower_is_better(&self) -> bool {
        false
    }

    fn compute(&self, reference: Image<'_>, candidate: Image<'_>) -> Result<f64> {
        let (a, b) = pair(&reference, &candidate, |img| img.to_unit())?;

        let se: f64 = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x as f64 - y as f64).powi(2))
            .sum();
        let mse = se / a.len() as f64;

        if mse == 0. {
            return Ok(f64::INFINITY);
        }

        Ok(10. * (1. / mse).log10())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;

    #[test]
    fn identical_is_infinite() {
        let t = Array3::from_elem((3, 4, 4), 0.5f32);
        assert_eq!(Psnr.compute((&t).into(), (&t).into()).unwrap(), f64::INFINITY);
    }

    #[test]
    fn known_value() {
        let a = Array3::from_elem((1, 2, 2), 0.5f32);
        let b = Array3::from_elem((1, 2, 2), 0.6f32);

        // mse = 0.01
        let psnr = Psnr.compute((&a).into(), (&b).into()).unwrap();
        assert!((psnr - 20.).abs() < 1e-4, "{psnr}");
        assert!(!Psnr.lower_is_better());
    }

    #[test]
    fn pixels_match_tensors() {
        let px_a = Array3::from_elem((2, 2, 3), 100u8);
        let px_b = Array3::from_elem((2, 2, 3), 110u8);
        let t_a = Array3::from_elem((3, 2, 2), 100f32 / 255.);
        let t_b = Array3::from_elem((3, 2, 2), 110f32 / 255.);

        let from_px = Psnr.compute((&px_a).into(), (&px_b).into()).unwrap();
        let from_t = Psnr.compute((&t_a).into(), (&t_b).into()).unwrap();
        assert!((from_px - from_t).abs() < 1e-3);
    }
}
