use super::{Image, Metric, image::pair};
use crate::{MlErr, Result};

/// Pearson correlation coefficient between the flattened images.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pcc;

impl Pcc {
    /// The correlation along with its two-sided p-value, the probability of an uncorrelated pair
    /// of images correlating at least this strongly.
    ///
    /// # Errors
    /// Same as [`Metric::compute`].
    pub fn with_p_value(&self, reference: Image<'_>, candidate: Image<'_>) -> Result<(f64, f64)> {
        let (r, n) = coefficient(reference, candidate)?;
        Ok((r, p_value(r, n)))
    }
}

impl Metric for Pcc {
    fn name(&self) -> &str {
        "PCC"
    }

    fn lower_is_better(&self) -> bool {
        false
    }

    /// # Errors
    /// `MlErr::ConstantInput` if either image is constant, the coefficient is undefined there.
    fn compute(&self, reference: Image<'_>, candidate: Image<'_>) -> Result<f64> {
        coefficient(reference, candidate).map(|(r, _)| r)
    }
}

/// The coefficient and the number of samples it was computed over.
fn coefficient(reference: Image<'_>, candidate: Image<'_>) -> Result<(f64, usize)> {
    let (a, b) = pair(&reference, &candidate, |img| img.to_unit())?;
    let n = a.len() as f64;

    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0., 0., 0.);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0. || var_b == 0. {
        return Err(MlErr::ConstantInput);
    }

    let r = (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1., 1.);
    Ok((r, a.len()))
}

/// Under no correlation `r` follows a Student's t with `n - 2` degrees of freedom, whose two-sided
/// tail is `I_{1 - r^2}(df / 2, 1 / 2)`.
fn p_value(r: f64, n: usize) -> f64 {
    if n <= 2 {
        return 1.;
    }

    let df = (n - 2) as f64;
    inc_beta(df / 2., 0.5, 1. - r * r)
}

/// Regularized incomplete beta function `I_x(a, b)`.
fn inc_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0. {
        return 0.;
    }
    if x >= 1. {
        return 1.;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1. - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fast on this side of the mean only.
    if x < (a + 1.) / (a + b + 2.) {
        front * beta_fraction(a, b, x) / a
    } else {
        1. - front * beta_fraction(b, a, 1. - x) / b
    }
}

/// Continued fraction of the incomplete beta function, evaluated with Lentz's method.
fn beta_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-14;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let mut c = 1.;
    let mut d = 1. / guard(1. - (a + b) * x / (a + 1.));
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2. * m;

        let even = m * (b - m) * x / ((a + m2 - 1.) * (a + m2));
        d = 1. / guard(1. + even * d);
        c = guard(1. + even / c);
        h *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + m2) * (a + m2 + 1.));
        d = 1. / guard(1. + odd * d);
        c = guard(1. + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.).abs() < EPS {
            break;
        }
    }

    h
}

/// Lanczos approximation of `ln(Γ(x))` for `x > 0`.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.;
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1. - x);
    }

    let x = x - 1.;
    let t = x + G + 0.5;
    let series = COEFFS[1..]
        .iter()
        .enumerate()
        .fold(COEFFS[0], |acc, (i, &c)| acc + c / (x + i as f64 + 1.));

    0.5 * (2. * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, Array3};

    use super::*;

    #[test]
    fn affine_images_correlate() {
        let a = Array::linspace(0f32, 1., 12)
            .into_shape_with_order((3, 2, 2))
            .unwrap();
        let b = a.mapv(|v| 0.5 * v + 0.1);
        let c = a.mapv(|v| 1. - v);

        let pos = Pcc.compute((&a).into(), (&b).into()).unwrap();
        let neg = Pcc.compute((&a).into(), (&c).into()).unwrap();

        assert!((pos - 1.).abs() < 1e-6);
        assert!((neg + 1.).abs() < 1e-6);
    }

    #[test]
    fn p_value_matches_closed_forms() {
        // Two degrees of freedom: p = 1 - |r|.
        let a = Array::from_vec(vec![0f32, 1., 2., 3.]).mapv(|v| v / 3.);
        let b = Array::from_vec(vec![0f32, 2., 1., 3.]).mapv(|v| v / 3.);
        let (a, b) = (
            a.into_shape_with_order((1, 2, 2)).unwrap(),
            b.into_shape_with_order((1, 2, 2)).unwrap(),
        );

        let (r, p) = Pcc.with_p_value((&a).into(), (&b).into()).unwrap();
        assert!((r - 0.8).abs() < 1e-6);
        assert!((p - 0.2).abs() < 1e-6);

        // One degree of freedom: p = 2/pi * asin(sqrt(1 - r^2)).
        let a = Array3::from_shape_vec((3, 1, 1), vec![0f32, 0.5, 1.]).unwrap();
        let b = Array3::from_shape_vec((3, 1, 1), vec![0f32, 1., 0.5]).unwrap();

        let (r, p) = Pcc.with_p_value((&a).into(), (&b).into()).unwrap();
        assert!((r - 0.5).abs() < 1e-6);
        assert!((p - 2. / 3.).abs() < 1e-6);
    }

    #[test]
    fn perfect_correlation_is_certain() {
        let a = Array::linspace(0f32, 1., 12)
            .into_shape_with_order((3, 2, 2))
            .unwrap();
        let b = a.mapv(|v| 0.5 * v + 0.1);

        let (r, p) = Pcc.with_p_value((&a).into(), (&b).into()).unwrap();
        assert!((r - 1.).abs() < 1e-6);
        assert!(p < 1e-6);
        assert_eq!(r, Pcc.compute((&a).into(), (&b).into()).unwrap());
    }

    #[test]
    fn constant_fails() {
        let a = Array3::from_elem((3, 2, 2), 0.5f32);
        let b = Array3::from_elem((3, 2, 2), 0.2f32);

        assert!(matches!(
            Pcc.compute((&a).into(), (&b).into()),
            Err(MlErr::ConstantInput)
        ));
    }
}
