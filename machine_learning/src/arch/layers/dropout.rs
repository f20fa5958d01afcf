use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Zeroes each input with probability `p` while training, scaling the survivors by `1 / (1 - p)`.
/// Acts as the identity when evaluating.
#[derive(Clone, Debug)]
pub struct Dropout {
    p: f32,
    rng: StdRng,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` layer.
    ///
    /// # Arguments
    /// * `p` - The drop probability, clamped to `[0, 1)`.
    /// * `seed` - Seed for the mask sampler.
    pub fn new(p: f32, seed: u64) -> Self {
        Self {
            p: p.clamp(0., 0.999),
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        }
    }

    pub fn forward(&mut self, x: ArrayView2<f32>, training: bool) -> Array2<f32> {
        if !training || self.p == 0. {
            self.mask = None;
            return x.to_owned();
        }

        let keep = 1. - self.p;
        let rng = &mut self.rng;
        let mask = Array2::from_shape_fn(x.raw_dim(), |_| {
            if rng.random_bool(keep as f64) {
                1. / keep
            } else {
                0.
            }
        });

        let out = &x * &mask;
        self.mask = Some(mask);
        out
    }

    pub fn backward(&mut self, d: ArrayView2<f32>) -> Array2<f32> {
        match &self.mask {
            Some(mask) => &d * mask,
            None => d.to_owned(),
        }
    }

    pub fn describe(&self) -> String {
        format!("Dropout(p={})", self.p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_evaluating() {
        let mut dropout = Dropout::new(0.5, 42);
        let x = Array2::from_elem((4, 4), 3.);

        assert_eq!(dropout.forward(x.view(), false), x);
    }

    #[test]
    fn drops_when_training() {
        let mut dropout = Dropout::new(0.5, 42);
        let x = Array2::ones((16, 16));

        let y = dropout.forward(x.view(), true);
        assert!(y.iter().all(|&v| v == 0. || v == 2.));
        assert!(y.iter().any(|&v| v == 0.));

        let d = dropout.backward(x.view());
        assert_eq!(d, y);
    }
}
