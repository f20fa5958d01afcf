use ndarray::IxDyn;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::{Result, Tensor};

/// The strategy used to fill a freshly created parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    XavierUniform,
    Xavier,
    Kaiming,
    LecunUniform,
    Lecun,
}

impl Init {
    /// Samples a tensor of the given shape.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `shape` - The shape of the tensor.
    /// * `fan_in` - The number of input units of the parameter.
    /// * `fan_out` - The number of output units of the parameter.
    ///
    /// # Returns
    /// The sampled tensor or an error if the distribution parameters are invalid.
    pub fn sample<R: Rng>(
        &self,
        rng: &mut R,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
    ) -> Result<Tensor> {
        let len = shape.iter().product();

        let data = match *self {
            Init::Const { value } => vec![value; len],
            Init::Uniform { low, high } => draw(rng, Uniform::new(low, high)?, len),
            Init::Normal { mean, std_dev } => draw(rng, Normal::new(mean, std_dev)?, len),
            Init::XavierUniform => {
                let range = (6. / (fan_in + fan_out) as f32).sqrt();
                draw(rng, Uniform::new(-range, range)?, len)
            }
            Init::Xavier => {
                let std_dev = (2. / (fan_in + fan_out) as f32).sqrt();
                draw(rng, Normal::new(0., std_dev)?, len)
            }
            Init::Kaiming => {
                let std_dev = (2. / fan_in as f32).sqrt();
                draw(rng, Normal::new(0., std_dev)?, len)
            }
            Init::LecunUniform => {
                let range = (3. / fan_in as f32).sqrt();
                draw(rng, Uniform::new(-range, range)?, len)
            }
            Init::Lecun => {
                let std_dev = (1. / fan_in as f32).sqrt();
                draw(rng, Normal::new(0., std_dev)?, len)
            }
        };

        Ok(Tensor::from_shape_vec(IxDyn(shape), data)?)
    }
}

fn draw<R: Rng, D: Distribution<f32>>(rng: &mut R, dist: D, len: usize) -> Vec<f32> {
    (0..len).map(|_| dist.sample(rng)).collect()
}
