use ndarray::Zip;

use super::{Optimizer, OptimizerState, ParamGroup};
use crate::{Param, Result, Tensor};

const KIND: &str = "gradient_descent_with_momentum";
const VELOCITY: &str = "velocity";

#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    group: ParamGroup,
    learning_rate: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: Vec<Tensor>,
    step: u64,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `group` - The parameters this instance will update.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    /// * `weight_decay` - The L2 penalty added to every gradient.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(group: ParamGroup, learning_rate: f32, momentum: f32, weight_decay: f32) -> Self {
        Self {
            velocity: group.zeros(),
            group,
            learning_rate,
            momentum,
            weight_decay,
            step: 0,
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn step(&mut self, mut params: Vec<(String, &mut Param)>) -> Result<()> {
        self.group.check(&params)?;

        let lr = self.learning_rate;
        let mu = self.momentum;
        let wd = self.weight_decay;

        for ((_, param), velocity) in params.iter_mut().zip(self.velocity.iter_mut()) {
            let Param { value, grad } = &mut **param;
            Zip::from(value)
                .and(&*grad)
                .and(velocity)
                .par_for_each(|p, &g, v| {
                    *v = (mu * *v) + g + wd * *p;
                    *p -= lr * *v;
                });
        }

        self.step += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn state_dict(&self) -> OptimizerState {
        OptimizerState::new(KIND, self.learning_rate, self.step)
            .with_buffer(VELOCITY, self.velocity.clone())
    }

    fn load_state_dict(&mut self, state: &OptimizerState) -> Result<()> {
        state.expect_kind(KIND)?;
        let velocity = state.buffer(VELOCITY)?;
        self.group.check_buffers(VELOCITY, velocity)?;

        self.velocity = velocity.to_vec();
        self.learning_rate = state.learning_rate;
        self.step = state.step;
        Ok(())
    }
}
