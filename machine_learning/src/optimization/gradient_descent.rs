use ndarray::Zip;

use super::{Optimizer, OptimizerState, ParamGroup};
use crate::{Param, Result};

const KIND: &str = "gradient_descent";

/// Gradient descent optimization algorithm.
#[derive(Debug)]
pub struct GradientDescent {
    group: ParamGroup,
    learning_rate: f32,
    weight_decay: f32,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `group` - The parameters this instance will update.
    /// * `learning_rate` - The *length* of the steps taken on `step`.
    /// * `weight_decay` - The L2 penalty added to every gradient.
    pub fn new(group: ParamGroup, learning_rate: f32, weight_decay: f32) -> Self {
        Self {
            group,
            learning_rate,
            weight_decay,
        }
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of the gradient, with a length of `learning_rate`.
    fn step(&mut self, mut params: Vec<(String, &mut Param)>) -> Result<()> {
        self.group.check(&params)?;
        let lr = self.learning_rate;
        let wd = self.weight_decay;

        for (_, param) in params.iter_mut() {
            let Param { value, grad } = &mut **param;
            Zip::from(value).and(&*grad).par_for_each(|w, &g| {
                *w -= lr * (g + wd * *w);
            });
        }

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn state_dict(&self) -> OptimizerState {
        OptimizerState::new(KIND, self.learning_rate, 0)
    }

    fn load_state_dict(&mut self, state: &OptimizerState) -> Result<()> {
        state.expect_kind(KIND)?;
        self.learning_rate = state.learning_rate;
        Ok(())
    }
}
