use ndarray::Zip;

use super::{Optimizer, OptimizerState, ParamGroup};
use crate::{Param, Result, Tensor};

const KIND: &str = "adam";
const EXP_AVG: &str = "exp_avg";
const EXP_AVG_SQ: &str = "exp_avg_sq";

#[derive(Debug)]
pub struct Adam {
    group: ParamGroup,
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    step: u64,
    v: Vec<Tensor>,
    s: Vec<Tensor>,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `group` - The parameters this instance will update.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    /// * `weight_decay` - The L2 penalty added to every gradient.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(
        group: ParamGroup,
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        weight_decay: f32,
    ) -> Self {
        Self {
            v: group.zeros(),
            s: group.zeros(),
            group,
            learning_rate,
            beta1,
            beta2,
            epsilon,
            weight_decay,
            step: 0,
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, mut params: Vec<(String, &mut Param)>) -> Result<()> {
        self.group.check(&params)?;

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            weight_decay: wd,
            ..
        } = *self;

        self.step += 1;
        let t = self.step.min(i32::MAX as u64) as i32;
        let bc1 = 1. - b1.powi(t);
        let bc2 = 1. - b2.powi(t);
        let step_size = lr * (bc2.sqrt() / bc1);

        for (((_, param), v), s) in params
            .iter_mut()
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
        {
            let Param { value, grad } = &mut **param;
            Zip::from(value)
                .and(&*grad)
                .and(v)
                .and(s)
                .par_for_each(|p, &g, v, s| {
                    let g = g + wd * *p;
                    *v = b1 * *v + (1. - b1) * g;
                    *s = b2 * *s + (1. - b2) * g.powi(2);
                    *p -= step_size * *v / (s.sqrt() + eps);
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
        OptimizerState::new(KIND, self.learning_rate, self.step)
            .with_buffer(EXP_AVG, self.v.clone())
            .with_buffer(EXP_AVG_SQ, self.s.clone())
    }

    fn load_state_dict(&mut self, state: &OptimizerState) -> Result<()> {
        state.expect_kind(KIND)?;
        let v = state.buffer(EXP_AVG)?;
        let s = state.buffer(EXP_AVG_SQ)?;
        self.group.check_buffers(EXP_AVG, v)?;
        self.group.check_buffers(EXP_AVG_SQ, s)?;

        self.v = v.to_vec();
        self.s = s.to_vec();
        self.learning_rate = state.learning_rate;
        self.step = state.step;
        Ok(())
    }
}
