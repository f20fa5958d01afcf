use super::Sigmoid;

#[derive(Clone, Copy, Debug)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Relu,
    LeakyRelu { slope: f32 },
    Tanh,
}
use ActFn::*;

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Sigmoid(Sigmoid::new(amp))
    }

    pub fn leaky_relu(slope: f32) -> Self {
        LeakyRelu { slope }
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Sigmoid(a) => a.f(x),
            Relu => x.max(0.),
            LeakyRelu { slope } => {
                if x >= 0. {
                    x
                } else {
                    slope * x
                }
            }
            Tanh => x.tanh(),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Sigmoid(a) => a.df(x),
            Relu => {
                if x > 0. {
                    1.
                } else {
                    0.
                }
            }
            LeakyRelu { slope } => {
                if x >= 0. {
                    1.
                } else {
                    *slope
                }
            }
            Tanh => 1. - x.tanh().powi(2),
        }
    }

    /// A short human readable name, used in network summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Sigmoid(_) => "sigmoid",
            Relu => "relu",
            LeakyRelu { .. } => "leaky_relu",
            Tanh => "tanh",
        }
    }
}
