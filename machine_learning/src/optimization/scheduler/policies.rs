use std::f32::consts::PI;

use super::LrPolicy;

/// Decays the learning rate by `gamma` every `step_size` steps.
#[derive(Debug, Clone, Copy)]
pub struct StepLr {
    pub step_size: u64,
    pub gamma: f32,
}

impl LrPolicy for StepLr {
    const KIND: &'static str = "step_lr";

    fn lr_at(&self, base_lr: f32, epoch: u64) -> f32 {
        let decays = epoch / self.step_size.max(1);
        base_lr * self.gamma.powi(decays.min(i32::MAX as u64) as i32)
    }
}

/// Decays the learning rate by `gamma` once each milestone is reached.
#[derive(Debug, Clone)]
pub struct MultiStepLr {
    pub milestones: Vec<u64>,
    pub gamma: f32,
}

impl LrPolicy for MultiStepLr {
    const KIND: &'static str = "multi_step_lr";

    fn lr_at(&self, base_lr: f32, epoch: u64) -> f32 {
        let decays = self.milestones.iter().filter(|&&m| m <= epoch).count();
        base_lr * self.gamma.powi(decays as i32)
    }
}

/// Anneals the learning rate from its base to `eta_min` along half a cosine period of `t_max`
/// steps.
#[derive(Debug, Clone, Copy)]
pub struct CosineAnnealingLr {
    pub t_max: u64,
    pub eta_min: f32,
}

impl LrPolicy for CosineAnnealingLr {
    const KIND: &'static str = "cosine_annealing_lr";

    fn lr_at(&self, base_lr: f32, epoch: u64) -> f32 {
        let progress = epoch as f32 / self.t_max.max(1) as f32;
        self.eta_min + (base_lr - self.eta_min) * (1. + (PI * progress).cos()) / 2.
    }
}

/// Decays the learning rate by `gamma` every step.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialLr {
    pub gamma: f32,
}

impl LrPolicy for ExponentialLr {
    const KIND: &'static str = "exponential_lr";

    fn lr_at(&self, base_lr: f32, epoch: u64) -> f32 {
        base_lr * self.gamma.powi(epoch.min(i32::MAX as u64) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        GradientDescent, Optimizer, ParamGroup,
        scheduler::{LrScheduler, Scheduler},
    };

    fn optimizer(lr: f32) -> GradientDescent {
        GradientDescent::new(ParamGroup::default(), lr, 0.)
    }

    #[test]
    fn step_lr_decays_on_boundaries() {
        let mut opt = optimizer(1.);
        let mut sched = LrScheduler::new(
            StepLr {
                step_size: 2,
                gamma: 0.5,
            },
            &opt,
        );

        let lrs: Vec<f32> = (0..4)
            .map(|_| {
                sched.step(&mut opt);
                opt.learning_rate()
            })
            .collect();

        assert_eq!(lrs, [1., 0.5, 0.5, 0.25]);
        assert_eq!(sched.last_epoch(), 4);
    }

    #[test]
    fn multi_step_counts_milestones() {
        let policy = MultiStepLr {
            milestones: vec![2, 5],
            gamma: 0.1,
        };

        assert_eq!(policy.lr_at(1., 1), 1.);
        assert!((policy.lr_at(1., 3) - 0.1).abs() < 1e-7);
        assert!((policy.lr_at(1., 5) - 0.01).abs() < 1e-7);
    }

    #[test]
    fn cosine_reaches_eta_min() {
        let policy = CosineAnnealingLr {
            t_max: 10,
            eta_min: 0.1,
        };

        assert!((policy.lr_at(1., 0) - 1.).abs() < 1e-6);
        assert!((policy.lr_at(1., 5) - 0.55).abs() < 1e-6);
        assert!((policy.lr_at(1., 10) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn state_round_trips_counter() {
        let mut opt = optimizer(0.3);
        let mut a = LrScheduler::new(ExponentialLr { gamma: 0.9 }, &opt);
        (0..3).for_each(|_| a.step(&mut opt));

        let mut b = LrScheduler::new(ExponentialLr { gamma: 0.9 }, &optimizer(1.));
        b.load_state_dict(&a.state_dict()).unwrap();

        assert_eq!(b.last_epoch(), 3);
        assert_eq!(b.learning_rate(), a.learning_rate());
    }

    #[test]
    fn rejects_other_kind() {
        let opt = optimizer(0.3);
        let mut sched = LrScheduler::new(ExponentialLr { gamma: 0.9 }, &opt);
        let state = LrScheduler::new(
            StepLr {
                step_size: 1,
                gamma: 0.5,
            },
            &opt,
        )
        .state_dict();

        assert!(sched.load_state_dict(&state).is_err());
    }
}
