//! Name to constructor tables for every buildable component.

use std::collections::BTreeMap;

use log::{debug, warn};
use machine_learning::{
    arch::loss::{BceWithLogits, Charbonnier, L1, LossFn, Mse},
    metrics::{
        Lpips, Metric, Pcc, Psnr,
        lpips::{AlexNet, PerceptualBackend},
    },
    optimization::{
        Adam, GradientDescent, GradientDescentWithMomentum, Optimizer, ParamGroup,
        scheduler::{
            CosineAnnealingLr, ExponentialLr, LrScheduler, MultiStepLr, Scheduler, StepLr,
        },
    },
};
use serde_json::Value;

use crate::{
    ComponentKind, OrchestratorError, Result,
    configs::{
        AdamOptions, CharbonnierOptions, CosineAnnealingLrOptions, ExponentialLrOptions,
        LpipsNet, LpipsOptions, MultiStepLrOptions, SgdOptions, StepLrOptions, parse,
    },
};

pub type LossCtor = fn(&str, Option<&Value>) -> Result<Box<dyn LossFn>>;
pub type OptimizerCtor = fn(&str, ParamGroup, Option<&Value>) -> Result<Box<dyn Optimizer>>;
pub type SchedulerCtor = fn(&str, &dyn Optimizer, Option<&Value>) -> Result<Box<dyn Scheduler>>;
pub type MetricCtor = fn(&str, Option<&Value>) -> Result<Box<dyn Metric>>;

/// Maps component names to their constructors.
///
/// Every constructor is handed the name it was registered under, its options (`None` meaning
/// defaults) and, for optimizers and schedulers, what they are bound to.
pub struct Registry {
    losses: BTreeMap<&'static str, LossCtor>,
    optimizers: BTreeMap<&'static str, OptimizerCtor>,
    schedulers: BTreeMap<&'static str, SchedulerCtor>,
    metrics: BTreeMap<&'static str, MetricCtor>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register_loss("MSELoss", |_, _| Ok(Box::new(Mse::new())));
        registry.register_loss("L1Loss", |_, _| Ok(Box::new(L1)));
        registry.register_loss("CharbonnierLoss", charbonnier);
        registry.register_loss("BCEWithLogitsLoss", |_, _| Ok(Box::new(BceWithLogits)));

        registry.register_optimizer("SGD", sgd);
        registry.register_optimizer("Adam", adam);

        registry.register_scheduler("StepLR", step_lr);
        registry.register_scheduler("MultiStepLR", multi_step_lr);
        registry.register_scheduler("CosineAnnealingLR", cosine_annealing_lr);
        registry.register_scheduler("ExponentialLR", exponential_lr);

        registry.register_metric("PSNR", |_, _| Ok(Box::new(Psnr)));
        registry.register_metric("LPIPS", lpips);
        registry.register_metric("PCC", |_, _| Ok(Box::new(Pcc)));

        registry
    }
}

impl Registry {
    /// A registry without a single component.
    pub fn empty() -> Self {
        Self {
            losses: BTreeMap::new(),
            optimizers: BTreeMap::new(),
            schedulers: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn register_loss(&mut self, name: &'static str, ctor: LossCtor) {
        self.losses.insert(name, ctor);
    }

    pub fn register_optimizer(&mut self, name: &'static str, ctor: OptimizerCtor) {
        self.optimizers.insert(name, ctor);
    }

    pub fn register_scheduler(&mut self, name: &'static str, ctor: SchedulerCtor) {
        self.schedulers.insert(name, ctor);
    }

    pub fn register_metric(&mut self, name: &'static str, ctor: MetricCtor) {
        self.metrics.insert(name, ctor);
    }

    /// The registered names of a component kind, sorted.
    pub fn names(&self, kind: ComponentKind) -> Vec<&'static str> {
        match kind {
            ComponentKind::Loss => self.losses.keys().copied().collect(),
            ComponentKind::Optimizer => self.optimizers.keys().copied().collect(),
            ComponentKind::Scheduler => self.schedulers.keys().copied().collect(),
            ComponentKind::Metric => self.metrics.keys().copied().collect(),
        }
    }

    /// Builds the loss function registered as `name`.
    ///
    /// # Errors
    /// `OrchestratorError::UnsupportedComponent` for an unknown name and
    /// `OrchestratorError::InvalidOptions` if `opts` don't fit the component.
    pub fn build_loss(&self, name: &str, opts: Option<&Value>) -> Result<Box<dyn LossFn>> {
        let ctor = lookup(&self.losses, ComponentKind::Loss, name)?;
        ctor(name, opts)
    }

    /// Builds the optimizer registered as `name` over `group`.
    ///
    /// # Errors
    /// Same as [`Registry::build_loss`].
    pub fn build_optimizer(
        &self,
        name: &str,
        group: ParamGroup,
        opts: Option<&Value>,
    ) -> Result<Box<dyn Optimizer>> {
        let ctor = lookup(&self.optimizers, ComponentKind::Optimizer, name)?;
        ctor(name, group, opts)
    }

    /// Builds the scheduler registered as `name`, taking `optimizer`'s rate as its base.
    ///
    /// # Errors
    /// Same as [`Registry::build_loss`].
    pub fn build_scheduler(
        &self,
        name: &str,
        optimizer: &dyn Optimizer,
        opts: Option<&Value>,
    ) -> Result<Box<dyn Scheduler>> {
        let ctor = lookup(&self.schedulers, ComponentKind::Scheduler, name)?;
        ctor(name, optimizer, opts)
    }

    /// Builds the metric registered as `name`.
    ///
    /// # Errors
    /// Same as [`Registry::build_loss`].
    pub fn build_metric(&self, name: &str, opts: Option<&Value>) -> Result<Box<dyn Metric>> {
        let ctor = lookup(&self.metrics, ComponentKind::Metric, name)?;
        ctor(name, opts)
    }
}

fn lookup<'a, C>(
    table: &'a BTreeMap<&'static str, C>,
    kind: ComponentKind,
    name: &str,
) -> Result<&'a C> {
    debug!(name = name; "building {kind}");

    table
        .get(name)
        .ok_or_else(|| OrchestratorError::UnsupportedComponent {
            kind,
            name: name.to_string(),
        })
}

fn charbonnier(name: &str, opts: Option<&Value>) -> Result<Box<dyn LossFn>> {
    let opts: CharbonnierOptions = parse(ComponentKind::Loss, name, opts)?;
    Ok(Box::new(Charbonnier::new(opts.eps)))
}

fn sgd(name: &str, group: ParamGroup, opts: Option<&Value>) -> Result<Box<dyn Optimizer>> {
    let opts: SgdOptions = parse(ComponentKind::Optimizer, name, opts)?;

    if opts.momentum == 0. {
        return Ok(Box::new(GradientDescent::new(
            group,
            opts.lr,
            opts.weight_decay,
        )));
    }

    Ok(Box::new(GradientDescentWithMomentum::new(
        group,
        opts.lr,
        opts.momentum,
        opts.weight_decay,
    )))
}

fn adam(name: &str, group: ParamGroup, opts: Option<&Value>) -> Result<Box<dyn Optimizer>> {
    let opts: AdamOptions = parse(ComponentKind::Optimizer, name, opts)?;
    let (beta1, beta2) = opts.betas;

    Ok(Box::new(Adam::new(
        group,
        opts.lr,
        beta1,
        beta2,
        opts.eps,
        opts.weight_decay,
    )))
}

fn step_lr(
    name: &str,
    optimizer: &dyn Optimizer,
    opts: Option<&Value>,
) -> Result<Box<dyn Scheduler>> {
    let opts: StepLrOptions = parse(ComponentKind::Scheduler, name, opts)?;
    let policy = StepLr {
        step_size: opts.step_size,
        gamma: opts.gamma,
    };

    Ok(Box::new(LrScheduler::new(policy, optimizer)))
}

fn multi_step_lr(
    name: &str,
    optimizer: &dyn Optimizer,
    opts: Option<&Value>,
) -> Result<Box<dyn Scheduler>> {
    let opts: MultiStepLrOptions = parse(ComponentKind::Scheduler, name, opts)?;
    let policy = MultiStepLr {
        milestones: opts.milestones,
        gamma: opts.gamma,
    };

    Ok(Box::new(LrScheduler::new(policy, optimizer)))
}

fn cosine_annealing_lr(
    name: &str,
    optimizer: &dyn Optimizer,
    opts: Option<&Value>,
) -> Result<Box<dyn Scheduler>> {
    let opts: CosineAnnealingLrOptions = parse(ComponentKind::Scheduler, name, opts)?;
    let policy = CosineAnnealingLr {
        t_max: opts.t_max,
        eta_min: opts.eta_min,
    };

    Ok(Box::new(LrScheduler::new(policy, optimizer)))
}

fn exponential_lr(
    name: &str,
    optimizer: &dyn Optimizer,
    opts: Option<&Value>,
) -> Result<Box<dyn Scheduler>> {
    let opts: ExponentialLrOptions = parse(ComponentKind::Scheduler, name, opts)?;
    let policy = ExponentialLr { gamma: opts.gamma };

    Ok(Box::new(LrScheduler::new(policy, optimizer)))
}

fn lpips(name: &str, opts: Option<&Value>) -> Result<Box<dyn Metric>> {
    let opts: LpipsOptions = parse(ComponentKind::Metric, name, opts)?;

    let backend: Box<dyn PerceptualBackend> = match (opts.net, &opts.weights) {
        (LpipsNet::Alex, Some(path)) => Box::new(AlexNet::from_safetensors(path)?),
        (LpipsNet::Alex, None) => {
            warn!(seed = opts.seed; "LPIPS has no pretrained weights, its scores are uncalibrated");
            Box::new(AlexNet::seeded(opts.seed)?)
        }
    };

    Ok(Box::new(Lpips::new(backend)))
}
