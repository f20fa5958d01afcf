use std::{collections::BTreeMap, io::Write, path::Path, sync::Arc};

use distributed::DistributedWrapper;
use log::{debug, error, info, warn};
use machine_learning::{
    MlErr, StateDict,
    arch::Module,
    collective::ProcessGroup,
    device::{Device, DeviceContext},
    metrics::Image,
    optimization::{OptimizerState, ParamGroup, scheduler::SchedulerState},
};
use ndarray::{Array2, ArrayView2};
use serde_json::Value;

use crate::{
    ItemLocation, OrchestratorError, Result,
    bundle::{
        Criterion, CriterionBundle, LossBundle, ModuleBundle, OptimizerBundle, SchedulerBundle,
        WeightedLoss,
    },
    checkpoint::{self, CheckpointRecord, ItemName, ItemState, PrefixDetection, reconcile},
    configs::{CriterionConfig, LossConfig, OptimizersConfig, SchedulerConfig, ttur::apply_ttur},
    model::ModelConstructor,
    registry::Registry,
};

enum Placement {
    /// Every module is wrapped for data parallel training.
    Distributed(DistributedWrapper),
    /// Modules are only moved to the device.
    SingleDevice,
}

/// A checkpoint item read and validated, waiting to be applied.
enum Staged {
    Module(String, StateDict),
    Optimizer(String, OptimizerState),
    Scheduler(String, SchedulerState),
}

impl Staged {
    fn item(&self) -> String {
        match self {
            Staged::Module(name, _) => ItemName::Module(name).to_string(),
            Staged::Optimizer(name, _) => ItemName::Optimizer(name).to_string(),
            Staged::Scheduler(name, _) => ItemName::Scheduler(name).to_string(),
        }
    }
}

/// Owns every component of a training algorithm: the model's modules, their losses,
/// optimizers, schedulers and reporting criteria.
///
/// Components are created in order (model, then optimizers, then schedulers) and are saved to
/// and restored from checkpoints together.
pub struct Algorithm {
    registry: Registry,
    device: Device,
    placement: Placement,
    prefix_detection: PrefixDetection,
    modules: ModuleBundle,
    notes: Vec<String>,
    losses: LossBundle,
    optimizers: OptimizerBundle,
    schedulers: SchedulerBundle,
    criteria: CriterionBundle,
    last_iteration: Option<u64>,
}

impl Algorithm {
    /// Creates a new `Algorithm` whose modules will be wrapped for data parallel training.
    ///
    /// # Arguments
    /// * `context` - Reports the device this process works on.
    /// * `group` - The already initialized process group, `None` makes `create_model` fail.
    pub fn distributed(context: &dyn DeviceContext, group: Option<Arc<dyn ProcessGroup>>) -> Self {
        let device = context.current_device();
        Self::new(
            device,
            Placement::Distributed(DistributedWrapper::new(device, group)),
        )
    }

    /// Creates a new `Algorithm` whose modules live on a single device.
    pub fn single_device(context: &dyn DeviceContext) -> Self {
        Self::new(context.current_device(), Placement::SingleDevice)
    }

    fn new(device: Device, placement: Placement) -> Self {
        Self {
            registry: Registry::default(),
            device,
            placement,
            prefix_detection: PrefixDetection::default(),
            modules: ModuleBundle::new(),
            notes: Vec::new(),
            losses: LossBundle::new(),
            optimizers: OptimizerBundle::new(),
            schedulers: SchedulerBundle::new(),
            criteria: CriterionBundle::new(),
            last_iteration: None,
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_prefix_detection(mut self, prefix_detection: PrefixDetection) -> Self {
        self.prefix_detection = prefix_detection;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Whether modules get wrapped for data parallel training.
    pub fn is_distributed(&self) -> bool {
        matches!(self.placement, Placement::Distributed(_))
    }

    /// The iteration of the last checkpoint saved or loaded.
    pub fn last_iteration(&self) -> Option<u64> {
        self.last_iteration
    }

    /// Builds the model and places every one of its modules.
    ///
    /// Replaces any previous model, dropping the optimizers and schedulers built for it.
    ///
    /// # Arguments
    /// * `constructor` - Builds the named modules from `options`.
    /// * `is_training` - The mode every module is left in.
    /// * `options` - Handed as is to `constructor`.
    ///
    /// # Errors
    /// `OrchestratorError::ModelConstruction` if `constructor` fails and
    /// `OrchestratorError::DistributedWrap` if a module can't be wrapped. On error the current
    /// model is kept.
    pub fn create_model(
        &mut self,
        constructor: &dyn ModelConstructor,
        is_training: bool,
        options: &Value,
    ) -> Result<()> {
        let model = constructor
            .construct(is_training, options)
            .map_err(OrchestratorError::ModelConstruction)?;

        let mut modules = ModuleBundle::new();
        for (name, mut module) in model.modules {
            let mut module = match &self.placement {
                Placement::Distributed(wrapper) => wrapper.wrap(&name, module)?,
                Placement::SingleDevice => {
                    module.to_device(self.device);
                    module
                }
            };

            module.set_training(is_training);
            debug!(module = name.as_str(), params = module.num_params(); "placed module");
            modules.insert(name, module);
        }

        if !self.optimizers.is_empty() {
            warn!("recreating the model drops its optimizers and schedulers");
        }

        info!(
            modules = modules.len(),
            distributed = self.is_distributed(),
            training = is_training;
            "created model on {}", self.device
        );

        self.modules = modules;
        self.notes = model.notes;
        self.optimizers = OptimizerBundle::new();
        self.schedulers = SchedulerBundle::new();
        Ok(())
    }

    /// Puts every module in training mode. Idempotent.
    pub fn set_train_mode(&mut self) {
        self.set_mode(true);
    }

    /// Puts every module in evaluation mode. Idempotent.
    pub fn set_eval_mode(&mut self) {
        self.set_mode(false);
    }

    fn set_mode(&mut self, training: bool) {
        self.modules
            .iter_mut()
            .for_each(|(_, module)| module.set_training(training));
        debug!(training = training; "switched mode");
    }

    /// Builds every loss function in `options`, replacing the current ones.
    ///
    /// # Arguments
    /// * `options` - The losses by name.
    /// * `use_accelerator` - Whether to move the losses to this algorithm's device.
    ///
    /// # Errors
    /// `OrchestratorError::UnsupportedComponent` or `OrchestratorError::InvalidOptions`, in which
    /// case no loss is replaced.
    pub fn create_loss_functions(
        &mut self,
        options: &BTreeMap<String, LossConfig>,
        use_accelerator: bool,
    ) -> Result<()> {
        let mut losses = LossBundle::new();

        for (name, config) in options {
            let kind = config.kind.as_deref().unwrap_or(name.as_str());
            let mut loss = self.registry.build_loss(kind, config.opts.as_ref())?;
            if use_accelerator {
                loss.to_device(self.device);
            }

            let weight = config.weight;
            losses.insert(name.clone(), WeightedLoss { weight, loss });
        }

        info!(losses = losses.len(); "created loss functions");
        self.losses = losses;
        Ok(())
    }

    /// The parameter group of every module, by module name.
    pub fn param_groups(&self) -> BTreeMap<String, ParamGroup> {
        self.modules
            .iter()
            .map(|(name, module)| (name.to_string(), ParamGroup::of(module)))
            .collect()
    }

    /// Builds one optimizer per component, applying the two time-scale update rule when enabled.
    ///
    /// Replaces the current optimizers and drops every scheduler.
    ///
    /// # Arguments
    /// * `params` - The parameters each component's optimizer updates, see
    ///   [`Algorithm::param_groups`].
    /// * `options` - The optimizers by component.
    ///
    /// # Errors
    /// `OrchestratorError::InvalidConfig` if a component has no parameters, besides whatever the
    /// registry fails with.
    pub fn create_optimizers(
        &mut self,
        params: &BTreeMap<String, ParamGroup>,
        options: &OptimizersConfig,
    ) -> Result<()> {
        let resolved = apply_ttur(options)?;
        let mut optimizers = OptimizerBundle::new();

        for (name, config) in &resolved {
            let group = params.get(name).cloned().ok_or_else(|| {
                OrchestratorError::InvalidConfig(format!(
                    "optimizer `{name}` has no parameters to update"
                ))
            })?;

            let optimizer =
                self.registry
                    .build_optimizer(&config.kind, group, config.opts.as_ref())?;
            debug!(component = name.as_str(), lr = optimizer.learning_rate(); "created optimizer");
            optimizers.insert(name.clone(), optimizer);
        }

        if !self.schedulers.is_empty() {
            warn!("recreating the optimizers drops their schedulers");
        }

        info!(optimizers = optimizers.len(); "created optimizers");
        self.optimizers = optimizers;
        self.schedulers = SchedulerBundle::new();
        Ok(())
    }

    /// Builds one scheduler per entry, each bound to the optimizer of the same name.
    ///
    /// # Errors
    /// `OrchestratorError::UnknownComponent` if an entry has no optimizer, besides whatever the
    /// registry fails with. No scheduler is replaced on error.
    pub fn create_schedulers(&mut self, options: &BTreeMap<String, SchedulerConfig>) -> Result<()> {
        let mut schedulers = SchedulerBundle::new();

        for (name, config) in options {
            let optimizer =
                self.optimizers
                    .get(name)
                    .ok_or_else(|| OrchestratorError::UnknownComponent {
                        bundle: "optimizer",
                        name: name.clone(),
                    })?;

            let scheduler = self.registry.build_scheduler(
                &config.kind,
                optimizer.as_ref(),
                config.opts.as_ref(),
            )?;
            schedulers.insert(name.clone(), scheduler);
        }

        info!(schedulers = schedulers.len(); "created schedulers");
        self.schedulers = schedulers;
        Ok(())
    }

    /// Builds every reporting metric in `options`, replacing the current ones.
    ///
    /// # Errors
    /// `OrchestratorError::UnsupportedComponent` or `OrchestratorError::InvalidOptions`.
    pub fn create_criteria(&mut self, options: &BTreeMap<String, CriterionConfig>) -> Result<()> {
        let mut criteria = CriterionBundle::new();

        for (name, config) in options {
            let kind = config.kind.as_deref().unwrap_or(name.as_str());
            let mut metric = self.registry.build_metric(kind, config.opts.as_ref())?;
            metric.to_device(self.device);

            let unit = config.unit.clone();
            criteria.insert(name.clone(), Criterion { metric, unit });
        }

        info!(criteria = criteria.len(); "created criteria");
        self.criteria = criteria;
        Ok(())
    }

    /// Steps every scheduler once, updating the learning rate of its optimizer.
    ///
    /// # Errors
    /// `OrchestratorError::UnknownComponent` if a scheduler lost its optimizer.
    pub fn update_learning_rates(&mut self) -> Result<()> {
        for (name, scheduler) in self.schedulers.iter_mut() {
            let optimizer =
                self.optimizers
                    .get_mut(name)
                    .ok_or_else(|| OrchestratorError::UnknownComponent {
                        bundle: "optimizer",
                        name: name.to_string(),
                    })?;

            scheduler.step(optimizer.as_mut());
            debug!(
                component = name,
                epoch = scheduler.last_epoch(),
                lr = optimizer.learning_rate();
                "stepped scheduler"
            );
        }

        Ok(())
    }

    /// Every item name a checkpoint of the current components holds.
    pub fn checkpoint_items(&self, include_schedulers: bool) -> Vec<String> {
        let modules = self.modules.names().map(ItemName::Module);
        let optimizers = self.optimizers.names().map(ItemName::Optimizer);
        let schedulers = self
            .schedulers
            .names()
            .filter(|_| include_schedulers)
            .map(ItemName::Scheduler);

        modules
            .chain(optimizers)
            .chain(schedulers)
            .map(|item| item.to_string())
            .collect()
    }

    /// Saves the state of every module and optimizer, and optionally every scheduler, along with
    /// `iteration`.
    ///
    /// The file is replaced atomically, a crash mid save leaves the previous checkpoint intact.
    ///
    /// # Errors
    /// `OrchestratorError::NotCreated` without a model, `OrchestratorError::IterationRegressed`
    /// if `iteration` is older than the last one saved or loaded, and `OrchestratorError::Io` or
    /// `OrchestratorError::Codec` if writing fails.
    pub fn save_checkpoint<P: AsRef<Path>>(
        &mut self,
        path: P,
        iteration: u64,
        include_schedulers: bool,
    ) -> Result<()> {
        let path = path.as_ref();

        if self.modules.is_empty() {
            return Err(OrchestratorError::NotCreated("model"));
        }

        if let Some(last) = self.last_iteration {
            if iteration < last {
                return Err(OrchestratorError::IterationRegressed {
                    last,
                    got: iteration,
                });
            }
        }

        let mut items = BTreeMap::new();
        for (name, module) in self.modules.iter() {
            let item = ItemName::Module(name).to_string();
            items.insert(item, ItemState::Module(module.state_dict()));
        }

        for (name, optimizer) in self.optimizers.iter() {
            let item = ItemName::Optimizer(name).to_string();
            items.insert(item, ItemState::Optimizer(optimizer.state_dict()));
        }

        if include_schedulers {
            for (name, scheduler) in self.schedulers.iter() {
                let item = ItemName::Scheduler(name).to_string();
                items.insert(item, ItemState::Scheduler(scheduler.state_dict()));
            }
        }

        let record = CheckpointRecord { iteration, items };
        checkpoint::write(path, &record)?;

        info!(
            iteration = iteration,
            items = record.items.len();
            "saved checkpoint to {}", path.display()
        );
        self.last_iteration = Some(iteration);
        Ok(())
    }

    /// Restores the requested items from a checkpoint.
    ///
    /// Module states saved from a wrapped module are loaded into an unwrapped one, and the other
    /// way around. Either every item is applied or none is.
    ///
    /// # Arguments
    /// * `path` - The checkpoint file.
    /// * `items` - The item names to restore, e.g. `module_gen` or `optim_dis`.
    /// * `is_distributed` - Whether the live modules are wrapped.
    ///
    /// # Returns
    /// The iteration the checkpoint was saved at.
    ///
    /// # Errors
    /// `OrchestratorError::CheckpointNotFound` if there's no file at `path`,
    /// `OrchestratorError::CheckpointItemMissing` if an item isn't in the file or has no live
    /// component, `OrchestratorError::MixedPrefixes` if a module state can't be reconciled and
    /// `OrchestratorError::ItemLoad` if a state doesn't fit its component.
    pub fn load_checkpoint<P, S>(
        &mut self,
        path: P,
        items: &[S],
        is_distributed: bool,
    ) -> Result<u64>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let path = path.as_ref();
        let record = checkpoint::read(path)?;

        if is_distributed != self.is_distributed() {
            warn!(
                is_distributed = is_distributed,
                wrapped = self.is_distributed();
                "loading with a distribution flag that doesn't match the live modules"
            );
        }

        let staged = items
            .iter()
            .map(|item| self.stage(path, &record, item.as_ref(), is_distributed))
            .collect::<Result<Vec<_>>>()?;

        let snapshots = staged
            .iter()
            .map(|staged| self.snapshot(staged))
            .collect::<Result<Vec<_>>>()?;

        for (i, staged) in staged.iter().enumerate() {
            if let Err(e) = self.apply(staged) {
                for snapshot in snapshots[..=i].iter().rev() {
                    if let Err(restore) = self.apply(snapshot) {
                        error!(item = snapshot.item().as_str(); "failed to roll back: {restore}");
                    }
                }

                return Err(e);
            }
        }

        info!(
            iteration = record.iteration,
            items = staged.len();
            "loaded checkpoint from {}", path.display()
        );
        self.last_iteration = Some(record.iteration);
        Ok(record.iteration)
    }

    fn stage(
        &self,
        path: &Path,
        record: &CheckpointRecord,
        item: &str,
        is_distributed: bool,
    ) -> Result<Staged> {
        let missing = |location| OrchestratorError::CheckpointItemMissing {
            item: item.to_string(),
            location,
        };

        let state = record
            .items
            .get(item)
            .ok_or_else(|| missing(ItemLocation::Checkpoint))?;
        let parsed = ItemName::parse(item).ok_or_else(|| missing(ItemLocation::Components))?;

        let live = match parsed {
            ItemName::Module(name) => self.modules.contains(name),
            ItemName::Optimizer(name) => self.optimizers.contains(name),
            ItemName::Scheduler(name) => self.schedulers.contains(name),
        };
        if !live {
            return Err(missing(ItemLocation::Components));
        }

        let name = parsed.component().to_string();
        let staged = match (parsed, state) {
            (ItemName::Module(_), ItemState::Module(state)) => {
                let state = reconcile(item, state.clone(), is_distributed, self.prefix_detection)?;
                Staged::Module(name, state)
            }
            (ItemName::Optimizer(_), ItemState::Optimizer(state)) => {
                Staged::Optimizer(name, state.clone())
            }
            (ItemName::Scheduler(_), ItemState::Scheduler(state)) => {
                Staged::Scheduler(name, state.clone())
            }
            (_, state) => {
                return Err(OrchestratorError::CorruptCheckpoint {
                    path: path.to_path_buf(),
                    reason: format!("`{item}` holds a {} state", state.kind()),
                });
            }
        };

        Ok(staged)
    }

    /// The current state of the component `staged` targets.
    fn snapshot(&self, staged: &Staged) -> Result<Staged> {
        let snapshot = match staged {
            Staged::Module(name, _) => {
                let module = self.module(name)?;
                Staged::Module(name.clone(), module.state_dict())
            }
            Staged::Optimizer(name, _) => {
                let optimizer = self
                    .optimizers
                    .get(name)
                    .ok_or_else(|| unknown("optimizer", name))?;
                Staged::Optimizer(name.clone(), optimizer.state_dict())
            }
            Staged::Scheduler(name, _) => {
                let scheduler = self
                    .schedulers
                    .get(name)
                    .ok_or_else(|| unknown("scheduler", name))?;
                Staged::Scheduler(name.clone(), scheduler.state_dict())
            }
        };

        Ok(snapshot)
    }

    fn apply(&mut self, staged: &Staged) -> Result<()> {
        let loaded = match staged {
            Staged::Module(name, state) => self.module_mut(name)?.load_state_dict(state),
            Staged::Optimizer(name, state) => self
                .optimizers
                .get_mut(name)
                .ok_or_else(|| unknown("optimizer", name))?
                .load_state_dict(state),
            Staged::Scheduler(name, state) => self
                .schedulers
                .get_mut(name)
                .ok_or_else(|| unknown("scheduler", name))?
                .load_state_dict(state),
        };

        loaded.map_err(|source| OrchestratorError::ItemLoad {
            item: staged.item(),
            source,
        })
    }

    /// Writes the constructor's notes followed by every module's architecture, logging each
    /// line as it goes.
    ///
    /// # Errors
    /// `OrchestratorError::Io` if writing to `out` fails.
    pub fn print_net<W: Write>(&self, out: &mut W) -> Result<()> {
        for note in &self.notes {
            info!("{note}");
            writeln!(out, "{note}")?;
        }

        for (name, module) in self.modules.iter() {
            let params = module.num_params();
            info!(module = name, params = params; "{name}: {params} parameters");
            writeln!(out, "{name}: {params} parameters")?;

            for line in module.summary() {
                info!(module = name; "  {line}");
                writeln!(out, "  {line}")?;
            }
        }

        Ok(())
    }

    pub fn modules(&self) -> &ModuleBundle {
        &self.modules
    }

    /// # Errors
    /// `OrchestratorError::UnknownComponent` if there's no module named `name`.
    pub fn module(&self, name: &str) -> Result<&dyn Module> {
        self.modules
            .get(name)
            .map(|module| &**module)
            .ok_or_else(|| unknown("module", name))
    }

    /// # Errors
    /// `OrchestratorError::UnknownComponent` if there's no module named `name`.
    pub fn module_mut(&mut self, name: &str) -> Result<&mut Box<dyn Module>> {
        self.modules
            .get_mut(name)
            .ok_or_else(|| unknown("module", name))
    }

    pub fn losses(&self) -> &LossBundle {
        &self.losses
    }

    pub fn optimizers(&self) -> &OptimizerBundle {
        &self.optimizers
    }

    pub fn schedulers(&self) -> &SchedulerBundle {
        &self.schedulers
    }

    pub fn criteria(&self) -> &CriterionBundle {
        &self.criteria
    }

    /// Evaluates the loss `name`, scaled by its weight.
    ///
    /// # Returns
    /// The weighted loss and its derivative with respect to `y_pred`.
    ///
    /// # Errors
    /// `OrchestratorError::UnknownComponent` if there's no such loss and `OrchestratorError::Ml`
    /// if the shapes of `y_pred` and `y` differ.
    pub fn weighted_loss(
        &self,
        name: &str,
        y_pred: ArrayView2<f32>,
        y: ArrayView2<f32>,
    ) -> Result<(f32, Array2<f32>)> {
        let WeightedLoss { weight, loss } =
            self.losses.get(name).ok_or_else(|| unknown("loss", name))?;

        if y_pred.shape() != y.shape() {
            return Err(MlErr::ShapeMismatch {
                key: name.to_string(),
                got: y_pred.shape().to_vec(),
                expected: y.shape().to_vec(),
            }
            .into());
        }

        let value = weight * loss.loss(y_pred, y);
        let d = loss.loss_prime(y_pred, y) * *weight;
        Ok((value, d))
    }

    /// Applies the gradients accumulated by module `name` with its optimizer, then zeroes them.
    ///
    /// # Errors
    /// `OrchestratorError::UnknownComponent` if there's no such module or optimizer and
    /// `OrchestratorError::Ml` if the optimizer was built for other parameters.
    pub fn step_optimizer(&mut self, name: &str) -> Result<()> {
        let optimizer = self
            .optimizers
            .get_mut(name)
            .ok_or_else(|| unknown("optimizer", name))?;
        let module = self
            .modules
            .get_mut(name)
            .ok_or_else(|| unknown("module", name))?;

        optimizer.step(module.named_params_mut())?;
        module.zero_grad();
        Ok(())
    }

    /// Scores `candidate` against `reference` with criterion `name`.
    ///
    /// # Errors
    /// `OrchestratorError::UnknownComponent` if there's no such criterion and
    /// `OrchestratorError::Ml` if the images can't be compared.
    pub fn evaluate(&self, name: &str, reference: Image<'_>, candidate: Image<'_>) -> Result<f64> {
        let criterion = self
            .criteria
            .get(name)
            .ok_or_else(|| unknown("criterion", name))?;

        Ok(criterion.metric.compute(reference, candidate)?)
    }
}

fn unknown(bundle: &'static str, name: &str) -> OrchestratorError {
    OrchestratorError::UnknownComponent {
        bundle,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use machine_learning::{
        arch::{
            Sequential,
            init::Init,
            layers::{Dense, Layer},
        },
        device::FixedDevice,
    };
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;

    use super::*;
    use crate::{
        configs::{OptimizerConfig, TturConfig},
        error::ConstructionError,
        model::Model,
    };

    fn linear(seed: u64) -> Sequential {
        let mut rng = StdRng::seed_from_u64(seed);
        let dense = Dense::new((2, 1), None, Init::Kaiming, &mut rng).unwrap();
        Sequential::new([Layer::Dense(dense)])
    }

    fn constructor(_: bool, _: &Value) -> std::result::Result<Model, ConstructionError> {
        Ok(Model::new()
            .with_module("gen", linear(1))
            .with_module("dis", linear(2))
            .with_note("two linear modules"))
    }

    fn algorithm() -> Algorithm {
        let mut algorithm = Algorithm::single_device(&FixedDevice(Device::Cpu));
        algorithm
            .create_model(&constructor, true, &Value::Null)
            .unwrap();
        algorithm
    }

    fn sgd(lr: f32) -> OptimizerConfig {
        OptimizerConfig {
            kind: "SGD".to_string(),
            opts: Some(json!({ "lr": lr })),
        }
    }

    fn optimizers(ttur: Option<TturConfig>) -> OptimizersConfig {
        OptimizersConfig {
            ttur,
            components: BTreeMap::from([
                ("gen".to_string(), sgd(0.1)),
                ("dis".to_string(), sgd(0.1)),
            ]),
        }
    }

    #[test]
    fn failing_constructor_keeps_model() {
        let mut algorithm = algorithm();
        let failing = |_: bool, _: &Value| -> std::result::Result<Model, ConstructionError> {
            Err("out of memory".into())
        };

        let err = algorithm
            .create_model(&failing, true, &Value::Null)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ModelConstruction(_)));
        assert_eq!(algorithm.modules().len(), 2);
    }

    #[test]
    fn distributed_without_group_fails_to_wrap() {
        let mut algorithm = Algorithm::distributed(&FixedDevice(Device::Cpu), None);

        let err = algorithm
            .create_model(&constructor, true, &Value::Null)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DistributedWrap(_)));
        assert!(algorithm.modules().is_empty());
    }

    #[test]
    fn eval_mode_is_idempotent() {
        let mut algorithm = algorithm();

        algorithm.set_eval_mode();
        algorithm.set_eval_mode();
        assert!(algorithm.modules().iter().all(|(_, m)| !m.is_training()));

        algorithm.set_train_mode();
        assert!(algorithm.modules().iter().all(|(_, m)| m.is_training()));
    }

    #[test]
    fn ttur_rates_reach_the_optimizers() {
        let mut algorithm = algorithm();
        let ttur = TturConfig {
            enabled: true,
            lr: 0.02,
            slow: "gen".to_string(),
            fast: "dis".to_string(),
        };

        let params = algorithm.param_groups();
        algorithm
            .create_optimizers(&params, &optimizers(Some(ttur)))
            .unwrap();

        let lr = |name: &str| algorithm.optimizers().get(name).unwrap().learning_rate();
        assert_eq!(lr("gen"), 0.01);
        assert_eq!(lr("dis"), 0.04);
    }

    #[test]
    fn optimizer_without_parameters_fails() {
        let mut algorithm = algorithm();
        let mut config = optimizers(None);
        config.components.insert("ema".to_string(), sgd(0.1));

        let params = algorithm.param_groups();
        assert!(matches!(
            algorithm.create_optimizers(&params, &config),
            Err(OrchestratorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn update_learning_rates_without_schedulers_is_a_no_op() {
        let mut algorithm = algorithm();
        let params = algorithm.param_groups();
        algorithm.create_optimizers(&params, &optimizers(None)).unwrap();

        algorithm.update_learning_rates().unwrap();
        assert_eq!(
            algorithm.optimizers().get("gen").unwrap().learning_rate(),
            0.1
        );
    }

    #[test]
    fn scheduler_needs_an_optimizer() {
        let mut algorithm = algorithm();
        let options = BTreeMap::from([(
            "gen".to_string(),
            SchedulerConfig {
                kind: "StepLR".to_string(),
                opts: None,
            },
        )]);

        assert!(matches!(
            algorithm.create_schedulers(&options),
            Err(OrchestratorError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn weighted_loss_scales_value_and_gradient() {
        let mut algorithm = algorithm();
        let options = BTreeMap::from([(
            "pixel".to_string(),
            LossConfig {
                kind: Some("L1Loss".to_string()),
                weight: 2.,
                opts: None,
            },
        )]);
        algorithm.create_loss_functions(&options, false).unwrap();

        let y_pred = array![[1., 2.]];
        let y = array![[0., 0.]];
        let (value, d) = algorithm
            .weighted_loss("pixel", y_pred.view(), y.view())
            .unwrap();

        assert_eq!(value, 3.);
        assert_eq!(d, array![[1., 1.]]);

        let short = array![[0.]];
        assert!(algorithm
            .weighted_loss("pixel", y_pred.view(), short.view())
            .is_err());
    }

    #[test]
    fn step_optimizer_updates_and_zeroes() {
        let mut algorithm = algorithm();
        let params = algorithm.param_groups();
        algorithm.create_optimizers(&params, &optimizers(None)).unwrap();

        let before = algorithm.module("gen").unwrap().state_dict();
        let module = algorithm.module_mut("gen").unwrap();
        module.forward(array![[1., 1.]].view()).unwrap();
        module.backward(array![[1.]].view()).unwrap();

        algorithm.step_optimizer("gen").unwrap();

        let module = algorithm.module("gen").unwrap();
        assert_ne!(module.state_dict(), before);
        assert!(module
            .named_params()
            .iter()
            .all(|(_, p)| p.grad.iter().all(|&g| g == 0.)));
    }

    #[test]
    fn evaluates_criteria() {
        let mut algorithm = algorithm();
        let options = BTreeMap::from([(
            "psnr".to_string(),
            CriterionConfig {
                kind: Some("PSNR".to_string()),
                opts: None,
                unit: "dB".to_string(),
            },
        )]);
        algorithm.create_criteria(&options).unwrap();

        let a = ndarray::Array3::<f32>::from_elem((1, 2, 2), 0.5);
        let b = ndarray::Array3::<f32>::from_elem((1, 2, 2), 0.4);
        let score = algorithm.evaluate("psnr", (&a).into(), (&b).into()).unwrap();

        assert!((score - 20.).abs() < 1e-3);
        assert_eq!(algorithm.criteria().get("psnr").unwrap().unit, "dB");
    }

    #[test]
    fn losses_and_criteria_default_to_their_entry_name() {
        let mut algorithm = algorithm();
        let losses = BTreeMap::from([(
            "MSELoss".to_string(),
            LossConfig {
                kind: None,
                weight: 1.,
                opts: None,
            },
        )]);
        let criteria = BTreeMap::from([(
            "PSNR".to_string(),
            CriterionConfig {
                kind: None,
                opts: None,
                unit: "dB".to_string(),
            },
        )]);
        algorithm.create_loss_functions(&losses, false).unwrap();
        algorithm.create_criteria(&criteria).unwrap();

        let y_pred = array![[1., 2.]];
        let y = array![[0., 0.]];
        let (value, _) = algorithm
            .weighted_loss("MSELoss", y_pred.view(), y.view())
            .unwrap();
        assert_eq!(value, 2.5);

        let a = ndarray::Array3::<f32>::from_elem((1, 2, 2), 0.5);
        let b = ndarray::Array3::<f32>::from_elem((1, 2, 2), 0.4);
        let score = algorithm.evaluate("PSNR", (&a).into(), (&b).into()).unwrap();
        assert!((score - 20.).abs() < 1e-3);

        let unknown = BTreeMap::from([(
            "pixel".to_string(),
            LossConfig {
                kind: None,
                weight: 1.,
                opts: None,
            },
        )]);
        let err = algorithm.create_loss_functions(&unknown, false).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::UnsupportedComponent { ref name, .. } if name == "pixel"
        ));
    }

    #[test]
    fn print_net_lists_every_module() {
        let algorithm = algorithm();
        let mut out = Vec::new();
        algorithm.print_net(&mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("two linear modules\n"));
        assert!(out.contains("dis: 3 parameters"));
        assert!(out.contains("gen: 3 parameters"));
    }

    #[test]
    fn checkpoint_items_follow_components() {
        let mut algorithm = algorithm();
        let params = algorithm.param_groups();
        algorithm.create_optimizers(&params, &optimizers(None)).unwrap();

        assert_eq!(
            algorithm.checkpoint_items(true),
            ["module_dis", "module_gen", "optim_dis", "optim_gen"]
        );
    }
}
