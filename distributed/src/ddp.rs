use std::sync::Arc;

use machine_learning::{
    MlErr, Param, Result, StateDict,
    arch::Module,
    collective::ProcessGroup,
    device::Device,
    tensor::{flatten, unflatten},
};
use ndarray::{Array2, ArrayView2};

/// The namespace every state key and parameter name gains once wrapped.
pub const PREFIX: &str = "module.";

/// Wraps a module so that every backward pass averages its gradients across the process group.
///
/// Construction broadcasts rank 0's state so every replica starts from the same weights. Both
/// construction and `backward` are collective calls.
pub struct DistributedDataParallel {
    module: Box<dyn Module>,
    group: Arc<dyn ProcessGroup>,
}

impl DistributedDataParallel {
    /// Wraps `module`, overwriting its state with rank 0's.
    ///
    /// # Errors
    /// If the broadcast fails, e.g. because replicas differ in size.
    pub fn new(mut module: Box<dyn Module>, group: Arc<dyn ProcessGroup>) -> Result<Self> {
        let mut state = module.state_dict();
        let mut buf = flatten(state.values());

        group.broadcast(&mut buf, 0)?;
        unflatten(&buf, state.values_mut())?;
        module.load_state_dict(&state)?;

        Ok(Self { module, group })
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn Module> {
        self.module
    }

    fn sync_gradients(&mut self) -> Result<()> {
        let mut params = self.module.named_params_mut();
        let mut buf = flatten(params.iter().map(|(_, p)| &p.grad));

        self.group.all_reduce_mean(&mut buf)?;
        unflatten(&buf, params.iter_mut().map(|(_, p)| &mut p.grad))
    }
}

impl Module for DistributedDataParallel {
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.module.forward(x)
    }

    fn backward(&mut self, d: ArrayView2<f32>) -> Result<Array2<f32>> {
        let d = self.module.backward(d)?;
        self.sync_gradients()?;
        Ok(d)
    }

    fn named_params(&self) -> Vec<(String, &Param)> {
        self.module
            .named_params()
            .into_iter()
            .map(|(k, p)| (format!("{PREFIX}{k}"), p))
            .collect()
    }

    fn named_params_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.module
            .named_params_mut()
            .into_iter()
            .map(|(k, p)| (format!("{PREFIX}{k}"), p))
            .collect()
    }

    fn state_dict(&self) -> StateDict {
        self.module
            .state_dict()
            .into_iter()
            .map(|(k, t)| (format!("{PREFIX}{k}"), t))
            .collect()
    }

    /// # Errors
    /// Also if any key lacks the wrapper's namespace.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let unexpected: Vec<String> = state
            .keys()
            .filter(|k| !k.starts_with(PREFIX))
            .cloned()
            .collect();

        if !unexpected.is_empty() {
            return Err(MlErr::StateDictMismatch {
                missing: Vec::new(),
                unexpected,
            });
        }

        let inner: StateDict = state
            .iter()
            .filter_map(|(k, t)| Some((k.strip_prefix(PREFIX)?.to_string(), t.clone())))
            .collect();

        self.module.load_state_dict(&inner)
    }

    fn set_training(&mut self, training: bool) {
        self.module.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.module.is_training()
    }

    fn to_device(&mut self, device: Device) {
        self.module.to_device(device);
    }

    fn device(&self) -> Device {
        self.module.device()
    }

    fn convert_sync_batchnorm(&mut self, group: &Arc<dyn ProcessGroup>) -> usize {
        self.module.convert_sync_batchnorm(group)
    }

    fn is_distributed(&self) -> bool {
        true
    }

    fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "DistributedDataParallel(rank={}, world_size={})",
            self.group.rank(),
            self.group.world_size()
        )];
        lines.extend(self.module.summary().into_iter().map(|l| format!("  {l}")));
        lines
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use machine_learning::arch::{
        Sequential,
        init::Init,
        layers::{BatchNorm, Dense, Layer},
    };
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::LocalGroup;

    fn model(seed: u64) -> Box<dyn Module> {
        let mut rng = StdRng::seed_from_u64(seed);
        Box::new(Sequential::new([
            Layer::Dense(Dense::new((2, 2), None, Init::Kaiming, &mut rng).unwrap()),
            Layer::BatchNorm(BatchNorm::new(2, 1e-5, 0.1)),
        ]))
    }

    #[test]
    fn keys_are_prefixed() {
        let group: Arc<dyn ProcessGroup> = Arc::new(LocalGroup::new_group(1).remove(0));
        let ddp = DistributedDataParallel::new(model(0), group).unwrap();

        assert!(ddp.state_dict().keys().all(|k| k.starts_with("module.")));
        assert!(ddp.named_params().iter().all(|(k, _)| k.starts_with("module.")));
        assert!(ddp.is_distributed());
    }

    #[test]
    fn load_requires_prefix() {
        let group: Arc<dyn ProcessGroup> = Arc::new(LocalGroup::new_group(1).remove(0));
        let mut ddp = DistributedDataParallel::new(model(0), group).unwrap();

        let bare = model(1).state_dict();
        assert!(ddp.load_state_dict(&bare).is_err());

        let prefixed = ddp.state_dict();
        ddp.load_state_dict(&prefixed).unwrap();
    }

    #[test]
    fn replicas_start_and_stay_equal() {
        let handles: Vec<_> = LocalGroup::new_group(2)
            .into_iter()
            .map(|group| {
                thread::spawn(move || {
                    let rank = group.rank();
                    let group: Arc<dyn ProcessGroup> = Arc::new(group);
                    // every rank starts from a different seed
                    let mut ddp = DistributedDataParallel::new(model(rank as u64), group).unwrap();
                    let start = ddp.state_dict();

                    let x = if rank == 0 {
                        array![[1., 2.], [3., 4.]]
                    } else {
                        array![[-1., 0.5], [2., -2.]]
                    };
                    let y = ddp.forward(x.view()).unwrap();
                    ddp.backward(y.view()).unwrap();

                    let grads: Vec<_> = ddp
                        .named_params()
                        .into_iter()
                        .map(|(_, p)| p.grad.clone())
                        .collect();
                    (start, grads)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let (start0, grads0) = &results[0];
        let (start1, grads1) = &results[1];

        assert_eq!(start0, start1);
        assert_eq!(grads0, grads1);
    }
}
