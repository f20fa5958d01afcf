use std::sync::Arc;

use log::info;
use machine_learning::{arch::Module, collective::ProcessGroup, device::Device};

use crate::{DistributedDataParallel, Result, WrapErr};

/// Prepares modules for data parallel training on the current device.
pub struct DistributedWrapper {
    device: Device,
    group: Option<Arc<dyn ProcessGroup>>,
}

impl DistributedWrapper {
    /// Creates a new `DistributedWrapper`.
    ///
    /// # Arguments
    /// * `device` - The device every wrapped module is moved to.
    /// * `group` - The already initialized process group, if any.
    pub fn new(device: Device, group: Option<Arc<dyn ProcessGroup>>) -> Self {
        Self { device, group }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn group(&self) -> Option<&Arc<dyn ProcessGroup>> {
        self.group.as_ref()
    }

    /// Moves `module` to the device, converts its batch normalization layers to their synchronized
    /// variant and wraps it so its gradients are averaged across the group.
    ///
    /// Collective: every rank must wrap the same modules in the same order.
    ///
    /// # Arguments
    /// * `name` - The module's name, for reporting.
    /// * `module` - The module to wrap.
    ///
    /// # Errors
    /// `WrapErr::NoProcessGroup` without a group, `WrapErr::AlreadyWrapped` if `module` is
    /// already wrapped and `WrapErr::Sync` if the replicas couldn't be synchronized.
    pub fn wrap(&self, name: &str, mut module: Box<dyn Module>) -> Result<Box<dyn Module>> {
        let group = self.group.as_ref().ok_or(WrapErr::NoProcessGroup)?;

        if module.is_distributed() {
            return Err(WrapErr::AlreadyWrapped(name.to_string()));
        }

        module.to_device(self.device);
        let converted = module.convert_sync_batchnorm(group);

        let ddp = DistributedDataParallel::new(module, Arc::clone(group)).map_err(|source| {
            WrapErr::Sync {
                module: name.to_string(),
                source,
            }
        })?;

        info!(
            module = name,
            rank = group.rank(),
            sync_batch_norms = converted;
            "wrapped module on {}", self.device
        );

        Ok(Box::new(ddp))
    }
}
