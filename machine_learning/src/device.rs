use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Where a module or buffer lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    Accelerator(usize),
}

impl Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(ordinal) => write!(f, "accelerator:{ordinal}"),
        }
    }
}

/// Exposes the device the current worker should place its objects on.
///
/// Device discovery and allocation policy belong to the implementor.
pub trait DeviceContext: Send + Sync {
    fn current_device(&self) -> Device;
}

/// A context that always answers with the same device.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDevice(pub Device);

impl DeviceContext for FixedDevice {
    fn current_device(&self) -> Device {
        self.0
    }
}
