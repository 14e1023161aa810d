use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::FanError;
use crate::firmware::NamespaceFixture;

/// Per-device behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevicePolicy {
    /// Power an unpowered fan on before a level write instead of rejecting it.
    pub implicit_power_on: bool,
    /// Refuse to drive the fan at all; attach reports it unsupported.
    pub disabled: bool,
}

impl Default for DevicePolicy {
    fn default() -> Self {
        Self {
            implicit_power_on: true,
            disabled: false,
        }
    }
}

/// Contents of a device description file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub device: NamespaceFixture,
    #[serde(default)]
    pub policy: DevicePolicy,
}

pub fn load_config(path: &Path) -> Result<DeviceConfig, FanError> {
    let content = fs::read_to_string(path)?;
    let config: DeviceConfig = serde_json::from_str(&content)?;
    debug!(
        "loaded device {} from {}",
        config.device.hardware_id,
        path.display()
    );
    Ok(config)
}
