//! Named control endpoints published for a device (sysctl-style).
//!
//! The set of endpoints depends on the capability found at attach. Reads of
//! `power` ask the firmware; reads of `level`, `speed_percent` and `rpm`
//! refresh the status cache first; everything else is static capability
//! data.

use std::fmt;

use serde::Serialize;

use crate::device::DeviceContext;
use crate::errors::FanError;
use crate::fan::{FanCapability, PowerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: &'static str,
    pub access: Access,
    pub description: &'static str,
}

pub const POWER: Endpoint = Endpoint {
    name: "power",
    access: Access::ReadWrite,
    description: "Fan on=1 off=0",
};
pub const SPEED_PERCENT: Endpoint = Endpoint {
    name: "speed_percent",
    access: Access::ReadWrite,
    description: "Fan speed in %",
};
pub const LEVEL: Endpoint = Endpoint {
    name: "level",
    access: Access::ReadWrite,
    description: "Fan level (control value of a performance state)",
};
pub const RPM: Endpoint = Endpoint {
    name: "rpm",
    access: Access::ReadOnly,
    description: "Current fan speed in RPM",
};
pub const STEP_SIZE: Endpoint = Endpoint {
    name: "step_size",
    access: Access::ReadOnly,
    description: "Recommended percentage step",
};
pub const MAX_LEVELS: Endpoint = Endpoint {
    name: "max_levels",
    access: Access::ReadOnly,
    description: "Number of fan levels",
};
pub const LEVELS: Endpoint = Endpoint {
    name: "levels",
    access: Access::ReadOnly,
    description: "Available fan levels",
};
pub const LOW_SPEED_NOTIFY: Endpoint = Endpoint {
    name: "low_speed_notify",
    access: Access::ReadOnly,
    description: "Firmware reports low fan speed",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EndpointValue {
    Bool(bool),
    Int(u32),
    List(Vec<u32>),
}

impl fmt::Display for EndpointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointValue::Bool(value) => write!(f, "{}", u8::from(*value)),
            EndpointValue::Int(value) => write!(f, "{}", value),
            EndpointValue::List(values) => {
                let joined: Vec<String> = values.iter().map(|value| value.to_string()).collect();
                write!(f, "{}", joined.join(" "))
            }
        }
    }
}

/// Endpoints published for a capability.
pub fn endpoints(capability: &FanCapability) -> Vec<Endpoint> {
    match capability {
        FanCapability::Legacy => vec![POWER],
        FanCapability::PercentageControl { .. } => {
            vec![POWER, SPEED_PERCENT, RPM, STEP_SIZE, LOW_SPEED_NOTIFY]
        }
        FanCapability::DiscreteLevelControl { .. } => {
            vec![POWER, LEVEL, RPM, MAX_LEVELS, LEVELS, LOW_SPEED_NOTIFY]
        }
    }
}

/// Endpoint dispatcher for one attached device.
pub struct ControlTree<'a> {
    device: &'a DeviceContext,
}

impl<'a> ControlTree<'a> {
    pub fn new(device: &'a DeviceContext) -> Self {
        Self { device }
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        endpoints(self.device.capability())
    }

    fn lookup(&self, name: &str) -> Result<Endpoint, FanError> {
        self.endpoints()
            .into_iter()
            .find(|endpoint| endpoint.name == name)
            .ok_or_else(|| FanError::NoSuchEndpoint(name.to_string()))
    }

    pub fn read(&self, name: &str) -> Result<EndpointValue, FanError> {
        let endpoint = self.lookup(name)?;
        let capability = self.device.capability();

        let value = match endpoint.name {
            "power" => match self.device.probe_power()? {
                PowerState::On => EndpointValue::Bool(true),
                PowerState::Off => EndpointValue::Bool(false),
                PowerState::Unknown => return Err(FanError::PowerStateUnknown),
            },
            "level" | "speed_percent" => EndpointValue::Int(self.device.refresh()?.control_value),
            "rpm" => EndpointValue::Int(self.device.refresh()?.current_speed_rpm),
            "step_size" => EndpointValue::Int(capability.info().map_or(0, |info| info.step_size)),
            "low_speed_notify" => {
                EndpointValue::Bool(capability.info().is_some_and(|info| info.low_speed_notify))
            }
            "max_levels" => {
                let count = capability.table().map_or(0, |table| table.len());
                EndpointValue::Int(u32::try_from(count).unwrap_or(u32::MAX))
            }
            "levels" => EndpointValue::List(
                capability
                    .table()
                    .map(|table| table.control_values())
                    .unwrap_or_default(),
            ),
            other => return Err(FanError::NoSuchEndpoint(other.to_string())),
        };
        Ok(value)
    }

    /// Write `value` to a read-write endpoint and return what was applied.
    pub fn write(&self, name: &str, value: i64) -> Result<EndpointValue, FanError> {
        let endpoint = self.lookup(name)?;
        if endpoint.access == Access::ReadOnly {
            return Err(FanError::ReadOnly(name.to_string()));
        }

        match endpoint.name {
            "power" => {
                let on = match value {
                    0 => false,
                    1 => true,
                    _ => {
                        return Err(FanError::OutOfRange {
                            value,
                            domain: "0 or 1".to_string(),
                        })
                    }
                };
                self.device.set_power(on)?;
                Ok(EndpointValue::Bool(on))
            }
            "level" | "speed_percent" => Ok(EndpointValue::Int(self.device.set_control(value)?)),
            other => Err(FanError::ReadOnly(other.to_string())),
        }
    }
}
