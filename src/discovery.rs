//! Capability discovery.
//!
//! Runs once at attach. Every problem with the optional ACPI 4.0 fan objects
//! degrades the device to [`FanCapability::Legacy`]; only a device without
//! any control surface at all is rejected.

use log::{debug, info, warn};

use crate::errors::FanError;
use crate::fan::{FanCapability, FanInfo, FanStatus, PerformanceState, PerformanceTable};
use crate::firmware::{decode_words, FirmwareGateway, GatewayError, TypedResult, FIF, FPS, FSL, FST, PS0, PS3};
use crate::status::decode_status;

/// Hardware ids handled by this driver.
pub const FAN_DEVICE_IDS: &[&str] = &[
    "PNP0C0B",  // Generic Fan
    "INT3404",  // Fan
    "INTC1044", // Fan for Tiger Lake generation
    "INTC1048", // Fan for Alder Lake generation
    "INTC1063", // Fan for Meteor Lake generation
    "INTC10A2", // Fan for Raptor Lake generation
];

pub const DEVICE_DESCRIPTION: &str = "ACPI FAN";

const FPS_FIELDS: usize = 5;

/// Outcome of a successful discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub capability: FanCapability,
    /// `_FST` reading taken while probing, used to seed the status cache.
    pub status: Option<FanStatus>,
}

pub fn is_fan_device(hardware_id: &str) -> bool {
    FAN_DEVICE_IDS
        .iter()
        .any(|id| id.eq_ignore_ascii_case(hardware_id.trim()))
}

/// Determine the control mode of the device behind `gateway`.
pub fn discover(gateway: &dyn FirmwareGateway) -> Result<Discovery, FanError> {
    let hardware_id = gateway.hardware_id();
    if !is_fan_device(&hardware_id) {
        return Err(FanError::Unsupported(format!(
            "'{}' is not a fan device",
            hardware_id
        )));
    }

    match probe_acpi4(gateway) {
        Ok(discovery) => {
            info!("{} {}: {}", DEVICE_DESCRIPTION, hardware_id, discovery.capability);
            Ok(discovery)
        }
        Err(reason) => {
            if !(gateway.has_object(PS0) && gateway.has_object(PS3)) {
                return Err(FanError::Unsupported(format!(
                    "no usable control surface ({}; {} and {} missing)",
                    reason, PS0, PS3
                )));
            }
            info!(
                "{} {}: legacy on/off control ({})",
                DEVICE_DESCRIPTION, hardware_id, reason
            );
            Ok(Discovery {
                capability: FanCapability::Legacy,
                status: None,
            })
        }
    }
}

/// Probe the ACPI 4.0 fan objects. The error string says why the device
/// does not qualify.
fn probe_acpi4(gateway: &dyn FirmwareGateway) -> Result<Discovery, String> {
    if !gateway.has_object(FIF) {
        return Err(format!("{} not present", FIF));
    }

    let info = gateway
        .evaluate(FIF, &[])
        .and_then(|reply| parse_fan_info(&reply))
        .map_err(|error| {
            warn!("ignoring fan capability object: {}", error);
            error.to_string()
        })?;
    if info.revision != 0 {
        warn!("unsupported {} revision {}", FIF, info.revision);
        return Err(format!("{} revision {} unsupported", FIF, info.revision));
    }
    debug!("fan info: {:?}", info);

    if !gateway.has_object(FSL) {
        warn!("{} present without {}", FIF, FSL);
        return Err(format!("{} not present", FSL));
    }

    let table = gateway
        .evaluate(FPS, &[])
        .and_then(|reply| parse_performance_table(&reply))
        .map_err(|error| {
            warn!("ignoring performance states: {}", error);
            error.to_string()
        })?;
    debug!("{} usable performance states", table.len());

    let status = gateway
        .evaluate(FST, &[])
        .map_err(FanError::from)
        .and_then(|reply| decode_status(&reply))
        .map_err(|error| {
            warn!("fan status unavailable: {}", error);
            error.to_string()
        })?;

    let capability = if info.fine_grain {
        FanCapability::PercentageControl { info, table }
    } else {
        FanCapability::DiscreteLevelControl { info, table }
    };

    Ok(Discovery {
        capability,
        status: Some(status),
    })
}

/// Decode a `_FIF` reply.
pub fn parse_fan_info(reply: &TypedResult) -> Result<FanInfo, GatewayError> {
    let words = decode_words(FIF, reply, 4)?;
    let info = FanInfo {
        revision: words[0],
        fine_grain: words[1] != 0,
        step_size: words[2],
        low_speed_notify: words[3] != 0,
    };
    if !(1..=9).contains(&info.step_size) {
        return Err(GatewayError::MalformedData(format!(
            "{}: step size {} outside 1-9",
            FIF, info.step_size
        )));
    }
    Ok(info)
}

/// Decode a `_FPS` reply: a revision integer followed by one package of
/// five integers per state. The whole table is rejected if any row is bad.
pub fn parse_performance_table(reply: &TypedResult) -> Result<PerformanceTable, GatewayError> {
    let TypedResult::Package(items) = reply else {
        return Err(GatewayError::MalformedData(format!("{}: expected package", FPS)));
    };
    if items.len() < 2 {
        return Err(GatewayError::MalformedData(format!(
            "{}: {} elements, need revision and at least one state",
            FPS,
            items.len()
        )));
    }

    let revision = match &items[0] {
        TypedResult::Integer(value) => u32::try_from(*value).map_err(|_| {
            GatewayError::MalformedData(format!("{}: revision {:#x} exceeds 32 bits", FPS, value))
        })?,
        _ => {
            return Err(GatewayError::MalformedData(format!(
                "{}: revision is not an integer",
                FPS
            )))
        }
    };

    let states = items[1..]
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let fields = match row {
                TypedResult::Package(_) => decode_words(FPS, row, FPS_FIELDS)?,
                _ => {
                    return Err(GatewayError::MalformedData(format!(
                        "{}: state {} is not a package",
                        FPS, index
                    )))
                }
            };
            Ok(PerformanceState {
                control_value: fields[0],
                trip_point: fields[1],
                rated_speed_rpm: fields[2],
                noise_level: fields[3],
                power_mw: fields[4],
                label: format!("state{}", index),
            })
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;

    let table = PerformanceTable::new(revision, states)
        .ok_or_else(|| GatewayError::MalformedData(format!("{}: no usable states", FPS)))?;
    for state in table.states() {
        debug!("{} {}", FPS, state);
    }
    Ok(table)
}
