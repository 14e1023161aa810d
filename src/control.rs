//! Translation of user control requests into `_FSL` writes.

use log::{debug, info, warn};

use crate::config::DevicePolicy;
use crate::device::DeviceState;
use crate::errors::FanError;
use crate::fan::FanCapability;
use crate::firmware::{FirmwareGateway, TypedResult, FSL};

/// A validated control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Legacy fans: switch the device power state.
    Power(bool),
    /// Firmware-native `_FSL` argument.
    Level(u32),
}

/// Human-readable valid domain for `capability`.
pub fn domain(capability: &FanCapability) -> String {
    match capability {
        FanCapability::Legacy => "0 or 1".to_string(),
        FanCapability::PercentageControl { .. } => "0-100".to_string(),
        FanCapability::DiscreteLevelControl { table, .. } => {
            let values: Vec<String> = table
                .control_values()
                .iter()
                .map(|value| value.to_string())
                .collect();
            format!("one of {}", values.join(", "))
        }
    }
}

/// Check `requested` against the mode's domain without touching firmware.
pub fn validate(capability: &FanCapability, requested: i64) -> Result<ControlRequest, FanError> {
    let accepted = match capability {
        FanCapability::Legacy => match requested {
            0 => Some(ControlRequest::Power(false)),
            1 => Some(ControlRequest::Power(true)),
            _ => None,
        },
        FanCapability::PercentageControl { .. } => u32::try_from(requested)
            .ok()
            .filter(|percent| *percent <= 100)
            .map(ControlRequest::Level),
        FanCapability::DiscreteLevelControl { table, .. } => u32::try_from(requested)
            .ok()
            .and_then(|value| table.find(value))
            .map(|state| ControlRequest::Level(state.control_value)),
    };

    accepted.ok_or_else(|| FanError::OutOfRange {
        value: requested,
        domain: domain(capability),
    })
}

/// Applies control requests for one device. Borrowed for the duration of a
/// locked operation.
pub struct Translator<'a> {
    pub gateway: &'a dyn FirmwareGateway,
    pub capability: &'a FanCapability,
    pub policy: &'a DevicePolicy,
}

impl Translator<'_> {
    /// Validate and apply `requested`. Returns the applied value.
    pub fn set_control(&self, state: &mut DeviceState, requested: i64) -> Result<u32, FanError> {
        match validate(self.capability, requested)? {
            ControlRequest::Power(on) => {
                state.power.set_power(self.gateway, on)?;
                Ok(u32::from(on))
            }
            ControlRequest::Level(value) => {
                let powered_here = !state.power.is_on();
                if powered_here {
                    if !self.policy.implicit_power_on {
                        return Err(FanError::PoweredOff);
                    }
                    debug!("powering fan on before setting level {}", value);
                    state.power.set_power(self.gateway, true)?;
                }
                if let Err(error) = self.write_level(state, value) {
                    // Undo the implicit power-on; a failed rollback leaves Unknown.
                    if powered_here {
                        if let Err(rollback) = state.power.set_power(self.gateway, false) {
                            warn!("could not turn fan back off: {}", rollback);
                        }
                    }
                    return Err(error);
                }
                info!("fan level set to {}", value);
                Ok(value)
            }
        }
    }

    /// Write the last requested (or last known) level again after the fan
    /// lost it, e.g. across suspend. Returns the value written, if any.
    pub fn reapply(&self, state: &mut DeviceState) -> Result<Option<u32>, FanError> {
        if self.capability.is_legacy() {
            return Ok(None);
        }
        let value = match state.last_applied {
            Some(value) => value,
            None if state.cache.is_populated() => state.cache.read_cached().control_value,
            None => return Ok(None),
        };
        self.write_level(state, value)?;
        debug!("reapplied fan level {}", value);
        Ok(Some(value))
    }

    fn write_level(&self, state: &mut DeviceState, value: u32) -> Result<(), FanError> {
        self.gateway
            .evaluate(FSL, &[TypedResult::Integer(u64::from(value))])
            .map_err(|error| {
                warn!("setting fan level {} failed: {}", value, error);
                FanError::from(error)
            })?;
        state.cache.record_control(value);
        state.last_applied = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::parse_performance_table;
    use crate::fan::{FanInfo, PerformanceTable};
    use crate::firmware::MockFirmwareGateway;
    use proptest::prelude::*;

    fn info(fine_grain: bool) -> FanInfo {
        FanInfo {
            revision: 0,
            fine_grain,
            step_size: 1,
            low_speed_notify: false,
        }
    }

    fn table() -> PerformanceTable {
        let row = |values: [u64; 5]| {
            TypedResult::Package(values.iter().map(|v| TypedResult::Integer(*v)).collect())
        };
        parse_performance_table(&TypedResult::Package(vec![
            TypedResult::Integer(0),
            row([50, 0, 3000, 30, 1500]),
            row([100, 0, 6000, 45, 4000]),
        ]))
        .unwrap()
    }

    fn percentage() -> FanCapability {
        FanCapability::PercentageControl {
            info: info(true),
            table: table(),
        }
    }

    fn discrete() -> FanCapability {
        FanCapability::DiscreteLevelControl {
            info: info(false),
            table: table(),
        }
    }

    #[test]
    fn legacy_accepts_only_zero_and_one() {
        let legacy = FanCapability::Legacy;
        assert_eq!(validate(&legacy, 0).unwrap(), ControlRequest::Power(false));
        assert_eq!(validate(&legacy, 1).unwrap(), ControlRequest::Power(true));
        assert!(matches!(
            validate(&legacy, 2),
            Err(FanError::OutOfRange { value: 2, .. })
        ));
    }

    #[test]
    fn discrete_accepts_only_table_values() {
        let capability = discrete();
        assert_eq!(validate(&capability, 100).unwrap(), ControlRequest::Level(100));
        assert!(matches!(
            validate(&capability, 75),
            Err(FanError::OutOfRange { value: 75, ref domain }) if domain == "one of 50, 100"
        ));
        assert!(validate(&capability, -50).is_err());
        assert!(validate(&capability, i64::from(u32::MAX) + 50).is_err());
    }

    #[test]
    fn percentage_bounds_are_inclusive() {
        let capability = percentage();
        assert_eq!(validate(&capability, 0).unwrap(), ControlRequest::Level(0));
        assert_eq!(validate(&capability, 100).unwrap(), ControlRequest::Level(100));
        assert!(validate(&capability, 101).is_err());
        assert!(validate(&capability, -1).is_err());
    }

    #[test]
    fn rejected_request_never_reaches_firmware() {
        let mut gateway = MockFirmwareGateway::new();
        gateway.expect_evaluate().times(0);
        gateway.expect_has_object().times(0);

        let capability = percentage();
        let policy = DevicePolicy::default();
        let translator = Translator {
            gateway: &gateway,
            capability: &capability,
            policy: &policy,
        };
        let mut state = DeviceState::default();
        let result = translator.set_control(&mut state, 250);
        assert!(matches!(result, Err(FanError::OutOfRange { .. })));
        assert_eq!(state.last_applied, None);
        assert!(!state.cache.is_populated());
    }

    #[test]
    fn level_write_passes_control_value_to_fsl() {
        let mut gateway = MockFirmwareGateway::new();
        gateway
            .expect_evaluate()
            .withf(|name, args| name == FSL && args == [TypedResult::Integer(50)])
            .times(1)
            .returning(|_, _| Ok(TypedResult::Integer(0)));

        let capability = discrete();
        let policy = DevicePolicy::default();
        let translator = Translator {
            gateway: &gateway,
            capability: &capability,
            policy: &policy,
        };
        let mut state = DeviceState::default();
        assert_eq!(translator.set_control(&mut state, 50).unwrap(), 50);
        assert_eq!(state.last_applied, Some(50));
        assert_eq!(state.cache.read_cached().control_value, 50);
    }

    #[test]
    fn legacy_defers_to_power_controller() {
        let mut gateway = MockFirmwareGateway::new();
        gateway
            .expect_evaluate()
            .withf(|name, _| name == crate::firmware::PS3)
            .times(1)
            .returning(|_, _| Ok(TypedResult::Integer(0)));

        let capability = FanCapability::Legacy;
        let policy = DevicePolicy::default();
        let translator = Translator {
            gateway: &gateway,
            capability: &capability,
            policy: &policy,
        };
        let mut state = DeviceState::default();
        assert_eq!(translator.set_control(&mut state, 0).unwrap(), 0);
        assert!(!state.power.is_on());
    }

    #[test]
    fn failed_level_write_with_failed_rollback_leaves_power_unknown() {
        use crate::fan::PowerState;
        use crate::firmware::{GatewayError, PS0, PS3};
        use mockall::Sequence;

        let failure = |name: &str| GatewayError::Evaluation {
            object: name.to_string(),
            diagnostic: "AE_ERROR".to_string(),
        };
        let mut gateway = MockFirmwareGateway::new();
        let mut seq = Sequence::new();
        gateway
            .expect_evaluate()
            .withf(|name, _| name == PS3)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(TypedResult::Integer(0)));
        gateway
            .expect_evaluate()
            .withf(|name, _| name == PS0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(TypedResult::Integer(0)));
        gateway
            .expect_evaluate()
            .withf(|name, _| name == FSL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |name, _| Err(failure(name)));
        gateway
            .expect_evaluate()
            .withf(|name, _| name == PS3)
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |name, _| Err(failure(name)));

        let capability = discrete();
        let policy = DevicePolicy::default();
        let translator = Translator {
            gateway: &gateway,
            capability: &capability,
            policy: &policy,
        };
        let mut state = DeviceState::default();
        state.power.set_power(&gateway, false).unwrap();

        let result = translator.set_control(&mut state, 100);
        assert!(matches!(result, Err(FanError::Firmware(_))));
        assert_eq!(state.power.state(), PowerState::Unknown);
        assert_eq!(state.last_applied, None);
        assert!(!state.cache.is_populated());
    }

    proptest! {
        #[test]
        fn percentage_domain_is_zero_to_hundred(requested in -1_000i64..1_000) {
            let result = validate(&percentage(), requested);
            if (0..=100).contains(&requested) {
                prop_assert_eq!(result.unwrap(), ControlRequest::Level(requested as u32));
            } else {
                let rejected = matches!(result, Err(FanError::OutOfRange { .. }));
                prop_assert!(rejected);
            }
        }
    }
}
