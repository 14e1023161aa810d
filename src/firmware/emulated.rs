//! Firmware gateway backed by a JSON description of a fan's ACPI scope.
//!
//! The emulator answers `_FIF`/`_FPS` with the values from the fixture and
//! models `_FSL`, `_FST`, `_PS0`, `_PS3` and `_PSC` as a small state machine:
//! level writes are echoed back through `_FST`, and the reported speed is the
//! rated speed of the matching `_FPS` row (or a proportional share of the
//! fastest row for percentage writes). A powered-off fan reports 0 RPM.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;
use serde::Deserialize;

use super::{FirmwareGateway, GatewayError, TypedResult, FIF, FPS, FSL, FST, PS0, PS3, PSC};

/// JSON form of a firmware value.
///
/// Numbers are integers, arrays are packages, `{"buffer": [..]}` is a raw
/// byte buffer.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FixtureValue {
    Integer(u64),
    Package(Vec<FixtureValue>),
    Buffer { buffer: Vec<u8> },
}

impl From<&FixtureValue> for TypedResult {
    fn from(value: &FixtureValue) -> Self {
        match value {
            FixtureValue::Integer(integer) => TypedResult::Integer(*integer),
            FixtureValue::Package(items) => {
                TypedResult::Package(items.iter().map(TypedResult::from).collect())
            }
            FixtureValue::Buffer { buffer } => TypedResult::Buffer(buffer.clone()),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Description of one fan device scope.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceFixture {
    /// `_HID` of the device, e.g. `"PNP0C0B"`.
    pub hardware_id: String,
    /// `_FIF` reply; the object is absent when omitted.
    #[serde(default)]
    pub fif: Option<FixtureValue>,
    /// `_FPS` reply; the object is absent when omitted.
    #[serde(default)]
    pub fps: Option<FixtureValue>,
    #[serde(default = "default_true")]
    pub fsl: bool,
    #[serde(default = "default_true")]
    pub fst: bool,
    /// `_PS0` and `_PS3`.
    #[serde(default = "default_true")]
    pub power_objects: bool,
    #[serde(default = "default_true")]
    pub psc: bool,
    /// Control value the firmware starts with.
    #[serde(default)]
    pub initial_control: u32,
    /// Objects whose evaluation always fails.
    #[serde(default)]
    pub failing: Vec<String>,
}

impl NamespaceFixture {
    /// A bare legacy fan: power objects only.
    #[cfg(test)]
    pub fn legacy(hardware_id: &str) -> Self {
        Self {
            hardware_id: hardware_id.to_string(),
            fif: None,
            fps: None,
            fsl: false,
            fst: false,
            power_objects: true,
            psc: true,
            initial_control: 0,
            failing: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct EmulatedState {
    fixture: NamespaceFixture,
    control: u32,
    powered: bool,
    failing: HashSet<String>,
    overrides: HashMap<String, TypedResult>,
    evaluations: HashMap<String, usize>,
}

impl EmulatedState {
    fn present(&self, name: &str) -> bool {
        match name {
            FIF => self.fixture.fif.is_some(),
            FPS => self.fixture.fps.is_some(),
            FSL => self.fixture.fsl,
            FST => self.fixture.fst,
            PS0 | PS3 => self.fixture.power_objects,
            PSC => self.fixture.psc,
            _ => false,
        }
    }

    /// Rated speeds of all well-formed `_FPS` rows as `(control, rpm)`.
    fn rated_speeds(&self) -> Vec<(u64, u64)> {
        let Some(FixtureValue::Package(rows)) = &self.fixture.fps else {
            return Vec::new();
        };
        rows.iter()
            .skip(1)
            .filter_map(|row| match row {
                FixtureValue::Package(fields) => match (fields.first(), fields.get(2)) {
                    (Some(FixtureValue::Integer(control)), Some(FixtureValue::Integer(rpm))) => {
                        Some((*control, *rpm))
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    fn current_speed(&self) -> u64 {
        if !self.powered {
            return 0;
        }
        let speeds = self.rated_speeds();
        let control = u64::from(self.control);
        if let Some((_, rpm)) = speeds.iter().find(|(value, _)| *value == control) {
            return *rpm;
        }
        let max_rpm = speeds.iter().map(|(_, rpm)| *rpm).max().unwrap_or(0);
        max_rpm * control.min(100) / 100
    }

    fn status(&self) -> TypedResult {
        TypedResult::Package(vec![
            TypedResult::Integer(0),
            TypedResult::Integer(u64::from(self.control)),
            TypedResult::Integer(self.current_speed()),
        ])
    }
}

/// Shared handle to an emulated fan scope. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct EmulatedNamespace {
    state: Arc<Mutex<EmulatedState>>,
}

impl EmulatedNamespace {
    pub fn new(fixture: NamespaceFixture) -> Self {
        let failing = fixture.failing.iter().cloned().collect();
        let control = fixture.initial_control;
        Self {
            state: Arc::new(Mutex::new(EmulatedState {
                fixture,
                control,
                powered: true,
                failing,
                overrides: HashMap::new(),
                evaluations: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every evaluation of `object` fail until [`Self::recover`].
    #[cfg(test)]
    pub fn fail(&self, object: &str) {
        self.lock().failing.insert(object.to_string());
    }

    #[cfg(test)]
    pub fn recover(&self, object: &str) {
        self.lock().failing.remove(object);
    }

    /// Answer `object` with a fixed reply instead of the modelled one.
    #[cfg(test)]
    pub fn override_reply(&self, object: &str, reply: TypedResult) {
        self.lock().overrides.insert(object.to_string(), reply);
    }

    #[cfg(test)]
    pub fn control(&self) -> u32 {
        self.lock().control
    }

    #[cfg(test)]
    pub fn powered(&self) -> bool {
        self.lock().powered
    }

    /// Firmware-side power change that bypasses the driver.
    #[cfg(test)]
    pub fn set_powered(&self, powered: bool) {
        self.lock().powered = powered;
    }

    #[cfg(test)]
    pub fn evaluations(&self, object: &str) -> usize {
        self.lock().evaluations.get(object).copied().unwrap_or(0)
    }
}

impl FirmwareGateway for EmulatedNamespace {
    fn hardware_id(&self) -> String {
        self.lock().fixture.hardware_id.clone()
    }

    fn has_object(&self, name: &str) -> bool {
        self.lock().present(name)
    }

    fn evaluate(&self, name: &str, args: &[TypedResult]) -> Result<TypedResult, GatewayError> {
        let mut state = self.lock();
        let rendered: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        trace!("emulated evaluate {}({})", name, rendered.join(", "));

        if !state.present(name) {
            return Err(GatewayError::NotFound(name.to_string()));
        }
        *state.evaluations.entry(name.to_string()).or_insert(0) += 1;

        if state.failing.contains(name) {
            return Err(GatewayError::Evaluation {
                object: name.to_string(),
                diagnostic: "AE_ERROR".to_string(),
            });
        }
        if let Some(reply) = state.overrides.get(name) {
            return Ok(reply.clone());
        }

        match name {
            FIF => Ok(state.fixture.fif.as_ref().map(TypedResult::from).unwrap_or(TypedResult::Integer(0))),
            FPS => Ok(state.fixture.fps.as_ref().map(TypedResult::from).unwrap_or(TypedResult::Integer(0))),
            FST => Ok(state.status()),
            FSL => match args {
                [TypedResult::Integer(value)] => {
                    state.control = u32::try_from(*value).map_err(|_| GatewayError::Evaluation {
                        object: name.to_string(),
                        diagnostic: "AE_AML_NUMERIC_OVERFLOW".to_string(),
                    })?;
                    Ok(TypedResult::Integer(0))
                }
                _ => Err(GatewayError::Evaluation {
                    object: name.to_string(),
                    diagnostic: "AE_AML_UNINITIALIZED_ARG".to_string(),
                }),
            },
            PS0 => {
                state.powered = true;
                Ok(TypedResult::Integer(0))
            }
            PS3 => {
                state.powered = false;
                Ok(TypedResult::Integer(0))
            }
            PSC => Ok(TypedResult::Integer(if state.powered { 0 } else { 3 })),
            _ => Err(GatewayError::NotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrete_fixture() -> NamespaceFixture {
        serde_json::from_str(
            r#"{
                "hardware_id": "PNP0C0B",
                "fif": [0, 0, 1, 0],
                "fps": [0, [50, 0, 3000, 30, 1500], [100, 0, 6000, 45, 4000]]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn fixture_defaults_enable_control_objects() {
        let namespace = EmulatedNamespace::new(discrete_fixture());
        for object in [FIF, FPS, FSL, FST, PS0, PS3, PSC] {
            assert!(namespace.has_object(object), "{} missing", object);
        }
        assert!(!namespace.has_object("_BIF"));
    }

    #[test]
    fn buffer_values_parse_from_json() {
        let fixture: NamespaceFixture = serde_json::from_str(
            r#"{ "hardware_id": "INT3404", "fif": { "buffer": [0, 0, 0, 0] } }"#,
        )
        .unwrap();
        let namespace = EmulatedNamespace::new(fixture);
        assert_eq!(namespace.evaluate(FIF, &[]).unwrap(), TypedResult::Buffer(vec![0; 4]));
    }

    #[test]
    fn unknown_fixture_field_is_rejected() {
        let result: Result<NamespaceFixture, _> =
            serde_json::from_str(r#"{ "hardware_id": "PNP0C0B", "fans": 2 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn level_write_is_echoed_with_rated_speed() {
        let namespace = EmulatedNamespace::new(discrete_fixture());
        namespace.evaluate(FSL, &[TypedResult::Integer(100)]).unwrap();
        let status = namespace.evaluate(FST, &[]).unwrap();
        assert_eq!(
            status,
            TypedResult::Package(vec![
                TypedResult::Integer(0),
                TypedResult::Integer(100),
                TypedResult::Integer(6000),
            ])
        );
    }

    #[test]
    fn percentage_speed_scales_fastest_row() {
        let namespace = EmulatedNamespace::new(discrete_fixture());
        namespace.evaluate(FSL, &[TypedResult::Integer(25)]).unwrap();
        let status = namespace.evaluate(FST, &[]).unwrap();
        assert_eq!(
            status,
            TypedResult::Package(vec![
                TypedResult::Integer(0),
                TypedResult::Integer(25),
                TypedResult::Integer(1500),
            ])
        );
    }

    #[test]
    fn powered_off_fan_reports_zero_rpm() {
        let namespace = EmulatedNamespace::new(discrete_fixture());
        namespace.evaluate(FSL, &[TypedResult::Integer(50)]).unwrap();
        namespace.evaluate(PS3, &[]).unwrap();
        assert_eq!(namespace.evaluate(PSC, &[]).unwrap(), TypedResult::Integer(3));
        let status = namespace.evaluate(FST, &[]).unwrap();
        assert_eq!(
            status,
            TypedResult::Package(vec![
                TypedResult::Integer(0),
                TypedResult::Integer(50),
                TypedResult::Integer(0),
            ])
        );
    }

    #[test]
    fn failing_object_reports_diagnostic() {
        let mut fixture = discrete_fixture();
        fixture.failing.push(FST.to_string());
        let namespace = EmulatedNamespace::new(fixture);
        let result = namespace.evaluate(FST, &[]);
        assert!(matches!(result, Err(GatewayError::Evaluation { ref diagnostic, .. }) if diagnostic == "AE_ERROR"));
    }

    #[test]
    fn missing_object_is_not_found() {
        let namespace = EmulatedNamespace::new(NamespaceFixture::legacy("PNP0C0B"));
        let result = namespace.evaluate(FST, &[]);
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }

    #[test]
    fn level_write_without_argument_fails() {
        let namespace = EmulatedNamespace::new(discrete_fixture());
        let result = namespace.evaluate(FSL, &[]);
        assert!(matches!(result, Err(GatewayError::Evaluation { .. })));
    }
}
