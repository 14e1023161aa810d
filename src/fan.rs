use std::fmt;

use serde::Serialize;

/// Fan capability descriptor read from `_FIF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanInfo {
    /// Always zero for the supported layout
    pub revision: u32,
    /// Percentage (0–100) control is available
    pub fine_grain: bool,
    /// Recommended percentage step, 1–9
    pub step_size: u32,
    /// Firmware notifies when the fan drops below its set speed
    pub low_speed_notify: bool,
}

/// One usable row of `_FPS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceState {
    pub control_value: u32,
    pub trip_point: u32,
    pub rated_speed_rpm: u32,
    pub noise_level: u32,
    pub power_mw: u32,
    pub label: String,
}

impl fmt::Display for PerformanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: control {} / {} RPM / {} mW",
            self.label, self.control_value, self.rated_speed_rpm, self.power_mw
        )
    }
}

/// Decoded `_FPS` table.
///
/// Holds only the usable states; the firmware's leading revision element is
/// kept separately. Construction guarantees at least one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceTable {
    revision: u32,
    states: Vec<PerformanceState>,
}

impl PerformanceTable {
    /// Returns `None` for an empty state list.
    pub fn new(revision: u32, states: Vec<PerformanceState>) -> Option<Self> {
        if states.is_empty() {
            None
        } else {
            Some(Self { revision, states })
        }
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn states(&self) -> &[PerformanceState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn find(&self, control_value: u32) -> Option<&PerformanceState> {
        self.states.iter().find(|state| state.control_value == control_value)
    }

    pub fn control_values(&self) -> Vec<u32> {
        self.states.iter().map(|state| state.control_value).collect()
    }
}

/// Last known `_FST` reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanStatus {
    pub revision: u32,
    pub control_value: u32,
    pub current_speed_rpm: u32,
}

impl fmt::Display for FanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "control {} / {} RPM",
            self.control_value, self.current_speed_rpm
        )
    }
}

/// Control mode of a fan, fixed at attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FanCapability {
    /// Binary on/off through device power states only.
    Legacy,
    /// `_FSL` takes a percentage; the table is informational.
    PercentageControl {
        info: FanInfo,
        table: PerformanceTable,
    },
    /// `_FSL` takes one of the table's control values.
    DiscreteLevelControl {
        info: FanInfo,
        table: PerformanceTable,
    },
}

impl FanCapability {
    pub fn info(&self) -> Option<&FanInfo> {
        match self {
            FanCapability::Legacy => None,
            FanCapability::PercentageControl { info, .. }
            | FanCapability::DiscreteLevelControl { info, .. } => Some(info),
        }
    }

    pub fn table(&self) -> Option<&PerformanceTable> {
        match self {
            FanCapability::Legacy => None,
            FanCapability::PercentageControl { table, .. }
            | FanCapability::DiscreteLevelControl { table, .. } => Some(table),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, FanCapability::Legacy)
    }
}

impl fmt::Display for FanCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanCapability::Legacy => write!(f, "legacy (on/off)"),
            FanCapability::PercentageControl { info, .. } => {
                write!(f, "percentage control (step {})", info.step_size)
            }
            FanCapability::DiscreteLevelControl { table, .. } => {
                write!(f, "discrete levels ({} states)", table.len())
            }
        }
    }
}

/// Coarse device power state as tracked by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Off,
    On,
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerState::Off => "off",
            PowerState::On => "on",
            PowerState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
