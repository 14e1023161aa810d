use log::{debug, warn};

use crate::errors::FanError;
use crate::fan::FanStatus;
use crate::firmware::{decode_words, FirmwareGateway, TypedResult, FST};

/// Decode a `_FST` reply (revision, control, speed).
pub fn decode_status(reply: &TypedResult) -> Result<FanStatus, FanError> {
    let words = decode_words(FST, reply, 3)?;
    Ok(FanStatus {
        revision: words[0],
        control_value: words[1],
        current_speed_rpm: words[2],
    })
}

/// Last successfully read fan status.
///
/// Only replaced as a whole; a failed or malformed refresh keeps the
/// previous value.
#[derive(Debug, Default)]
pub struct StatusCache {
    last: Option<FanStatus>,
}

impl StatusCache {
    pub fn seeded(status: Option<FanStatus>) -> Self {
        Self { last: status }
    }

    /// Re-read `_FST` and replace the cached value on success.
    pub fn refresh(&mut self, gateway: &dyn FirmwareGateway) -> Result<FanStatus, FanError> {
        let reply = gateway.evaluate(FST, &[]).map_err(|error| {
            warn!("reading fan status failed: {}", error);
            FanError::from(error)
        })?;
        let status = decode_status(&reply)?;
        debug!("fan status: {}", status);
        self.last = Some(status);
        Ok(status)
    }

    /// Cached status, or all zeroes if nothing was ever read.
    pub fn read_cached(&self) -> FanStatus {
        self.last.unwrap_or_default()
    }

    pub fn is_populated(&self) -> bool {
        self.last.is_some()
    }

    /// Record a control value the firmware accepted without re-reading `_FST`.
    pub fn record_control(&mut self, control_value: u32) {
        let status = self.last.get_or_insert_with(FanStatus::default);
        status.control_value = control_value;
    }
}
