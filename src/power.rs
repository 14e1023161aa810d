//! Device power state tracking (`_PS0` / `_PS3` / `_PSC`).
//!
//! The controller assumes a freshly enumerated fan is on. A failed
//! transition leaves the state [`PowerState::Unknown`] until a later
//! successful transition or probe.

use log::{debug, info, warn};

use crate::errors::FanError;
use crate::fan::PowerState;
use crate::firmware::{decode_integer, FirmwareGateway, PS0, PS3, PSC};

#[derive(Debug)]
pub struct PowerController {
    state: PowerState,
    resume_target: Option<PowerState>,
}

impl Default for PowerController {
    fn default() -> Self {
        Self {
            state: PowerState::On,
            resume_target: None,
        }
    }
}

impl PowerController {
    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state == PowerState::On
    }

    pub fn set_power(&mut self, gateway: &dyn FirmwareGateway, on: bool) -> Result<(), FanError> {
        let target = if on { PowerState::On } else { PowerState::Off };
        if self.state == target {
            debug!("fan already {}", target);
            return Ok(());
        }

        let object = if on { PS0 } else { PS3 };
        match gateway.evaluate(object, &[]) {
            Ok(_) => {
                info!("fan turned {}", target);
                self.state = target;
                Ok(())
            }
            Err(error) => {
                warn!("turning fan {}: failed -- {}", target, error);
                self.state = PowerState::Unknown;
                Err(FanError::from(error))
            }
        }
    }

    /// Ask the firmware for the current power state.
    ///
    /// Without `_PSC` the tracked state is returned unchanged.
    pub fn probe(&mut self, gateway: &dyn FirmwareGateway) -> Result<PowerState, FanError> {
        if !gateway.has_object(PSC) {
            return Ok(self.state);
        }
        let reply = gateway.evaluate(PSC, &[])?;
        self.state = match decode_integer(PSC, &reply)? {
            0 => PowerState::On,
            3 => PowerState::Off,
            other => {
                debug!("{} reported D{}", PSC, other);
                PowerState::Unknown
            }
        };
        Ok(self.state)
    }

    /// Remember the current state and turn the fan off.
    ///
    /// A repeated suspend keeps the state remembered by the first one.
    pub fn suspend(&mut self, gateway: &dyn FirmwareGateway) -> Result<(), FanError> {
        if self.resume_target.is_none() {
            self.resume_target = Some(self.state);
        }
        self.set_power(gateway, false)
    }

    /// Restore power after [`Self::suspend`]. Without a pending suspend
    /// this is a plain power-on.
    pub fn resume(&mut self, gateway: &dyn FirmwareGateway) -> Result<Resumed, FanError> {
        let Some(target) = self.resume_target else {
            self.set_power(gateway, true)?;
            return Ok(Resumed::NotSuspended);
        };
        if target == PowerState::Off {
            self.resume_target = None;
            return Ok(Resumed::LeftOff);
        }
        self.set_power(gateway, true)?;
        self.resume_target = None;
        Ok(Resumed::PoweredOn)
    }
}

/// Outcome of [`PowerController::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumed {
    /// No suspend was pending; the fan was only powered on.
    NotSuspended,
    /// The fan was off before suspend and stays off.
    LeftOff,
    PoweredOn,
}
