//! Attached fan device.
//!
//! [`DeviceContext`] owns the capability found at attach and the mutable
//! driver state. Every operation that touches the state or the firmware runs
//! under the per-device lock, so control writes, power transitions, status
//! refreshes and suspend/resume never interleave.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::config::DevicePolicy;
use crate::control::Translator;
use crate::discovery::discover;
use crate::errors::FanError;
use crate::fan::{FanCapability, FanStatus, PowerState};
use crate::firmware::FirmwareGateway;
use crate::power::{PowerController, Resumed};
use crate::status::StatusCache;

/// Mutable per-device state, guarded by the device lock.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub cache: StatusCache,
    pub power: PowerController,
    /// Last control value the firmware accepted, reapplied on resume.
    pub last_applied: Option<u32>,
}

pub struct DeviceContext {
    gateway: Box<dyn FirmwareGateway>,
    capability: FanCapability,
    policy: DevicePolicy,
    state: Mutex<DeviceState>,
}

impl DeviceContext {
    /// Discover the device's capability and take ownership of the gateway.
    pub fn attach(gateway: Box<dyn FirmwareGateway>, policy: DevicePolicy) -> Result<Self, FanError> {
        if policy.disabled {
            info!("fan {} disabled by policy", gateway.hardware_id());
            return Err(FanError::Unsupported("fan control disabled".to_string()));
        }
        let discovery = discover(gateway.as_ref())?;
        let state = DeviceState {
            cache: StatusCache::seeded(discovery.status),
            ..DeviceState::default()
        };
        Ok(Self {
            gateway,
            capability: discovery.capability,
            policy,
            state: Mutex::new(state),
        })
    }

    pub fn capability(&self) -> &FanCapability {
        &self.capability
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn translator(&self) -> Translator<'_> {
        Translator {
            gateway: self.gateway.as_ref(),
            capability: &self.capability,
            policy: &self.policy,
        }
    }

    /// Set the fan's level, percentage or (legacy) on/off state.
    pub fn set_control(&self, requested: i64) -> Result<u32, FanError> {
        let mut state = self.lock();
        self.translator().set_control(&mut state, requested)
    }

    /// Re-read the fan status from firmware.
    pub fn refresh(&self) -> Result<FanStatus, FanError> {
        if self.capability.is_legacy() {
            return Err(FanError::Unsupported(
                "legacy fans report no status".to_string(),
            ));
        }
        let mut state = self.lock();
        state.cache.refresh(self.gateway.as_ref())
    }

    /// Last known status without a firmware round trip.
    pub fn read_cached(&self) -> FanStatus {
        self.lock().cache.read_cached()
    }

    pub fn set_power(&self, on: bool) -> Result<(), FanError> {
        let mut state = self.lock();
        state.power.set_power(self.gateway.as_ref(), on)
    }

    /// Power state as tracked by the driver.
    pub fn power_state(&self) -> PowerState {
        self.lock().power.state()
    }

    /// Power state as reported by the firmware, if it can report one.
    pub fn probe_power(&self) -> Result<PowerState, FanError> {
        let mut state = self.lock();
        state.power.probe(self.gateway.as_ref())
    }

    pub fn suspend(&self) -> Result<(), FanError> {
        let mut state = self.lock();
        state.power.suspend(self.gateway.as_ref())?;
        info!("fan suspended");
        Ok(())
    }

    /// Restore power and, after a suspend, the last level of a
    /// level-controlled fan.
    pub fn resume(&self) -> Result<(), FanError> {
        let mut state = self.lock();
        match state.power.resume(self.gateway.as_ref())? {
            Resumed::PoweredOn => {}
            Resumed::LeftOff => {
                info!("fan resumed (left off)");
                return Ok(());
            }
            Resumed::NotSuspended => {
                debug!("resume without suspend, fan powered on");
                return Ok(());
            }
        }
        match self.translator().reapply(&mut state) {
            Ok(Some(value)) => info!("fan resumed at level {}", value),
            Ok(None) => info!("fan resumed"),
            Err(error) => {
                warn!("fan resumed without its previous level: {}", error);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Release the device. Consuming the context guarantees no other
    /// operation is in flight.
    pub fn detach(self) {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        info!(
            "fan detached ({}, power {}, last status {})",
            self.capability,
            state.power.state(),
            state.cache.read_cached()
        );
    }
}
