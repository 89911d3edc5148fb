// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device fleet entity.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a fleet device.
    pub struct DeviceId;
}

/// CPU architecture tag used for arch-constrained device selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Arm,
    Arm64,
    X86,
    X86_64,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
        };
        write!(f, "{s}")
    }
}

/// Health state maintained by the fleet manager's background probe loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Static configuration for one fleet device, registered at daemon start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub adb_target: String,
    pub proxy_host: String,
    pub proxy_port: u16,
    pub mitm_container: String,
    pub mitm_api_port: u16,
    pub instrumentation_host: String,
    pub arch: Arch,
}

/// Runtime state tracked per device by the fleet manager.
///
/// All mutation of this struct happens behind the fleet manager's single
/// mutex; nothing outside `packlab-fleet` ever constructs or
/// mutates it directly.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub config: DeviceConfig,
    pub health: HealthState,
    pub consecutive_health_failures: u32,
    /// Task holding the current lease, if any.
    pub leased_by: Option<crate::task::TaskId>,
    /// Number of completed executions since the device last rested.
    pub executions_since_rest: u32,
    /// Epoch ms after which the device is eligible to be leased again.
    pub resting_until_ms: Option<u64>,
    pub last_health_check_ms: Option<u64>,
}

impl DeviceState {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            health: HealthState::Healthy,
            consecutive_health_failures: 0,
            leased_by: None,
            executions_since_rest: 0,
            resting_until_ms: None,
            last_health_check_ms: None,
        }
    }

    pub fn is_leased(&self) -> bool {
        self.leased_by.is_some()
    }

    pub fn is_resting(&self, now_ms: u64) -> bool {
        self.resting_until_ms.is_some_and(|until| now_ms < until)
    }

    pub fn is_eligible(&self, arch: Option<Arch>, now_ms: u64) -> bool {
        self.health == HealthState::Healthy
            && !self.is_leased()
            && !self.is_resting(now_ms)
            && arch.is_none_or(|a| a == self.config.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(id: &str, arch: Arch) -> DeviceConfig {
        DeviceConfig {
            id: DeviceId::new(id),
            adb_target: "emulator-5554".into(),
            proxy_host: "127.0.0.1".into(),
            proxy_port: 8080,
            mitm_container: "mitm1".into(),
            mitm_api_port: 8081,
            instrumentation_host: "127.0.0.1".into(),
            arch,
        }
    }

    #[test]
    fn fresh_device_is_eligible() {
        let d = DeviceState::new(cfg("d1", Arch::Arm64));
        assert!(d.is_eligible(None, 0));
        assert!(d.is_eligible(Some(Arch::Arm64), 0));
        assert!(!d.is_eligible(Some(Arch::X86), 0));
    }

    #[test]
    fn leased_device_is_not_eligible() {
        let mut d = DeviceState::new(cfg("d1", Arch::Arm64));
        d.leased_by = Some(crate::task::TaskId::new("t1"));
        assert!(!d.is_eligible(None, 0));
    }

    #[test]
    fn resting_device_excluded_until_rest_elapses() {
        let mut d = DeviceState::new(cfg("d1", Arch::Arm64));
        d.resting_until_ms = Some(1_000);
        assert!(d.is_resting(500));
        assert!(!d.is_eligible(None, 500));
        assert!(!d.is_resting(1_000));
        assert!(d.is_eligible(None, 1_000));
    }

    #[test]
    fn unhealthy_device_excluded_regardless_of_lease() {
        let mut d = DeviceState::new(cfg("d1", Arch::Arm64));
        d.health = HealthState::Unhealthy;
        assert!(!d.is_eligible(None, 0));
    }
}
