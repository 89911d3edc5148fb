// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Device Fleet Manager: a fixed set of devices leased
//! under mutual exclusion, with health probing and a per-device rest policy.
//! Device state lives behind one mutex; `acquire`/`release`/health-check
//! writes are the only mutators.

use packlab_adapters::DeviceTransport;
use packlab_core::{Arch, Clock, DeviceConfig, DeviceId, DeviceState, HealthState, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::{FleetError, Result};

/// Constraint on which device `acquire` may hand out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Constraint {
    pub arch: Option<Arch>,
}

/// After every N completed executions a device rests for D.
#[derive(Debug, Clone, Copy)]
pub struct RestPolicy {
    pub every_n_executions: u32,
    pub rest_duration_ms: u64,
}

impl Default for RestPolicy {
    fn default() -> Self {
        Self {
            every_n_executions: 10,
            rest_duration_ms: 30_000,
        }
    }
}

/// Consecutive-probe thresholds before flipping health state. The same K is
/// used for both the healthy->unhealthy transition and the recovery back.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub consecutive_failure_threshold: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            consecutive_failure_threshold: 3,
        }
    }
}

/// Whether the orchestrator's use of the device succeeded, informing rest
/// bookkeeping on `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// An exclusive, scoped acquisition of a device. Does not implement
/// `Drop`-based auto-release: orchestration code must call `release` on
/// every exit path, since a resource this scarce needs an explicit outcome
/// (success vs. failure) recorded, not just "it went out of scope".
#[derive(Debug, Clone)]
pub struct Lease {
    pub device_id: DeviceId,
    pub task_id: TaskId,
}

pub struct FleetManager<C: Clock> {
    devices: Mutex<HashMap<DeviceId, DeviceState>>,
    transport: Arc<dyn DeviceTransport>,
    clock: C,
    rest_policy: RestPolicy,
    health_policy: HealthPolicy,
    released: Notify,
}

impl<C: Clock> FleetManager<C> {
    pub fn new(
        devices: Vec<DeviceConfig>,
        transport: Arc<dyn DeviceTransport>,
        clock: C,
        rest_policy: RestPolicy,
        health_policy: HealthPolicy,
    ) -> Self {
        let devices = devices
            .into_iter()
            .map(|cfg| (cfg.id.clone(), DeviceState::new(cfg)))
            .collect();
        Self {
            devices: Mutex::new(devices),
            transport,
            clock,
            rest_policy,
            health_policy,
            released: Notify::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn list(&self) -> Vec<DeviceState> {
        self.devices.lock().values().cloned().collect()
    }

    /// Acquires a device matching `constraint`, waiting up to `timeout`.
    /// Fails fast with [`FleetError::ArmDeviceOnly`] if no device in the
    /// fleet could ever satisfy the constraint.
    pub async fn acquire(
        &self,
        task_id: &TaskId,
        constraint: Constraint,
        timeout: Duration,
    ) -> Result<Lease> {
        if let Some(arch) = constraint.arch {
            let any_match = self
                .devices
                .lock()
                .values()
                .any(|d| d.config.arch == arch);
            if !any_match {
                return Err(FleetError::ArmDeviceOnly);
            }
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(device_id) = self.try_select(constraint, task_id) {
                return Ok(Lease {
                    device_id,
                    task_id: task_id.clone(),
                });
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(FleetError::DeviceTimeout);
            }
            let remaining = deadline - now;
            let _ = tokio::time::timeout(remaining, self.released.notified()).await;
        }
    }

    /// Selects an eligible device and marks it leased in the same critical
    /// section, so two concurrent `acquire` calls can never both select the
    /// same device.
    fn try_select(&self, constraint: Constraint, task_id: &TaskId) -> Option<DeviceId> {
        let now_ms = self.clock.epoch_ms();
        let mut devices = self.devices.lock();
        let winner = devices
            .values()
            .filter(|d| d.is_eligible(constraint.arch, now_ms))
            .min_by_key(|d| d.executions_since_rest)
            .map(|d| d.config.id.clone())?;
        if let Some(d) = devices.get_mut(&winner) {
            d.leased_by = Some(task_id.clone());
        }
        Some(winner)
    }

    /// Releases a lease, applying the rest policy on success and restoring
    /// availability either way.
    pub fn release(&self, lease: Lease, outcome: Outcome) {
        let now_ms = self.clock.epoch_ms();
        let mut devices = self.devices.lock();
        let Some(device) = devices.get_mut(&lease.device_id) else {
            return;
        };
        device.leased_by = None;
        if outcome == Outcome::Success {
            device.executions_since_rest += 1;
            if device.executions_since_rest >= self.rest_policy.every_n_executions {
                device.executions_since_rest = 0;
                device.resting_until_ms = Some(now_ms + self.rest_policy.rest_duration_ms);
            }
        }
        drop(devices);
        self.released.notify_waiters();
    }

    /// Runs a probe-all pass once. Exposed separately from
    /// [`Self::start_health_check`] so tests can drive it deterministically.
    pub async fn probe_once(&self) {
        let configs: Vec<DeviceConfig> = self
            .devices
            .lock()
            .values()
            .map(|d| d.config.clone())
            .collect();
        for config in configs {
            let now_ms = self.clock.epoch_ms();
            let outcome = self.transport.probe(&config).await;
            let mut devices = self.devices.lock();
            let Some(device) = devices.get_mut(&config.id) else {
                continue;
            };
            device.last_health_check_ms = Some(now_ms);
            match outcome {
                Ok(()) => {
                    device.consecutive_health_failures = 0;
                    device.health = HealthState::Healthy;
                }
                Err(err) => {
                    device.consecutive_health_failures += 1;
                    tracing::warn!(
                        device_id = %config.id.as_str(),
                        error = %err,
                        consecutive_failures = device.consecutive_health_failures,
                        "device health probe failed"
                    );
                    if device.consecutive_health_failures
                        >= self.health_policy.consecutive_failure_threshold
                    {
                        device.health = HealthState::Unhealthy;
                    }
                }
            }
        }
    }
}

impl<C: Clock + Send + Sync + 'static> FleetManager<C> {
    /// Spawns the background health-check loop; returns its handle so the
    /// daemon can abort it on shutdown.
    pub fn start_health_check(
        self: Arc<Self>,
        interval: Duration,
        cancel: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.probe_once().await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packlab_adapters::FakeDeviceTransport;
    use packlab_core::{Arch, DeviceId, FakeClock, TaskId};

    fn device(id: &str, arch: Arch) -> DeviceConfig {
        DeviceConfig {
            id: DeviceId::new(id),
            adb_target: format!("{id}-target"),
            proxy_host: "127.0.0.1".into(),
            proxy_port: 8080,
            mitm_container: format!("{id}-mitm"),
            mitm_api_port: 8081,
            instrumentation_host: "127.0.0.1".into(),
            arch,
        }
    }

    fn manager(devices: Vec<DeviceConfig>) -> FleetManager<FakeClock> {
        FleetManager::new(
            devices,
            Arc::new(FakeDeviceTransport::default()),
            FakeClock::new(0),
            RestPolicy::default(),
            HealthPolicy::default(),
        )
    }

    #[tokio::test]
    async fn acquire_then_release_round_trips() {
        let fleet = manager(vec![device("d1", Arch::Arm64)]);
        let task = TaskId::new("t1");
        let lease = fleet
            .acquire(&task, Constraint::default(), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(fleet.list()[0].leased_by, Some(task.clone()));
        fleet.release(lease, Outcome::Success);
        assert_eq!(fleet.list()[0].leased_by, None);
    }

    #[tokio::test]
    async fn arch_mismatch_fails_fast_as_arm_device_only() {
        let fleet = manager(vec![device("d1", Arch::X86)]);
        let task = TaskId::new("t1");
        let err = fleet
            .acquire(
                &task,
                Constraint {
                    arch: Some(Arch::Arm64),
                },
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::ArmDeviceOnly));
    }

    #[tokio::test]
    async fn busy_device_times_out() {
        let fleet = manager(vec![device("d1", Arch::Arm64)]);
        let first = TaskId::new("t1");
        let lease = fleet
            .acquire(&first, Constraint::default(), Duration::from_millis(50))
            .await
            .unwrap();

        let second = TaskId::new("t2");
        let err = fleet
            .acquire(&second, Constraint::default(), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::DeviceTimeout));
    }

    #[tokio::test]
    async fn rest_policy_excludes_device_after_n_executions() {
        let mut fleet = manager(vec![device("d1", Arch::Arm64)]);
        fleet.rest_policy.every_n_executions = 1;
        let task = TaskId::new("t1");
        let lease = fleet
            .acquire(&task, Constraint::default(), Duration::from_millis(50))
            .await
            .unwrap();
        fleet.release(lease, Outcome::Success);

        let err = fleet
            .acquire(&task, Constraint::default(), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::DeviceTimeout));
    }

    #[tokio::test]
    async fn health_probe_marks_unhealthy_after_k_failures() {
        let fake = Arc::new(FakeDeviceTransport::default());
        for _ in 0..3 {
            fake.probe_failures.lock().push_back("unreachable".into());
        }
        let fleet = FleetManager::new(
            vec![device("d1", Arch::Arm64)],
            fake,
            FakeClock::new(0),
            RestPolicy::default(),
            HealthPolicy {
                consecutive_failure_threshold: 3,
            },
        );
        fleet.probe_once().await;
        fleet.probe_once().await;
        assert_eq!(fleet.list()[0].health, HealthState::Healthy);
        fleet.probe_once().await;
        assert_eq!(fleet.list()[0].health, HealthState::Unhealthy);
    }
}
