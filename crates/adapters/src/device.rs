// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device transport: installing, launching, and health-probing a leased
//! device. Mirrors an `adb`-style command-line transport
//! but is expressed as a trait so the fleet manager and orchestrator never
//! shell out directly.

use async_trait::async_trait;
use packlab_core::DeviceConfig;
use tokio::process::Command;

use crate::env;
use crate::error::{AdapterError, Result};
use crate::subprocess::run_with_timeout;

#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Lightweight reachability check against the transport target (spec
    /// §4.3, "Health probe").
    async fn probe(&self, device: &DeviceConfig) -> Result<()>;

    /// Pushes and installs the APK on the device.
    async fn install_apk(&self, device: &DeviceConfig, apk_path: &str) -> Result<()>;

    /// Launches the installed app's entry activity.
    async fn launch_app(&self, device: &DeviceConfig, package_name: &str) -> Result<()>;

    /// Stops the app, used on cancellation and after collection.
    async fn stop_app(&self, device: &DeviceConfig, package_name: &str) -> Result<()>;

    /// Pushes the proxy's CA certificate onto the device's trusted system
    /// store so HTTPS traffic can be intercepted.
    async fn install_cert(&self, device: &DeviceConfig, cert_path: &str) -> Result<()>;
}

/// `adb`-backed transport. One adb invocation per call; the device's
/// `adb_target` selects the `-s` argument.
pub struct AdbTransport;

#[async_trait]
impl DeviceTransport for AdbTransport {
    async fn probe(&self, device: &DeviceConfig) -> Result<()> {
        let mut cmd = Command::new("adb");
        cmd.args(["-s", &device.adb_target, "get-state"]);
        let output = run_with_timeout(cmd, env::device_probe_timeout(), "adb get-state")
            .await
            .map_err(AdapterError::Transport)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AdapterError::Transport(format!(
                "adb get-state exited with {}",
                output.status
            )))
        }
    }

    async fn install_apk(&self, device: &DeviceConfig, apk_path: &str) -> Result<()> {
        let mut cmd = Command::new("adb");
        cmd.args(["-s", &device.adb_target, "install", "-r", apk_path]);
        let output = run_with_timeout(cmd, env::device_install_timeout(), "adb install")
            .await
            .map_err(AdapterError::Transport)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AdapterError::Transport(format!(
                "adb install exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )))
        }
    }

    async fn launch_app(&self, device: &DeviceConfig, package_name: &str) -> Result<()> {
        let monkey_target = format!("{package_name} 1");
        let mut cmd = Command::new("adb");
        cmd.args(["-s", &device.adb_target, "shell", "monkey", "-p"]);
        cmd.arg(package_name);
        cmd.arg("-c");
        cmd.arg("android.intent.category.LAUNCHER");
        cmd.arg("1");
        let _ = &monkey_target;
        let output = run_with_timeout(cmd, env::device_launch_timeout(), "adb launch")
            .await
            .map_err(AdapterError::Transport)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AdapterError::Transport(format!(
                "adb launch exited with {}",
                output.status
            )))
        }
    }

    async fn stop_app(&self, device: &DeviceConfig, package_name: &str) -> Result<()> {
        let mut cmd = Command::new("adb");
        cmd.args(["-s", &device.adb_target, "shell", "am", "force-stop", package_name]);
        let output = run_with_timeout(cmd, env::device_probe_timeout(), "adb force-stop")
            .await
            .map_err(AdapterError::Transport)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AdapterError::Transport(format!(
                "adb force-stop exited with {}",
                output.status
            )))
        }
    }

    async fn install_cert(&self, device: &DeviceConfig, cert_path: &str) -> Result<()> {
        let mut push = Command::new("adb");
        push.args(["-s", &device.adb_target, "push", cert_path, "/sdcard/packlab-ca.crt"]);
        let output = run_with_timeout(push, env::device_install_timeout(), "adb push cert")
            .await
            .map_err(AdapterError::Transport)?;
        if !output.status.success() {
            return Err(AdapterError::Transport(format!(
                "adb push cert exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let mut install = Command::new("adb");
        install.args([
            "-s",
            &device.adb_target,
            "shell",
            "su",
            "-c",
            "mv /sdcard/packlab-ca.crt /data/misc/user/0/cacerts-added/ && chmod 644 /data/misc/user/0/cacerts-added/packlab-ca.crt",
        ]);
        let output = run_with_timeout(install, env::device_install_timeout(), "adb install cert")
            .await
            .map_err(AdapterError::Transport)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AdapterError::Transport(format!(
                "adb install cert exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TransportCall {
        Probe(String),
        Install(String, String),
        Launch(String, String),
        Stop(String, String),
        InstallCert(String),
    }

    /// Scripted transport for fleet/orchestrator tests: each call consumes
    /// the next queued `Result` for that operation, defaulting to success.
    #[derive(Default)]
    pub struct FakeDeviceTransport {
        pub calls: Mutex<Vec<TransportCall>>,
        pub probe_failures: Mutex<VecDeque<String>>,
        pub install_failures: Mutex<VecDeque<String>>,
        pub launch_failures: Mutex<VecDeque<String>>,
        pub cert_failures: Mutex<VecDeque<String>>,
    }

    #[async_trait]
    impl DeviceTransport for FakeDeviceTransport {
        async fn probe(&self, device: &DeviceConfig) -> Result<()> {
            self.calls
                .lock()
                .push(TransportCall::Probe(device.id.as_str().to_string()));
            if let Some(msg) = self.probe_failures.lock().pop_front() {
                return Err(AdapterError::Transport(msg));
            }
            Ok(())
        }

        async fn install_apk(&self, device: &DeviceConfig, apk_path: &str) -> Result<()> {
            self.calls.lock().push(TransportCall::Install(
                device.id.as_str().to_string(),
                apk_path.to_string(),
            ));
            if let Some(msg) = self.install_failures.lock().pop_front() {
                return Err(AdapterError::Transport(msg));
            }
            Ok(())
        }

        async fn launch_app(&self, device: &DeviceConfig, package_name: &str) -> Result<()> {
            self.calls.lock().push(TransportCall::Launch(
                device.id.as_str().to_string(),
                package_name.to_string(),
            ));
            if let Some(msg) = self.launch_failures.lock().pop_front() {
                return Err(AdapterError::Transport(msg));
            }
            Ok(())
        }

        async fn stop_app(&self, device: &DeviceConfig, package_name: &str) -> Result<()> {
            self.calls.lock().push(TransportCall::Stop(
                device.id.as_str().to_string(),
                package_name.to_string(),
            ));
            Ok(())
        }

        async fn install_cert(&self, device: &DeviceConfig, _cert_path: &str) -> Result<()> {
            self.calls
                .lock()
                .push(TransportCall::InstallCert(device.id.as_str().to_string()));
            if let Some(msg) = self.cert_failures.lock().pop_front() {
                return Err(AdapterError::Transport(msg));
            }
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    #[tokio::test]
    async fn fake_transport_replays_scripted_failure() {
        let fake = FakeDeviceTransport::default();
        fake.install_failures
            .lock()
            .push_back("device full".to_string());
        let device = DeviceConfig {
            id: packlab_core::DeviceId::new("d1"),
            adb_target: "emulator-5554".into(),
            proxy_host: "127.0.0.1".into(),
            proxy_port: 8080,
            mitm_container: "mitm1".into(),
            mitm_api_port: 8081,
            instrumentation_host: "127.0.0.1".into(),
            arch: packlab_core::Arch::Arm64,
        };
        let err = fake.install_apk(&device, "demo.apk").await.unwrap_err();
        assert!(matches!(err, AdapterError::Transport(_)));
        let ok = fake.install_apk(&device, "demo.apk").await;
        assert!(ok.is_ok());
    }
}
