// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup certificate installation: pushes the proxy's CA cert to every fleet device, bounded by
//! a per-attempt timeout and a fixed retry count, run in the background so
//! it never blocks the daemon's readiness signal.

use std::sync::Arc;
use std::time::Duration;

use packlab_adapters::DeviceTransport;
use packlab_core::{Clock, DeviceConfig};

const ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);
const BETWEEN_ATTEMPTS: Duration = Duration::from_secs(30);

/// Installs `cert_path` onto every device in `devices`, retrying devices
/// that failed on the prior pass up to [`ATTEMPTS`] times. Logs a warning
/// per device that never succeeds; never returns an error, since a failed
/// cert install must not prevent the daemon from starting.
pub async fn install_on_all_devices(
    transport: Arc<dyn DeviceTransport>,
    devices: Vec<DeviceConfig>,
    cert_path: String,
) {
    let mut remaining = devices;
    for attempt in 1..=ATTEMPTS {
        if remaining.is_empty() {
            return;
        }
        let mut failed = Vec::new();
        for device in remaining {
            let result = tokio::time::timeout(
                ATTEMPT_TIMEOUT,
                transport.install_cert(&device, &cert_path),
            )
            .await;
            match result {
                Ok(Ok(())) => {
                    tracing::info!(device_id = %device.id.as_str(), attempt, "cert installed");
                }
                Ok(Err(err)) => {
                    tracing::warn!(device_id = %device.id.as_str(), attempt, error = %err, "cert install failed");
                    failed.push(device);
                }
                Err(_) => {
                    tracing::warn!(device_id = %device.id.as_str(), attempt, "cert install timed out");
                    failed.push(device);
                }
            }
        }
        remaining = failed;
        if !remaining.is_empty() && attempt < ATTEMPTS {
            tokio::time::sleep(BETWEEN_ATTEMPTS).await;
        }
    }
    for device in remaining {
        tracing::error!(device_id = %device.id.as_str(), "cert install never succeeded after {} attempts", ATTEMPTS);
    }
}

/// Spawns [`install_on_all_devices`] as a detached background task.
pub fn spawn<C: Clock>(
    transport: Arc<dyn DeviceTransport>,
    devices: Vec<DeviceConfig>,
    cert_path: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(install_on_all_devices(transport, devices, cert_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use packlab_adapters::FakeDeviceTransport;
    use packlab_core::{Arch, DeviceId};

    fn device(id: &str) -> DeviceConfig {
        DeviceConfig {
            id: DeviceId::new(id),
            adb_target: format!("{id}-target"),
            proxy_host: "127.0.0.1".into(),
            proxy_port: 8080,
            mitm_container: format!("{id}-mitm"),
            mitm_api_port: 8081,
            instrumentation_host: "127.0.0.1".into(),
            arch: Arch::Arm64,
        }
    }

    #[tokio::test]
    async fn retries_only_the_devices_that_failed() {
        let fake = Arc::new(FakeDeviceTransport::default());
        fake.cert_failures.lock().push_back("not rooted".into());

        install_on_all_devices(
            fake.clone(),
            vec![device("d1"), device("d2")],
            "ca.pem".into(),
        )
        .await;

        let calls: Vec<_> = fake
            .calls
            .lock()
            .iter()
            .filter(|c| matches!(c, packlab_adapters::TransportCall::InstallCert(_)))
            .cloned()
            .collect();
        // d1 fails once then succeeds on retry; d2 succeeds first try.
        assert_eq!(calls.len(), 3);
    }
}
