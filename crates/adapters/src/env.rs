// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Device reachability probe timeout (default: 3000ms).
pub fn device_probe_timeout() -> Duration {
    parse_duration_ms("PACKLAB_DEVICE_PROBE_MS").unwrap_or(Duration::from_secs(3))
}

/// APK install command timeout (default: 120s).
pub fn device_install_timeout() -> Duration {
    parse_duration_ms("PACKLAB_DEVICE_INSTALL_MS").unwrap_or(Duration::from_secs(120))
}

/// App launch command timeout (default: 30s).
pub fn device_launch_timeout() -> Duration {
    parse_duration_ms("PACKLAB_DEVICE_LAUNCH_MS").unwrap_or(Duration::from_secs(30))
}

/// IP-locality primary/secondary API timeout (default: 10s).
pub fn locality_api_timeout() -> Duration {
    parse_duration_ms("PACKLAB_LOCALITY_API_MS").unwrap_or(Duration::from_secs(10))
}

/// Registration API timeout (default: 60s; the upstream API is slow).
pub fn registration_api_timeout() -> Duration {
    parse_duration_ms("PACKLAB_BEIAN_API_MS").unwrap_or(Duration::from_secs(60))
}
