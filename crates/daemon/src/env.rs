// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate. Typed
//! parsing in one place, per-key, each with a sensible default — the rest
//! of the crate never touches `std::env` directly. [`crate::config`] covers
//! the keys that belong in the TOML file; this module covers the handful
//! that are process-launch concerns instead (log destination, shutdown
//! grace period) and so are conventionally left as env vars.

use std::path::PathBuf;
use std::time::Duration;

/// Directory log files are rotated into. `PACKLAB_LOG_DIR`, else
/// `XDG_STATE_HOME/packlab`, else `~/.local/state/packlab`.
pub fn log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PACKLAB_LOG_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("packlab");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".local/state/packlab")
}

/// How long `stop()` on the worker pool is given to drain in-flight tasks
/// before the process force-exits.
pub fn shutdown_grace() -> Duration {
    std::env::var("PACKLAB_SHUTDOWN_GRACE_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30))
}

/// How often the background memory/stats ticker logs a snapshot.
pub fn stats_interval() -> Duration {
    std::env::var("PACKLAB_STATS_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_grace_defaults_to_30s() {
        std::env::remove_var("PACKLAB_SHUTDOWN_GRACE_SECS");
        assert_eq!(shutdown_grace(), Duration::from_secs(30));
    }
}
