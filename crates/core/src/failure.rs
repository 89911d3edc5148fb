// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task failure classification.
//!
//! Every task-level failure carries a [`FailureType`], which fixes both the
//! display string persisted on the row and the retry budget the orchestrator
//! consults before deciding to re-enqueue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity bucket for a [`FailureType`]. Purely informational for now —
/// surfaced to callers via the task API so operators can triage without
/// memorizing which failure types are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Resource constraint; expected under load.
    Normal,
    /// Input or timing issue; often the submitter's fault.
    Warning,
    /// System fault; worth paging on if it recurs.
    Error,
}

/// Classification of a task-level failure.
///
/// `FailureType::None` is never persisted on a row — it exists so callers
/// can express "no failure" without `Option<FailureType>` at every call site
/// that only cares about retry budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    None,
    DeviceTimeout,
    ArmDeviceOnly,
    InstallFailed,
    ConnectionError,
    FridaError,
    ProxyError,
    AnalysisError,
    Timeout,
    Unknown,
}

impl FailureType {
    /// Maximum number of retries permitted for this failure kind.
    pub fn max_retry_count(self) -> u32 {
        match self {
            FailureType::ArmDeviceOnly => 0,
            FailureType::DeviceTimeout
            | FailureType::ConnectionError
            | FailureType::FridaError
            | FailureType::ProxyError
            | FailureType::Timeout => 3,
            FailureType::InstallFailed | FailureType::AnalysisError | FailureType::Unknown => 1,
            FailureType::None => 0,
        }
    }

    /// Severity bucket.
    pub fn severity(self) -> Severity {
        match self {
            FailureType::DeviceTimeout | FailureType::ArmDeviceOnly => Severity::Normal,
            FailureType::InstallFailed | FailureType::Timeout => Severity::Warning,
            FailureType::ConnectionError
            | FailureType::FridaError
            | FailureType::ProxyError
            | FailureType::AnalysisError
            | FailureType::Unknown => Severity::Error,
            FailureType::None => Severity::Normal,
        }
    }

    /// Whether a retry is worth attempting given the current retry count.
    pub fn is_retryable(self, retry_count: u32) -> bool {
        self != FailureType::None && retry_count < self.max_retry_count()
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureType::None => "",
            FailureType::DeviceTimeout => "device_timeout",
            FailureType::ArmDeviceOnly => "arm_device_only",
            FailureType::InstallFailed => "install_failed",
            FailureType::ConnectionError => "connection_error",
            FailureType::FridaError => "frida_error",
            FailureType::ProxyError => "proxy_error",
            FailureType::AnalysisError => "analysis_error",
            FailureType::Timeout => "timeout",
            FailureType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budgets_match_spec_table() {
        assert_eq!(FailureType::ArmDeviceOnly.max_retry_count(), 0);
        assert_eq!(FailureType::DeviceTimeout.max_retry_count(), 3);
        assert_eq!(FailureType::ConnectionError.max_retry_count(), 3);
        assert_eq!(FailureType::FridaError.max_retry_count(), 3);
        assert_eq!(FailureType::ProxyError.max_retry_count(), 3);
        assert_eq!(FailureType::Timeout.max_retry_count(), 3);
        assert_eq!(FailureType::InstallFailed.max_retry_count(), 1);
        assert_eq!(FailureType::AnalysisError.max_retry_count(), 1);
        assert_eq!(FailureType::Unknown.max_retry_count(), 1);
    }

    #[test]
    fn retry_count_never_exceeds_budget() {
        assert!(FailureType::InstallFailed.is_retryable(0));
        assert!(!FailureType::InstallFailed.is_retryable(1));
        assert!(FailureType::DeviceTimeout.is_retryable(2));
        assert!(!FailureType::DeviceTimeout.is_retryable(3));
    }

    #[test]
    fn arm_device_only_never_retries() {
        assert!(!FailureType::ArmDeviceOnly.is_retryable(0));
    }

    #[test]
    fn severity_buckets_match_spec_table() {
        assert_eq!(FailureType::DeviceTimeout.severity(), Severity::Normal);
        assert_eq!(FailureType::ArmDeviceOnly.severity(), Severity::Normal);
        assert_eq!(FailureType::InstallFailed.severity(), Severity::Warning);
        assert_eq!(FailureType::Timeout.severity(), Severity::Warning);
        assert_eq!(FailureType::ConnectionError.severity(), Severity::Error);
        assert_eq!(FailureType::FridaError.severity(), Severity::Error);
        assert_eq!(FailureType::ProxyError.severity(), Severity::Error);
        assert_eq!(FailureType::AnalysisError.severity(), Severity::Error);
        assert_eq!(FailureType::Unknown.severity(), Severity::Error);
    }
}
