// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types: the stage-level failures the orchestrator classifies
//! into a [`packlab_core::FailureType`].

use thiserror::Error;

/// A stage-level failure, already bucketed the way §7 classifies them.
/// The orchestrator maps each variant to a `FailureType` 1:1; this type
/// exists so stage code (device, exercise, static analysis) never has to
/// know about retry budgets, only about what actually went wrong.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("device acquisition timed out")]
    DeviceTimeout,
    #[error("no device in the fleet matches the task's architecture")]
    ArmDeviceOnly,
    #[error("apk install failed: {0}")]
    InstallFailed(String),
    #[error("device/proxy connection error: {0}")]
    ConnectionError(String),
    #[error("instrumentation (frida) error: {0}")]
    FridaError(String),
    #[error("proxy/capture error: {0}")]
    ProxyError(String),
    #[error("static/domain analysis error: {0}")]
    AnalysisError(String),
    #[error("stage timed out: {0}")]
    Timeout(String),
    #[error("unclassified stage error: {0}")]
    Unknown(String),
}

impl StageError {
    pub fn failure_type(&self) -> packlab_core::FailureType {
        use packlab_core::FailureType;
        match self {
            StageError::DeviceTimeout => FailureType::DeviceTimeout,
            StageError::ArmDeviceOnly => FailureType::ArmDeviceOnly,
            StageError::InstallFailed(_) => FailureType::InstallFailed,
            StageError::ConnectionError(_) => FailureType::ConnectionError,
            StageError::FridaError(_) => FailureType::FridaError,
            StageError::ProxyError(_) => FailureType::ProxyError,
            StageError::AnalysisError(_) => FailureType::AnalysisError,
            StageError::Timeout(_) => FailureType::Timeout,
            StageError::Unknown(_) => FailureType::Unknown,
        }
    }
}

impl From<packlab_fleet::FleetError> for StageError {
    fn from(err: packlab_fleet::FleetError) -> Self {
        match err {
            packlab_fleet::FleetError::DeviceTimeout => StageError::DeviceTimeout,
            packlab_fleet::FleetError::ArmDeviceOnly => StageError::ArmDeviceOnly,
            other => StageError::ConnectionError(other.to_string()),
        }
    }
}

impl From<packlab_adapters::AdapterError> for StageError {
    fn from(err: packlab_adapters::AdapterError) -> Self {
        match err {
            packlab_adapters::AdapterError::TransportTimeout(_) => {
                StageError::Timeout(err.to_string())
            }
            other => StageError::ConnectionError(other.to_string()),
        }
    }
}

/// Top-level engine error, for failures that occur outside the per-task
/// stage pipeline (pool shutdown, repository errors reached through).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Repository(#[from] packlab_storage::RepositoryError),
    #[error(transparent)]
    Broker(#[from] packlab_broker::BrokerError),
    #[error("malformed task message: {0}")]
    BadMessage(String),
    #[error("worker pool is stopped and rejects new submissions")]
    PoolStopped,
}

pub type Result<T> = std::result::Result<T, EngineError>;
