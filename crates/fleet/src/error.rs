// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet manager error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    /// No eligible device became available before the acquire timeout
    /// elapsed.
    #[error("no device became available within the timeout")]
    DeviceTimeout,
    /// The fleet has no device at all matching the requested arch
    /// constraint, so waiting would never help.
    #[error("no device in the fleet matches the requested architecture")]
    ArmDeviceOnly,
    #[error("unknown device id: {0}")]
    UnknownDevice(String),
    #[error(transparent)]
    Transport(#[from] packlab_adapters::AdapterError),
}

pub type Result<T> = std::result::Result<T, FleetError>;
