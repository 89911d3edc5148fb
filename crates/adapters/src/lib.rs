// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: device transport, DNS, and the locality /
//! registration HTTP clients.

pub mod device;
pub mod dns;
mod env;
pub mod error;
pub mod http;
mod subprocess;

pub use device::{AdbTransport, DeviceTransport};
pub use dns::{MultiResolver, NamedResolver, ResolvedIp};
pub use error::{AdapterError, Result};
pub use http::{
    LocalityApiConfig, LocalityClient, LocalityRecord, RegistrationApiConfig, RegistrationClient,
};

#[cfg(any(test, feature = "test-support"))]
pub use device::fake::{FakeDeviceTransport, TransportCall};
