// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors for external I/O adapters: device transport, DNS, and the
//! registration/locality HTTP clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("device transport error: {0}")]
    Transport(String),
    #[error("device command timed out after {0:?}")]
    TransportTimeout(std::time::Duration),
    #[error("dns resolution error: {0}")]
    Dns(#[from] hickory_resolver::error::ResolveError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited by upstream, retries exhausted")]
    RateLimited,
    #[error("upstream returned an unparseable response: {0}")]
    BadResponse(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
