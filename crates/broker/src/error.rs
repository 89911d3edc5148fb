// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker adapter error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("payload is not valid UTF-8/JSON: {0}")]
    Payload(String),
    #[error("broker is not connected")]
    NotConnected,
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
