// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain-analysis error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("no candidate domain survived filtering")]
    NoCandidate,
    #[error(transparent)]
    Adapter(#[from] packlab_adapters::AdapterError),
    #[error(transparent)]
    Repository(#[from] packlab_storage::RepositoryError),
}

pub type Result<T> = std::result::Result<T, DomainError>;
