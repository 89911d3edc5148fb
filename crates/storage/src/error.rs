// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("task {0} not found")]
    TaskNotFound(String),
    #[error("a task for apk '{0}' was already enqueued within the dedup window")]
    DuplicateTask(String),
    #[error("delete-all is disabled without the explicit confirmation sentinel")]
    DeleteAllNotConfirmed,
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
