// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! packlab-storage: the Task Repository and its Postgres and
//! in-memory implementations.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{RepositoryError, Result};
pub use memory::InMemoryTaskRepository;
pub use postgres::PgTaskRepository;
pub use repository::{
    DeleteAllConfirmation, ListPage, ListQuery, StatusCounts, StatusFilter, TaskDetail,
    TaskRepository,
};
