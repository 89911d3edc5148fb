// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Task Repository contract.
//!
//! Every mutation that can race with another mutation is expressed as a
//! single-column or explicit-columns `UPDATE`, never as a whole-row
//! "load, mutate, save". Implementations (see [`crate::postgres::PgTaskRepository`]
//! and [`crate::memory::InMemoryTaskRepository`]) must uphold that even
//! though the trait signatures take owned `Task`-shaped data only at
//! `create_task`.

use async_trait::async_trait;
use packlab_core::{
    DomainAnalysis, FailureType, SdkRule, StaticReport, Task, TaskConfig, TaskId, TaskStatus,
};
use std::collections::HashMap;

use crate::error::Result;

/// Equality filter applied to `status` in [`ListQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Equal(TaskStatus),
    NotEqual(TaskStatus),
}

/// Parameters for the single listing query the task API exposes.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub status_filter: Option<StatusFilter>,
    /// Substring search over `{apk_name, app_name, package_name}`.
    pub search: Option<String>,
    /// When false, narrows projected columns and skips child-aggregate
    /// eager-loading (the list path); when true, behaves like the detail
    /// path.
    pub eager_load_children: bool,
}

#[derive(Debug, Clone)]
pub struct ListPage {
    pub tasks: Vec<Task>,
    pub total: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StatusCounts {
    pub by_status: HashMap<TaskStatus, u64>,
    pub total: u64,
}

/// Sentinel required to call [`TaskRepository::delete_all_tasks`]. Constructed
/// only via [`DeleteAllConfirmation::new`], which requires the caller to
/// type out the exact confirmation phrase before a delete-all variant is
/// reachable at all.
#[derive(Debug, Clone, Copy)]
pub struct DeleteAllConfirmation(());

impl DeleteAllConfirmation {
    pub const PHRASE: &'static str = "DELETE ALL TASKS";

    pub fn new(phrase: &str) -> Option<Self> {
        (phrase == Self::PHRASE).then_some(Self(()))
    }
}

/// Full detail view of a task, including everything the detail path loads.
#[derive(Debug, Clone)]
pub struct TaskDetail {
    pub task: Task,
    pub activities: Vec<packlab_core::ActivityRecord>,
    pub static_report: Option<StaticReport>,
    pub domain_analysis: Option<DomainAnalysis>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a new task row. Returns [`crate::error::RepositoryError::DuplicateTask`]
    /// if `has_recent_task_for_apk` would return true for `config.apk_name`
    /// within the dedup window.
    async fn create_task(&self, config: TaskConfig, dedup_within_seconds: u64) -> Result<Task>;

    async fn get_task(&self, id: &TaskId) -> Result<Task>;

    async fn get_task_detail(&self, id: &TaskId) -> Result<TaskDetail>;

    /// Touches only the `static_analysis_completed` column.
    async fn mark_static_analysis_completed(&self, id: &TaskId) -> Result<()>;

    /// Touches only the `dynamic_analysis_completed` column.
    async fn mark_dynamic_analysis_completed(&self, id: &TaskId) -> Result<()>;

    /// Touches only `app_name`, and only when `name` is non-empty.
    async fn update_app_name(&self, id: &TaskId, name: &str) -> Result<()>;

    /// Touches only `package_name`.
    async fn update_package_name(&self, id: &TaskId, name: &str) -> Result<()>;

    /// Atomically writes status/current_step/progress, setting `started_at`
    /// on first transition out of `Queued`.
    async fn advance_stage(
        &self,
        id: &TaskId,
        status: TaskStatus,
        step: &str,
        progress_percent: u8,
        now_ms: u64,
    ) -> Result<()>;

    /// Atomically writes status=Failed, failure_type, message, completed_at.
    async fn update_failure(
        &self,
        id: &TaskId,
        failure_type: FailureType,
        message: &str,
        completed_at_ms: u64,
    ) -> Result<()>;

    /// Atomically writes status=Cancelled, completed_at.
    async fn mark_cancelled(&self, id: &TaskId, completed_at_ms: u64) -> Result<()>;

    /// Atomically writes status=Completed, progress=100, step=final, completed_at.
    /// Idempotent: calling twice yields the same row state.
    async fn mark_task_fully_completed(&self, id: &TaskId, completed_at_ms: u64) -> Result<()>;

    /// Atomic increment, then re-read.
    async fn increment_retry_count(&self, id: &TaskId) -> Result<u32>;

    /// Clears per-execution fields and sets status=Queued.
    async fn reset_for_retry(&self, id: &TaskId) -> Result<()>;

    async fn list_tasks(&self, query: ListQuery) -> Result<ListPage>;

    /// Queued tasks ordered `created_at asc`, for queue reconciliation.
    /// Distinct from [`Self::list_tasks`], whose ordering is tuned for the
    /// operator-facing listing (status priority, most-recent-first) and
    /// would replay the queue out of enqueue order.
    async fn list_queued_oldest_first(&self, page: u32, page_size: u32) -> Result<ListPage>;

    async fn status_counts(&self) -> Result<StatusCounts>;

    async fn has_recent_task_for_apk(&self, apk_name: &str, within_seconds: u64) -> Result<bool>;

    async fn save_activity(&self, record: packlab_core::ActivityRecord) -> Result<()>;

    async fn list_activities(&self, task_id: &TaskId) -> Result<Vec<packlab_core::ActivityRecord>>;

    async fn save_static_report(&self, report: StaticReport) -> Result<()>;

    async fn get_static_report(&self, task_id: &TaskId) -> Result<Option<StaticReport>>;

    /// Deletes existing `task_app_domains` rows for `analysis.task_id`, then
    /// inserts the fresh batch from `analysis.app_domains`.
    async fn save_domain_analysis(&self, analysis: DomainAnalysis) -> Result<()>;

    async fn get_domain_analysis(&self, task_id: &TaskId) -> Result<Option<DomainAnalysis>>;

    /// The full third-party SDK rule catalog, used by the domain analyzer to
    /// exclude known-SDK candidates from primary-domain selection. Disabled
    /// rows are included; [`SdkRule::matches`] filters them out at match time.
    async fn load_sdk_rules(&self) -> Result<Vec<SdkRule>>;

    /// Deletes a task and all of its children transactionally, children first.
    async fn delete_task(&self, id: &TaskId) -> Result<()>;

    /// Batch variant of [`Self::delete_task`].
    async fn delete_tasks(&self, ids: &[TaskId]) -> Result<()>;

    /// Deletes every task and child row. Requires [`DeleteAllConfirmation`],
    /// which only [`DeleteAllConfirmation::new`] can construct.
    async fn delete_all_tasks(&self, _confirm: DeleteAllConfirmation) -> Result<()>;
}
