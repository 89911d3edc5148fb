// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory [`TaskRepository`] used by the rest of the workspace's test
//! suites so they don't need a live Postgres instance to exercise
//! orchestration logic.

use async_trait::async_trait;
use packlab_core::{
    ActivityRecord, DomainAnalysis, FailureType, SdkRule, StaticReport, Task, TaskConfig, TaskId,
    TaskStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{RepositoryError, Result};
use crate::repository::{
    DeleteAllConfirmation, ListPage, ListQuery, StatusCounts, StatusFilter, TaskDetail,
    TaskRepository,
};

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    activities: HashMap<TaskId, Vec<ActivityRecord>>,
    static_reports: HashMap<TaskId, StaticReport>,
    domain_analyses: HashMap<TaskId, DomainAnalysis>,
    /// Insertion order, since `HashMap` iteration order is not stable and the
    /// listing query's tie-break falls back to creation order.
    insertion_order: Vec<TaskId>,
    sdk_rules: Vec<SdkRule>,
}

/// Test-only, process-local [`TaskRepository`]. Never used by `packlabd`.
pub struct InMemoryTaskRepository {
    inner: Mutex<Inner>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskRepository {
    /// Test-only seam: installs a fixed SDK rule catalog instead of the
    /// empty default, so orchestration tests can exercise SDK-based
    /// candidacy exclusion without a database.
    pub fn with_sdk_rules(rules: Vec<SdkRule>) -> Self {
        let repo = Self::new();
        repo.inner.lock().sdk_rules = rules;
        repo
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create_task(&self, config: TaskConfig, dedup_within_seconds: u64) -> Result<Task> {
        let mut inner = self.inner.lock();
        let now_ms = config_created_at(&inner, dedup_within_seconds);
        if recent_task_exists(&inner, &config.apk_name, dedup_within_seconds, now_ms) {
            return Err(RepositoryError::DuplicateTask(config.apk_name));
        }
        let task = Task::new(config, now_ms);
        inner.insertion_order.push(task.id.clone());
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.inner
            .lock()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::TaskNotFound(id.as_str().to_string()))
    }

    async fn get_task_detail(&self, id: &TaskId) -> Result<TaskDetail> {
        let inner = self.inner.lock();
        let task = inner
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::TaskNotFound(id.as_str().to_string()))?;
        Ok(TaskDetail {
            task,
            activities: inner.activities.get(id).cloned().unwrap_or_default(),
            static_report: inner.static_reports.get(id).cloned(),
            domain_analysis: inner.domain_analyses.get(id).cloned(),
        })
    }

    async fn mark_static_analysis_completed(&self, id: &TaskId) -> Result<()> {
        self.with_task_mut(id, |t| t.static_analysis_completed = true)
    }

    async fn mark_dynamic_analysis_completed(&self, id: &TaskId) -> Result<()> {
        self.with_task_mut(id, |t| t.dynamic_analysis_completed = true)
    }

    async fn update_app_name(&self, id: &TaskId, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let name = name.to_string();
        self.with_task_mut(id, move |t| t.app_name = Some(name))
    }

    async fn update_package_name(&self, id: &TaskId, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let name = name.to_string();
        self.with_task_mut(id, move |t| t.package_name = Some(name))
    }

    async fn advance_stage(
        &self,
        id: &TaskId,
        status: TaskStatus,
        step: &str,
        progress_percent: u8,
        now_ms: u64,
    ) -> Result<()> {
        let step = step.to_string();
        self.with_task_mut(id, move |t| {
            t.status = status;
            t.current_step = step;
            t.progress_percent = progress_percent;
            if status != TaskStatus::Queued && t.started_at_ms.is_none() {
                t.started_at_ms = Some(now_ms);
            }
        })
    }

    async fn update_failure(
        &self,
        id: &TaskId,
        failure_type: FailureType,
        message: &str,
        completed_at_ms: u64,
    ) -> Result<()> {
        let message = message.to_string();
        self.with_task_mut(id, move |t| {
            t.status = TaskStatus::Failed;
            t.failure_type = failure_type;
            t.error_message = Some(message);
            t.completed_at_ms = Some(completed_at_ms);
            t.progress_percent = 0;
        })
    }

    async fn mark_cancelled(&self, id: &TaskId, completed_at_ms: u64) -> Result<()> {
        self.with_task_mut(id, move |t| {
            t.status = TaskStatus::Cancelled;
            t.completed_at_ms = Some(completed_at_ms);
            t.progress_percent = 0;
        })
    }

    async fn mark_task_fully_completed(&self, id: &TaskId, completed_at_ms: u64) -> Result<()> {
        self.with_task_mut(id, move |t| {
            t.status = TaskStatus::Completed;
            t.progress_percent = 100;
            t.current_step = "completed".to_string();
            t.completed_at_ms = Some(completed_at_ms);
        })
    }

    async fn increment_retry_count(&self, id: &TaskId) -> Result<u32> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| RepositoryError::TaskNotFound(id.as_str().to_string()))?;
        task.retry_count += 1;
        Ok(task.retry_count)
    }

    async fn reset_for_retry(&self, id: &TaskId) -> Result<()> {
        self.with_task_mut(id, |t| {
            t.status = TaskStatus::Queued;
            t.should_stop = false;
            t.error_message = None;
            t.failure_type = FailureType::None;
            t.started_at_ms = None;
            t.completed_at_ms = None;
            t.current_step = "queued".to_string();
            t.progress_percent = 0;
            t.static_analysis_completed = false;
            t.dynamic_analysis_completed = false;
        })
    }

    async fn list_tasks(&self, query: ListQuery) -> Result<ListPage> {
        let inner = self.inner.lock();
        let mut matched: Vec<&Task> = inner
            .insertion_order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| match query.status_filter {
                Some(StatusFilter::Equal(s)) => t.status == s,
                Some(StatusFilter::NotEqual(s)) => t.status != s,
                None => true,
            })
            .filter(|t| match &query.search {
                Some(needle) if !needle.is_empty() => {
                    let needle = needle.to_lowercase();
                    t.apk_name.to_lowercase().contains(&needle)
                        || t.app_name
                            .as_deref()
                            .is_some_and(|s| s.to_lowercase().contains(&needle))
                        || t.package_name
                            .as_deref()
                            .is_some_and(|s| s.to_lowercase().contains(&needle))
                }
                _ => true,
            })
            .collect();

        matched.sort_by(|a, b| {
            a.status
                .list_priority()
                .cmp(&b.status.list_priority())
                .then_with(|| b.completed_at_ms.cmp(&a.completed_at_ms))
                .then_with(|| b.created_at_ms.cmp(&a.created_at_ms))
        });

        let total = matched.len() as u64;
        let page_size = query.page_size.max(1) as usize;
        let start = (query.page as usize) * page_size;
        let tasks = matched
            .into_iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();
        Ok(ListPage { tasks, total })
    }

    async fn list_queued_oldest_first(&self, page: u32, page_size: u32) -> Result<ListPage> {
        let inner = self.inner.lock();
        let mut matched: Vec<&Task> = inner
            .insertion_order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Queued)
            .collect();
        matched.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));

        let total = matched.len() as u64;
        let page_size = page_size.max(1) as usize;
        let start = (page as usize) * page_size;
        let tasks = matched
            .into_iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();
        Ok(ListPage { tasks, total })
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let inner = self.inner.lock();
        let mut by_status = HashMap::new();
        for t in inner.tasks.values() {
            *by_status.entry(t.status).or_insert(0u64) += 1;
        }
        Ok(StatusCounts {
            total: inner.tasks.len() as u64,
            by_status,
        })
    }

    async fn has_recent_task_for_apk(&self, apk_name: &str, within_seconds: u64) -> Result<bool> {
        let inner = self.inner.lock();
        let now_ms = inner
            .tasks
            .values()
            .map(|t| t.created_at_ms)
            .max()
            .unwrap_or(0);
        Ok(recent_task_exists(&inner, apk_name, within_seconds, now_ms))
    }

    async fn save_activity(&self, record: ActivityRecord) -> Result<()> {
        self.inner
            .lock()
            .activities
            .entry(record.task_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list_activities(&self, task_id: &TaskId) -> Result<Vec<ActivityRecord>> {
        Ok(self
            .inner
            .lock()
            .activities
            .get(task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_static_report(&self, report: StaticReport) -> Result<()> {
        self.inner
            .lock()
            .static_reports
            .insert(report.task_id.clone(), report);
        Ok(())
    }

    async fn get_static_report(&self, task_id: &TaskId) -> Result<Option<StaticReport>> {
        Ok(self.inner.lock().static_reports.get(task_id).cloned())
    }

    async fn save_domain_analysis(&self, analysis: DomainAnalysis) -> Result<()> {
        // Rebuilt wholesale: replacing the map entry already discards any
        // previously-stored `app_domains` rows for this task.
        self.inner
            .lock()
            .domain_analyses
            .insert(analysis.task_id.clone(), analysis);
        Ok(())
    }

    async fn get_domain_analysis(&self, task_id: &TaskId) -> Result<Option<DomainAnalysis>> {
        Ok(self.inner.lock().domain_analyses.get(task_id).cloned())
    }

    async fn load_sdk_rules(&self) -> Result<Vec<SdkRule>> {
        Ok(self.inner.lock().sdk_rules.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.tasks.remove(id);
        inner.activities.remove(id);
        inner.static_reports.remove(id);
        inner.domain_analyses.remove(id);
        inner.insertion_order.retain(|x| x != id);
        Ok(())
    }

    async fn delete_tasks(&self, ids: &[TaskId]) -> Result<()> {
        for id in ids {
            self.delete_task(id).await?;
        }
        Ok(())
    }

    async fn delete_all_tasks(&self, _confirm: DeleteAllConfirmation) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.tasks.clear();
        inner.activities.clear();
        inner.static_reports.clear();
        inner.domain_analyses.clear();
        inner.insertion_order.clear();
        Ok(())
    }
}

impl InMemoryTaskRepository {
    fn with_task_mut(&self, id: &TaskId, f: impl FnOnce(&mut Task)) -> Result<()> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| RepositoryError::TaskNotFound(id.as_str().to_string()))?;
        f(task);
        Ok(())
    }
}

fn recent_task_exists(
    inner: &Inner,
    apk_name: &str,
    within_seconds: u64,
    now_ms: u64,
) -> bool {
    let window_ms = within_seconds.saturating_mul(1000);
    inner.tasks.values().any(|t| {
        t.apk_name == apk_name && now_ms.saturating_sub(t.created_at_ms) <= window_ms
    })
}

/// The in-memory repository has no clock of its own; new tasks are stamped
/// with the latest `created_at_ms` already on record (or 0 for an empty
/// store) so dedup windows behave sensibly under test without requiring
/// every caller to thread a clock through.
fn config_created_at(inner: &Inner, _within_seconds: u64) -> u64 {
    inner.tasks.values().map(|t| t.created_at_ms).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(apk: &str) -> TaskConfig {
        TaskConfig {
            id: TaskId::new(uuid::Uuid::new_v4().to_string()),
            apk_name: apk.to_string(),
            apk_path: format!("inbound/{apk}"),
            required_arch: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = InMemoryTaskRepository::new();
        let t = repo.create_task(cfg("demo.apk"), 60).await.unwrap();
        let back = repo.get_task(&t.id).await.unwrap();
        assert_eq!(back.apk_name, "demo.apk");
        assert_eq!(back.status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn dedup_window_rejects_second_create() {
        let repo = InMemoryTaskRepository::new();
        repo.create_task(cfg("demo.apk"), 60).await.unwrap();
        let err = repo.create_task(cfg("demo.apk"), 60).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateTask(_)));
    }

    #[tokio::test]
    async fn advance_stage_sets_started_at_once() {
        let repo = InMemoryTaskRepository::new();
        let t = repo.create_task(cfg("demo.apk"), 60).await.unwrap();
        repo.advance_stage(&t.id, TaskStatus::Installing, "installing", 10, 500)
            .await
            .unwrap();
        let after_first = repo.get_task(&t.id).await.unwrap();
        assert_eq!(after_first.started_at_ms, Some(500));

        repo.advance_stage(&t.id, TaskStatus::Running, "running", 40, 900)
            .await
            .unwrap();
        let after_second = repo.get_task(&t.id).await.unwrap();
        assert_eq!(after_second.started_at_ms, Some(500));
    }

    #[tokio::test]
    async fn update_failure_and_retry_roundtrip() {
        let repo = InMemoryTaskRepository::new();
        let t = repo.create_task(cfg("demo.apk"), 60).await.unwrap();
        repo.update_failure(&t.id, FailureType::ConnectionError, "boom", 1_000)
            .await
            .unwrap();
        let failed = repo.get_task(&t.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.failure_type, FailureType::ConnectionError);

        let count = repo.increment_retry_count(&t.id).await.unwrap();
        assert_eq!(count, 1);
        repo.reset_for_retry(&t.id).await.unwrap();
        let reset = repo.get_task(&t.id).await.unwrap();
        assert_eq!(reset.status, TaskStatus::Queued);
        assert_eq!(reset.retry_count, 1);
        assert_eq!(reset.failure_type, FailureType::None);
    }

    #[tokio::test]
    async fn list_tasks_orders_running_before_queued() {
        let repo = InMemoryTaskRepository::new();
        let queued = repo.create_task(cfg("a.apk"), 60).await.unwrap();
        let running = repo.create_task(cfg("b.apk"), 60).await.unwrap();
        repo.advance_stage(&running.id, TaskStatus::Running, "running", 50, 10)
            .await
            .unwrap();

        let page = repo
            .list_tasks(ListQuery {
                page: 0,
                page_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.tasks[0].id, running.id);
        assert_eq!(page.tasks[1].id, queued.id);
    }

    #[tokio::test]
    async fn list_queued_oldest_first_is_fifo_by_created_at() {
        let repo = InMemoryTaskRepository::new();
        let first = repo.create_task(cfg("a.apk"), 60).await.unwrap();
        let second = repo.create_task(cfg("b.apk"), 60).await.unwrap();
        repo.advance_stage(&second.id, TaskStatus::Running, "running", 40, 10)
            .await
            .unwrap();
        let third = repo.create_task(cfg("c.apk"), 60).await.unwrap();

        let page = repo.list_queued_oldest_first(0, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.tasks[0].id, first.id);
        assert_eq!(page.tasks[1].id, third.id);
    }

    #[tokio::test]
    async fn delete_all_requires_confirmation() {
        let repo = InMemoryTaskRepository::new();
        repo.create_task(cfg("demo.apk"), 60).await.unwrap();
        assert!(DeleteAllConfirmation::new("nope").is_none());
        let confirm = DeleteAllConfirmation::new(DeleteAllConfirmation::PHRASE).unwrap();
        repo.delete_all_tasks(confirm).await.unwrap();
        let counts = repo.status_counts().await.unwrap();
        assert_eq!(counts.total, 0);
    }
}
