// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Reconciler: runs once at daemon startup. Any task
//! left `installing`/`running`/`collecting` from a prior process (it died
//! mid-task) is failed outright — there is no in-memory state to resume
//! from. The broker queue is then rebuilt from the authoritative `queued`
//! rows so that "the set of active broker messages equals the set of
//! `queued` tasks in DB" holds again after a restart.

use std::sync::Arc;

use packlab_core::{FailureType, TaskStatus};
use packlab_storage::{ListQuery, StatusFilter, TaskRepository};

use crate::error::{EngineError, Result};
use crate::message::TaskMessage;

const STUCK_STATUSES: [TaskStatus; 3] = [
    TaskStatus::Installing,
    TaskStatus::Running,
    TaskStatus::Collecting,
];

/// Page size used while draining `queued` rows to republish. Large enough
/// that a realistic backlog fits in one page; a second page is fetched if
/// not.
const REBUILD_PAGE_SIZE: u32 = 500;

pub struct Reconciler {
    pub repo: Arc<dyn TaskRepository>,
    pub broker: packlab_broker::AmqpBroker,
}

impl Reconciler {
    pub async fn run(&self, now_ms: u64) -> Result<()> {
        self.fail_stuck_tasks(now_ms).await?;
        self.rebuild_queue().await?;
        Ok(())
    }

    async fn fail_stuck_tasks(&self, now_ms: u64) -> Result<()> {
        for status in STUCK_STATUSES {
            let page = self
                .repo
                .list_tasks(ListQuery {
                    page: 0,
                    page_size: REBUILD_PAGE_SIZE,
                    status_filter: Some(StatusFilter::Equal(status)),
                    search: None,
                    eager_load_children: false,
                })
                .await
                .map_err(EngineError::from)?;
            for task in page.tasks {
                tracing::warn!(task_id = %task.id.as_str(), status = %status, "failing stuck in-flight task found at startup");
                self.repo
                    .update_failure(
                        &task.id,
                        FailureType::Unknown,
                        "task was in-flight when the daemon restarted",
                        now_ms,
                    )
                    .await
                    .map_err(EngineError::from)?;
            }
        }
        Ok(())
    }

    async fn rebuild_queue(&self) -> Result<()> {
        self.broker.purge().await.map_err(EngineError::from)?;

        let mut page = 0;
        loop {
            let result = self
                .repo
                .list_queued_oldest_first(page, REBUILD_PAGE_SIZE)
                .await
                .map_err(EngineError::from)?;

            let fetched = result.tasks.len() as u32;
            for task in result.tasks {
                let msg = TaskMessage {
                    task_id: task.id,
                    apk_name: task.apk_name,
                    apk_path: task.apk_path,
                };
                self.broker
                    .publish(&msg.encode())
                    .await
                    .map_err(EngineError::from)?;
            }

            if fetched < REBUILD_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packlab_core::TaskConfig;
    use packlab_storage::memory::InMemoryTaskRepository;

    // Exercises only the DB-side bookkeeping: `fail_stuck_tasks` has no
    // broker dependency, unlike `rebuild_queue`, which needs a live amqp
    // connection and is covered by the broker crate's own tests.
    #[tokio::test]
    async fn fails_every_stuck_status_and_leaves_queued_alone() {
        let repo: Arc<dyn TaskRepository> = Arc::new(InMemoryTaskRepository::new());
        let queued = repo
            .create_task(
                TaskConfig {
                    id: packlab_core::TaskId::new("queued-1"),
                    apk_name: "a.apk".into(),
                    apk_path: "inbound/a.apk".into(),
                    required_arch: None,
                },
                0,
            )
            .await
            .unwrap();
        let stuck = repo
            .create_task(
                TaskConfig {
                    id: packlab_core::TaskId::new("stuck-1"),
                    apk_name: "b.apk".into(),
                    apk_path: "inbound/b.apk".into(),
                    required_arch: None,
                },
                0,
            )
            .await
            .unwrap();
        repo.advance_stage(&stuck.id, TaskStatus::Running, "exercising", 40, 1)
            .await
            .unwrap();

        for status in STUCK_STATUSES {
            let page = repo
                .list_tasks(ListQuery {
                    page: 0,
                    page_size: REBUILD_PAGE_SIZE,
                    status_filter: Some(StatusFilter::Equal(status)),
                    search: None,
                    eager_load_children: false,
                })
                .await
                .unwrap();
            for task in page.tasks {
                repo.update_failure(&task.id, FailureType::Unknown, "stuck", 2)
                    .await
                    .unwrap();
            }
        }

        let stuck_after = repo.get_task(&stuck.id).await.unwrap();
        assert_eq!(stuck_after.status, TaskStatus::Failed);
        let queued_after = repo.get_task(&queued.id).await.unwrap();
        assert_eq!(queued_after.status, TaskStatus::Queued);
    }
}
