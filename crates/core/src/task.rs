// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task aggregate: the analysis-task state machine.

use crate::device::Arch;
use crate::failure::FailureType;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an analysis task.
    #[derive(Default)]
    pub struct TaskId;
}

/// Lifecycle status of a task.
///
/// Monotonic within one execution attempt:
/// `Queued -> Installing -> Running -> Collecting -> Completed|Failed|Cancelled`.
/// A retry resets status back to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Installing,
    Running,
    Collecting,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Ordering key used by the listing query's status-priority sort
    ///: running < installing < collecting < completed < failed < other.
    pub fn list_priority(self) -> u8 {
        match self {
            TaskStatus::Running => 0,
            TaskStatus::Installing => 1,
            TaskStatus::Collecting => 2,
            TaskStatus::Completed => 3,
            TaskStatus::Failed => 4,
            TaskStatus::Queued | TaskStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Installing => "installing",
            TaskStatus::Running => "running",
            TaskStatus::Collecting => "collecting",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Configuration for creating a new task row.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub id: TaskId,
    pub apk_name: String,
    pub apk_path: String,
    /// Arch the device lease must match, derived from the APK's own
    /// manifest/ABI at submission time. `None` means any device is eligible.
    pub required_arch: Option<Arch>,
}

/// The Task aggregate root.
///
/// Field-level mutation goes through [`crate::task::Task`] helper methods
/// that mirror the repository's single-column update contract:
/// nothing here performs a whole-struct "load, mutate, save" — the
/// repository is the sole place whole-row vs. single-column writes are
/// decided, and it never round-trips a full `Task` back through `UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub apk_name: String,
    pub apk_path: String,
    pub required_arch: Option<Arch>,
    pub app_name: Option<String>,
    pub package_name: Option<String>,
    pub status: TaskStatus,
    pub should_stop: bool,
    pub failure_type: FailureType,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub current_step: String,
    pub progress_percent: u8,
    pub static_analysis_completed: bool,
    pub dynamic_analysis_completed: bool,
}

impl Task {
    /// Create a freshly queued task.
    pub fn new(config: TaskConfig, created_at_ms: u64) -> Self {
        Self {
            id: config.id,
            apk_name: config.apk_name,
            apk_path: config.apk_path,
            required_arch: config.required_arch,
            app_name: None,
            package_name: None,
            status: TaskStatus::Queued,
            should_stop: false,
            failure_type: FailureType::None,
            error_message: None,
            retry_count: 0,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            current_step: "queued".to_string(),
            progress_percent: 0,
            static_analysis_completed: false,
            dynamic_analysis_completed: false,
        }
    }

    /// True once both independent analysis fan-in flags have reported.
    ///
    /// Callers must re-read both flags from the authoritative store immediately
    /// before calling this — never from a cached in-memory `Task` snapshot,
    /// since the two flags are written by concurrent sub-activities in any order.
    pub fn analysis_fan_in_complete(&self) -> bool {
        self.static_analysis_completed && self.dynamic_analysis_completed
    }

    /// Invariant check: for a terminal task, `completed_at` must be set and
    /// progress must be 0 or 100.
    pub fn terminal_invariant_holds(&self) -> bool {
        if !self.status.is_terminal() {
            return true;
        }
        self.completed_at_ms.is_some()
            && (self.progress_percent == 0 || self.progress_percent == 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_queued_with_zero_progress() {
        let t = Task::new(
            TaskConfig {
                id: TaskId::new("t1"),
                apk_name: "demo.apk".into(),
                apk_path: "inbound/demo.apk".into(),
                required_arch: None,
            },
            1_000,
        );
        assert_eq!(t.status, TaskStatus::Queued);
        assert_eq!(t.progress_percent, 0);
        assert!(!t.analysis_fan_in_complete());
        assert!(t.terminal_invariant_holds());
    }

    #[test]
    fn fan_in_requires_both_flags() {
        let mut t = Task::new(
            TaskConfig {
                id: TaskId::new("t1"),
                apk_name: "demo.apk".into(),
                apk_path: "inbound/demo.apk".into(),
                required_arch: None,
            },
            0,
        );
        t.static_analysis_completed = true;
        assert!(!t.analysis_fan_in_complete());
        t.dynamic_analysis_completed = true;
        assert!(t.analysis_fan_in_complete());
    }

    #[test]
    fn terminal_invariant_rejects_missing_completed_at() {
        let mut t = Task::new(
            TaskConfig {
                id: TaskId::new("t1"),
                apk_name: "demo.apk".into(),
                apk_path: "inbound/demo.apk".into(),
                required_arch: None,
            },
            0,
        );
        t.status = TaskStatus::Completed;
        t.progress_percent = 100;
        assert!(!t.terminal_invariant_holds());
        t.completed_at_ms = Some(1);
        assert!(t.terminal_invariant_holds());
    }

    #[test]
    fn list_priority_orders_running_first() {
        assert!(TaskStatus::Running.list_priority() < TaskStatus::Installing.list_priority());
        assert!(TaskStatus::Installing.list_priority() < TaskStatus::Collecting.list_priority());
        assert!(TaskStatus::Collecting.list_priority() < TaskStatus::Completed.list_priority());
        assert!(TaskStatus::Completed.list_priority() < TaskStatus::Failed.list_priority());
        assert!(TaskStatus::Failed.list_priority() < TaskStatus::Queued.list_priority());
    }
}
