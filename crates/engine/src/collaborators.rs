// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two collaborators the "exercise" stage drives: a
//! UI-automation controller that exercises the app on-device, and a static
//! analyzer run as a detached sub-activity. Both are external systems from
//! this core's point of view; the
//! orchestrator only needs a port to call into them and a typed result back.

use async_trait::async_trait;
use packlab_core::{ActivityRecord, DeviceConfig, StaticReport, TaskId};

use crate::error::StageError;

/// Output of one exercise pass: the UI screens visited and the flows
/// captured while each was on screen.
#[derive(Debug, Clone, Default)]
pub struct ExerciseOutput {
    pub activities: Vec<ActivityRecord>,
}

/// Drives the app on a leased device, capturing screenshots, UI-hierarchy
/// snapshots, and network flows per activity.
#[async_trait]
pub trait ExerciseController: Send + Sync {
    async fn exercise(
        &self,
        device: &DeviceConfig,
        task_id: &TaskId,
        duration: std::time::Duration,
    ) -> Result<ExerciseOutput, StageError>;
}

/// Runs static analysis against the submitted APK as a detached
/// sub-activity.
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    async fn analyze(&self, task_id: &TaskId, apk_path: &str) -> Result<StaticReport, StageError>;
}

/// Shells out to an external static-analyzer binary configured by the
/// operator, parsing its JSON stdout into a [`StaticReport`]. The binary's
/// own policy surface (`static_analysis.hybrid.*`) is opaque to this core
///: we only pass the APK path and parse the result.
pub struct ExternalStaticAnalyzer {
    pub binary_path: String,
    pub timeout: std::time::Duration,
}

#[async_trait]
impl StaticAnalyzer for ExternalStaticAnalyzer {
    async fn analyze(&self, task_id: &TaskId, apk_path: &str) -> Result<StaticReport, StageError> {
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.binary_path)
                .arg(apk_path)
                .output(),
        )
        .await
        .map_err(|_| StageError::Timeout("static analyzer timed out".into()))?
        .map_err(|e| StageError::AnalysisError(e.to_string()))?;

        if !output.status.success() {
            return Err(StageError::AnalysisError(format!(
                "static analyzer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let raw: RawStaticReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| StageError::AnalysisError(format!("bad static analyzer output: {e}")))?;
        Ok(raw.into_report(task_id.clone()))
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawStaticReport {
    package_name: Option<String>,
    app_name: Option<String>,
    #[serde(default)]
    activity_count: u32,
    #[serde(default)]
    service_count: u32,
    #[serde(default)]
    url_count: u32,
    #[serde(default)]
    domain_count: u32,
    packer_detected: Option<String>,
    #[serde(default)]
    basic_info: serde_json::Value,
    #[serde(default)]
    deep_analysis: serde_json::Value,
    #[serde(default)]
    static_urls: Vec<String>,
}

impl RawStaticReport {
    fn into_report(self, task_id: TaskId) -> StaticReport {
        StaticReport {
            task_id,
            package_name: self.package_name,
            app_name: self.app_name,
            activity_count: self.activity_count,
            service_count: self.service_count,
            url_count: self.url_count,
            domain_count: self.domain_count,
            packer_detected: self.packer_detected,
            basic_info: self.basic_info,
            deep_analysis: self.deep_analysis,
            static_urls: self.static_urls,
        }
    }
}

/// Drives the on-device UI automation by way of the adb transport already
/// used for install/launch: dumps the focused activity
/// name and a UI-hierarchy snapshot at a fixed cadence for `duration`, and
/// pairs any flows pushed in via [`ExerciseOutput`] construction downstream.
/// Flow capture itself comes from the device's mitm container (external);
/// this controller only owns the UI side.
pub struct AdbExerciseController {
    pub screen_interval: std::time::Duration,
}

#[async_trait]
impl ExerciseController for AdbExerciseController {
    async fn exercise(
        &self,
        device: &DeviceConfig,
        task_id: &TaskId,
        duration: std::time::Duration,
    ) -> Result<ExerciseOutput, StageError> {
        let mut activities = Vec::new();
        let deadline = tokio::time::Instant::now() + duration;
        while tokio::time::Instant::now() < deadline {
            let name = current_focused_activity(&device.adb_target)
                .await
                .unwrap_or_else(|| "unknown".to_string());
            activities.push(ActivityRecord {
                task_id: task_id.clone(),
                activity_name: name,
                screenshot_path: None,
                ui_hierarchy_path: None,
                flows: Vec::new(),
            });
            tokio::time::sleep(self.screen_interval).await;
        }
        Ok(ExerciseOutput { activities })
    }
}

async fn current_focused_activity(adb_target: &str) -> Option<String> {
    let output = tokio::process::Command::new("adb")
        .args(["-s", adb_target, "shell", "dumpsys", "window", "windows"])
        .output()
        .await
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|l| l.contains("mCurrentFocus"))
        .and_then(|l| l.split('/').next_back())
        .map(|s| s.trim_end_matches('}').to_string())
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct FakeExerciseController {
        pub scripted_activities: Mutex<VecDeque<ActivityRecord>>,
        pub fail_with: Mutex<Option<StageError>>,
    }

    #[async_trait]
    impl ExerciseController for FakeExerciseController {
        async fn exercise(
            &self,
            _device: &DeviceConfig,
            _task_id: &TaskId,
            _duration: std::time::Duration,
        ) -> Result<ExerciseOutput, StageError> {
            if let Some(err) = self.fail_with.lock().take() {
                return Err(err);
            }
            let activities = self.scripted_activities.lock().drain(..).collect();
            Ok(ExerciseOutput { activities })
        }
    }

    #[derive(Default)]
    pub struct FakeStaticAnalyzer {
        pub scripted_report: Mutex<Option<StaticReport>>,
        pub fail_with: Mutex<Option<StageError>>,
    }

    #[async_trait]
    impl StaticAnalyzer for FakeStaticAnalyzer {
        async fn analyze(
            &self,
            task_id: &TaskId,
            _apk_path: &str,
        ) -> Result<StaticReport, StageError> {
            if let Some(err) = self.fail_with.lock().take() {
                return Err(err);
            }
            Ok(self
                .scripted_report
                .lock()
                .take()
                .unwrap_or_else(|| StaticReport {
                    task_id: task_id.clone(),
                    package_name: None,
                    app_name: None,
                    activity_count: 0,
                    service_count: 0,
                    url_count: 0,
                    domain_count: 0,
                    packer_detected: None,
                    basic_info: serde_json::Value::Null,
                    deep_analysis: serde_json::Value::Null,
                    static_urls: Vec::new(),
                }))
        }
    }
}
