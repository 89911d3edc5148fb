// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Task Orchestrator: drives one task through
//! `queued -> installing -> running -> collecting -> domain_analysis ->
//! completed`, checking `should_stop` ahead of every stage and deciding
//! which failures are worth a requeue. Every outcome is reported through a
//! tagged [`OrchestratorOutcome`] rather than folded into a generic `Err` —
//! the retry/terminal distinction has to survive the call so the queue
//! consumer knows whether to republish.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use packlab_adapters::DeviceTransport;
use packlab_core::{Clock, FailureType, TaskId};
use packlab_fleet::{Constraint, FleetManager, Lease, Outcome as LeaseOutcome};
use packlab_storage::TaskRepository;

use crate::collaborators::{ExerciseController, StaticAnalyzer};
use crate::error::StageError;

/// Progress-percent anchors the stage transitions write.
mod progress {
    pub const INSTALLING: u8 = 20;
    pub const RUNNING: u8 = 40;
    pub const COLLECTING: u8 = 60;
    pub const ANALYSIS_DONE: u8 = 80;
    pub const DOMAIN_ANALYSIS: u8 = 95;
    pub const COMPLETED: u8 = 100;
}

/// What happened to a task after one pass through the orchestrator. Distinct
/// from `Result<(), EngineError>` on purpose: retryable and terminal
/// failures must be distinguishable to the caller, not just both "errors".
#[derive(Debug)]
pub enum OrchestratorOutcome {
    Completed,
    Cancelled,
    RetryableFailure {
        failure_type: FailureType,
        message: String,
    },
    TerminalFailure {
        failure_type: FailureType,
        message: String,
    },
}

/// Tunables that aren't per-task data.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub device_acquire_timeout: Duration,
    pub exercise_duration: Duration,
}

pub struct Orchestrator<C: Clock> {
    pub repo: Arc<dyn TaskRepository>,
    pub fleet: Arc<FleetManager<C>>,
    pub device_transport: Arc<dyn DeviceTransport>,
    pub exercise: Arc<dyn ExerciseController>,
    pub static_analyzer: Arc<dyn StaticAnalyzer>,
    pub domain_pipeline: Arc<DomainPipeline>,
    pub clock: C,
    pub config: OrchestratorConfig,
}

/// Owns the DNS/locality/registration machinery the orchestrator hands each
/// task off to at the domain-analysis step. Kept as owned fields rather
/// than `packlab_domain::LocalityLookup`'s borrowed form so the orchestrator
/// can hold one instance for its whole lifetime.
pub struct DomainPipeline {
    pub resolver: packlab_adapters::MultiResolver,
    pub locality: packlab_adapters::LocalityClient,
    pub registration: packlab_adapters::RegistrationClient,
    pub cache: packlab_domain::LocalityCache,
    /// Labels filtered out before comparing a package/APK name against a
    /// candidate domain's main label.
    pub common_words: HashSet<String>,
}

impl<C: Clock> Orchestrator<C> {
    pub async fn run(&self, task_id: &TaskId) -> OrchestratorOutcome {
        match self.run_inner(task_id).await {
            Ok(outcome) => outcome,
            Err(stage_err) => self.classify(task_id, stage_err).await,
        }
    }

    async fn run_inner(&self, task_id: &TaskId) -> Result<OrchestratorOutcome, StageError> {
        if self.should_stop(task_id).await? {
            return Ok(self.cancel(task_id, None).await);
        }

        let task = self
            .repo
            .get_task(task_id)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;
        let now = self.clock.epoch_ms();
        self.repo
            .advance_stage(task_id, packlab_core::TaskStatus::Installing, "acquiring_device", progress::INSTALLING, now)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;

        let lease = self
            .fleet
            .acquire(
                task_id,
                Constraint { arch: task.required_arch },
                self.config.device_acquire_timeout,
            )
            .await?;

        if self.should_stop(task_id).await? {
            self.fleet.release(lease, LeaseOutcome::Failure);
            return Ok(self.cancel(task_id, None).await);
        }

        if let Err(err) = self.install_and_run(task_id, &task.apk_path, &lease).await {
            self.fleet.release(lease, LeaseOutcome::Failure);
            return Err(err);
        }

        self.fleet.release(lease, LeaseOutcome::Success);

        if self.should_stop(task_id).await? {
            return Ok(self.cancel(task_id, None).await);
        }

        self.collect_and_analyze(task_id, &task.apk_name, &task.apk_path)
            .await?;

        let now = self.clock.epoch_ms();
        self.repo
            .mark_task_fully_completed(task_id, now)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;
        Ok(OrchestratorOutcome::Completed)
    }

    async fn install_and_run(
        &self,
        task_id: &TaskId,
        apk_path: &str,
        lease: &Lease,
    ) -> Result<(), StageError> {
        let device = self.device_for(lease)?;

        self.device_transport
            .install_apk(&device, apk_path)
            .await
            .map_err(|e| StageError::InstallFailed(e.to_string()))?;

        let now = self.clock.epoch_ms();
        self.repo
            .advance_stage(task_id, packlab_core::TaskStatus::Running, "exercising", progress::RUNNING, now)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;

        let package_name = self.package_name_hint(task_id).await;
        self.device_transport
            .launch_app(&device, &package_name)
            .await
            .map_err(|e| StageError::ConnectionError(e.to_string()))?;

        let exercise_result = self
            .exercise
            .exercise(&device, task_id, self.config.exercise_duration)
            .await;

        let _ = self.device_transport.stop_app(&device, &package_name).await;

        let output = exercise_result?;
        for activity in output.activities {
            self.repo
                .save_activity(activity)
                .await
                .map_err(|e| StageError::Unknown(e.to_string()))?;
        }
        Ok(())
    }

    /// Runs the static analyzer and the already-captured dynamic activities
    /// through the two fan-in flags concurrently.
    async fn collect_and_analyze(
        &self,
        task_id: &TaskId,
        apk_name: &str,
        apk_path: &str,
    ) -> Result<(), StageError> {
        let now = self.clock.epoch_ms();
        self.repo
            .advance_stage(task_id, packlab_core::TaskStatus::Collecting, "collecting", progress::COLLECTING, now)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;

        let report = self.static_analyzer.analyze(task_id, apk_path).await?;

        if let Some(name) = &report.package_name {
            self.repo
                .update_package_name(task_id, name)
                .await
                .map_err(|e| StageError::Unknown(e.to_string()))?;
        }
        if let Some(name) = &report.app_name {
            self.repo
                .update_app_name(task_id, name)
                .await
                .map_err(|e| StageError::Unknown(e.to_string()))?;
        }
        self.repo
            .save_static_report(report.clone())
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;
        self.repo
            .mark_static_analysis_completed(task_id)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;
        self.repo
            .mark_dynamic_analysis_completed(task_id)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;

        let now = self.clock.epoch_ms();
        self.repo
            .advance_stage(
                task_id,
                packlab_core::TaskStatus::Collecting,
                "analysis_fan_in_complete",
                progress::ANALYSIS_DONE,
                now,
            )
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;

        self.run_domain_analysis(task_id, apk_name, &report).await;

        let now = self.clock.epoch_ms();
        self.repo
            .advance_stage(
                task_id,
                packlab_core::TaskStatus::Collecting,
                "domain_analysis",
                progress::DOMAIN_ANALYSIS,
                now,
            )
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;
        Ok(())
    }

    /// Domain/locality/registration failures never fail the task:
    /// log and move on.
    async fn run_domain_analysis(
        &self,
        task_id: &TaskId,
        apk_name: &str,
        report: &packlab_core::StaticReport,
    ) {
        let activities = self.repo.list_activities(task_id).await.unwrap_or_default();
        let dynamic_urls: Vec<String> = activities
            .iter()
            .flat_map(|a| a.flows.iter().map(|f| f.url.clone()))
            .collect();
        let package_name = report.package_name.clone().unwrap_or_default();
        let app_name = report.app_name.clone().unwrap_or_default();

        let lookup = packlab_domain::LocalityLookup {
            resolver: &self.domain_pipeline.resolver,
            locality: &self.domain_pipeline.locality,
            registration: &self.domain_pipeline.registration,
            cache: &self.domain_pipeline.cache,
        };
        let sdk_rules = self.repo.load_sdk_rules().await.unwrap_or_else(|err| {
            tracing::warn!(task_id = %task_id.as_str(), error = %err, "failed to load sdk rule catalog, proceeding without it");
            Vec::new()
        });

        if let Err(err) = packlab_domain::pipeline::run(
            self.repo.as_ref(),
            &lookup,
            task_id,
            &dynamic_urls,
            &report.static_urls,
            &package_name,
            apk_name,
            &app_name,
            &sdk_rules,
            &self.domain_pipeline.common_words,
        )
        .await
        {
            tracing::warn!(task_id = %task_id.as_str(), error = %err, "domain analysis failed, continuing");
        }
    }

    async fn should_stop(&self, task_id: &TaskId) -> Result<bool, StageError> {
        let task = self
            .repo
            .get_task(task_id)
            .await
            .map_err(|e| StageError::Unknown(e.to_string()))?;
        Ok(task.should_stop)
    }

    async fn cancel(&self, task_id: &TaskId, _reason: Option<String>) -> OrchestratorOutcome {
        let now = self.clock.epoch_ms();
        if let Err(err) = self.repo.mark_cancelled(task_id, now).await {
            tracing::error!(task_id = %task_id.as_str(), error = %err, "failed to persist cancellation");
        }
        OrchestratorOutcome::Cancelled
    }

    async fn classify(&self, task_id: &TaskId, err: StageError) -> OrchestratorOutcome {
        let failure_type = err.failure_type();
        let message = err.to_string();
        let retry_count = self
            .repo
            .get_task(task_id)
            .await
            .map(|t| t.retry_count)
            .unwrap_or(0);

        if failure_type.is_retryable(retry_count) {
            if let Err(e) = self.repo.increment_retry_count(task_id).await {
                tracing::error!(task_id = %task_id.as_str(), error = %e, "failed to increment retry count");
            }
            if let Err(e) = self.repo.reset_for_retry(task_id).await {
                tracing::error!(task_id = %task_id.as_str(), error = %e, "failed to reset task for retry");
            }
            OrchestratorOutcome::RetryableFailure {
                failure_type,
                message,
            }
        } else {
            let now = self.clock.epoch_ms();
            if let Err(e) = self
                .repo
                .update_failure(task_id, failure_type, &message, now)
                .await
            {
                tracing::error!(task_id = %task_id.as_str(), error = %e, "failed to persist terminal failure");
            }
            OrchestratorOutcome::TerminalFailure {
                failure_type,
                message,
            }
        }
    }

    fn device_for(&self, lease: &Lease) -> Result<packlab_core::DeviceConfig, StageError> {
        self.fleet
            .list()
            .into_iter()
            .find(|d| d.config.id == lease.device_id)
            .map(|d| d.config)
            .ok_or_else(|| StageError::Unknown("leased device vanished from fleet".into()))
    }

    async fn package_name_hint(&self, task_id: &TaskId) -> String {
        self.repo
            .get_task(task_id)
            .await
            .ok()
            .and_then(|t| t.package_name)
            .unwrap_or_default()
    }
}
