// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres-backed [`TaskRepository`].
//!
//! Queries are built at runtime with `sqlx::query`/`query_as` and `.bind()`
//! rather than the `query!`/`query_as!` macros: those require either a live
//! `DATABASE_URL` or a checked-in offline cache at build time, and the
//! listing query's `WHERE` clause is inherently dynamic (optional status
//! filter, optional search term) regardless.

use async_trait::async_trait;
use packlab_core::{
    ActivityRecord, AppDomainRow, Arch, DomainAnalysis, FailureType, FlowRecord, LocalitySource,
    RegistrationEntry, RegistrationResult, SdkRule, SdkRuleSource, SdkRuleStatus, StaticReport,
    Task, TaskConfig, TaskId, TaskStatus,
};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RepositoryError, Result};
use crate::repository::{
    DeleteAllConfirmation, ListPage, ListQuery, StatusCounts, StatusFilter, TaskDetail,
    TaskRepository,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connection pool wrapper. Construct with [`PgTaskRepository::connect`],
/// which runs pending migrations before returning.
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Used by integration tests that already hold a pool (e.g. one scoped
    /// to a throwaway schema via `sqlx::test`).
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn task_from_row(row: &sqlx::postgres::PgRow) -> Result<Task> {
    let status_str: String = row.try_get("status")?;
    let failure_str: String = row.try_get("failure_type")?;
    let required_arch: Option<String> = row.try_get("required_arch")?;
    Ok(Task {
        id: TaskId::new(row.try_get::<String, _>("id")?),
        apk_name: row.try_get("apk_name")?,
        apk_path: row.try_get("apk_path")?,
        required_arch: required_arch.as_deref().and_then(parse_arch),
        app_name: row.try_get("app_name")?,
        package_name: row.try_get("package_name")?,
        status: parse_status(&status_str),
        should_stop: row.try_get("should_stop")?,
        failure_type: parse_failure(&failure_str),
        error_message: row.try_get("error_message")?,
        retry_count: row.try_get::<i32, _>("retry_count")? as u32,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        started_at_ms: row
            .try_get::<Option<i64>, _>("started_at_ms")?
            .map(|v| v as u64),
        completed_at_ms: row
            .try_get::<Option<i64>, _>("completed_at_ms")?
            .map(|v| v as u64),
        current_step: row.try_get("current_step")?,
        progress_percent: row.try_get::<i16, _>("progress_percent")? as u8,
        static_analysis_completed: row.try_get("static_analysis_completed")?,
        dynamic_analysis_completed: row.try_get("dynamic_analysis_completed")?,
    })
}

fn arch_str(arch: Arch) -> &'static str {
    match arch {
        Arch::Arm => "arm",
        Arch::Arm64 => "arm64",
        Arch::X86 => "x86",
        Arch::X86_64 => "x86_64",
    }
}

fn parse_arch(s: &str) -> Option<Arch> {
    match s {
        "arm" => Some(Arch::Arm),
        "arm64" => Some(Arch::Arm64),
        "x86" => Some(Arch::X86),
        "x86_64" => Some(Arch::X86_64),
        _ => None,
    }
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Queued => "queued",
        TaskStatus::Installing => "installing",
        TaskStatus::Running => "running",
        TaskStatus::Collecting => "collecting",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> TaskStatus {
    match s {
        "installing" => TaskStatus::Installing,
        "running" => TaskStatus::Running,
        "collecting" => TaskStatus::Collecting,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Queued,
    }
}

fn failure_str(failure: FailureType) -> &'static str {
    match failure {
        FailureType::None => "none",
        FailureType::DeviceTimeout => "device_timeout",
        FailureType::ArmDeviceOnly => "arm_device_only",
        FailureType::InstallFailed => "install_failed",
        FailureType::ConnectionError => "connection_error",
        FailureType::FridaError => "frida_error",
        FailureType::ProxyError => "proxy_error",
        FailureType::AnalysisError => "analysis_error",
        FailureType::Timeout => "timeout",
        FailureType::Unknown => "unknown",
    }
}

fn parse_failure(s: &str) -> FailureType {
    match s {
        "device_timeout" => FailureType::DeviceTimeout,
        "arm_device_only" => FailureType::ArmDeviceOnly,
        "install_failed" => FailureType::InstallFailed,
        "connection_error" => FailureType::ConnectionError,
        "frida_error" => FailureType::FridaError,
        "proxy_error" => FailureType::ProxyError,
        "analysis_error" => FailureType::AnalysisError,
        "timeout" => FailureType::Timeout,
        "unknown" => FailureType::Unknown,
        _ => FailureType::None,
    }
}

fn parse_sdk_rule_status(s: &str) -> SdkRuleStatus {
    match s {
        "pending" => SdkRuleStatus::Pending,
        "disabled" => SdkRuleStatus::Disabled,
        _ => SdkRuleStatus::Active,
    }
}

fn parse_sdk_rule_source(s: &str) -> SdkRuleSource {
    match s {
        "discovered" => SdkRuleSource::Discovered,
        "manual" => SdkRuleSource::Manual,
        _ => SdkRuleSource::Builtin,
    }
}

fn sdk_rule_from_row(row: &sqlx::postgres::PgRow) -> Result<SdkRule> {
    let status_str: String = row.try_get("status")?;
    let source_str: String = row.try_get("source")?;
    Ok(SdkRule {
        domain: row.try_get("domain")?,
        category: row.try_get("category")?,
        sub_category: row.try_get("sub_category")?,
        provider: row.try_get("provider")?,
        confidence: row.try_get("confidence")?,
        priority: row.try_get("priority")?,
        status: parse_sdk_rule_status(&status_str),
        source: parse_sdk_rule_source(&source_str),
        discover_count: row.try_get::<i32, _>("discover_count")? as u32,
        first_seen_task_id: row.try_get("first_seen_task_id")?,
    })
}

fn locality_str(source: LocalitySource) -> &'static str {
    match source {
        LocalitySource::Primary => "primary",
        LocalitySource::Secondary => "secondary",
        LocalitySource::Unresolved => "unresolved",
    }
}

fn parse_locality(s: &str) -> LocalitySource {
    match s {
        "primary" => LocalitySource::Primary,
        "secondary" => LocalitySource::Secondary,
        _ => LocalitySource::Unresolved,
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn create_task(&self, config: TaskConfig, dedup_within_seconds: u64) -> Result<Task> {
        let mut tx = self.pool.begin().await?;

        let window_ms = (dedup_within_seconds.saturating_mul(1000)) as i64;
        let duplicate: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM tasks WHERE apk_name = $1 \
             AND (EXTRACT(EPOCH FROM now()) * 1000)::bigint - created_at_ms <= $2 \
             LIMIT 1",
        )
        .bind(&config.apk_name)
        .bind(window_ms)
        .fetch_optional(&mut *tx)
        .await?;
        if duplicate.is_some() {
            return Err(RepositoryError::DuplicateTask(config.apk_name));
        }

        let created_at_ms: i64 =
            sqlx::query_scalar("SELECT (EXTRACT(EPOCH FROM now()) * 1000)::bigint")
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            "INSERT INTO tasks (id, apk_name, apk_path, required_arch, status, failure_type, created_at_ms, current_step, progress_percent) \
             VALUES ($1, $2, $3, $4, 'queued', 'none', $5, 'queued', 0)",
        )
        .bind(config.id.as_str())
        .bind(&config.apk_name)
        .bind(&config.apk_path)
        .bind(config.required_arch.map(arch_str))
        .bind(created_at_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Task::new(config, created_at_ms as u64))
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::TaskNotFound(id.as_str().to_string()))?;
        task_from_row(&row)
    }

    async fn get_task_detail(&self, id: &TaskId) -> Result<TaskDetail> {
        let task = self.get_task(id).await?;
        let activities = self.list_activities(id).await?;
        let static_report = self.get_static_report(id).await?;
        let domain_analysis = self.get_domain_analysis(id).await?;
        Ok(TaskDetail {
            task,
            activities,
            static_report,
            domain_analysis,
        })
    }

    async fn mark_static_analysis_completed(&self, id: &TaskId) -> Result<()> {
        let n = sqlx::query("UPDATE tasks SET static_analysis_completed = TRUE WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        require_found(id, n)
    }

    async fn mark_dynamic_analysis_completed(&self, id: &TaskId) -> Result<()> {
        let n = sqlx::query("UPDATE tasks SET dynamic_analysis_completed = TRUE WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        require_found(id, n)
    }

    async fn update_app_name(&self, id: &TaskId, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let n = sqlx::query("UPDATE tasks SET app_name = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        require_found(id, n)
    }

    async fn update_package_name(&self, id: &TaskId, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let n = sqlx::query("UPDATE tasks SET package_name = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        require_found(id, n)
    }

    async fn advance_stage(
        &self,
        id: &TaskId,
        status: TaskStatus,
        step: &str,
        progress_percent: u8,
        now_ms: u64,
    ) -> Result<()> {
        let n = sqlx::query(
            "UPDATE tasks SET status = $2, current_step = $3, progress_percent = $4, \
             started_at_ms = CASE WHEN $2 <> 'queued' THEN COALESCE(started_at_ms, $5) ELSE started_at_ms END \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(status_str(status))
        .bind(step)
        .bind(progress_percent as i16)
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();
        require_found(id, n)
    }

    async fn update_failure(
        &self,
        id: &TaskId,
        failure_type: FailureType,
        message: &str,
        completed_at_ms: u64,
    ) -> Result<()> {
        let n = sqlx::query(
            "UPDATE tasks SET status = 'failed', failure_type = $2, error_message = $3, completed_at_ms = $4, progress_percent = 0 \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(failure_str(failure_type))
        .bind(message)
        .bind(completed_at_ms as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();
        require_found(id, n)
    }

    async fn mark_cancelled(&self, id: &TaskId, completed_at_ms: u64) -> Result<()> {
        let n = sqlx::query(
            "UPDATE tasks SET status = 'cancelled', completed_at_ms = $2, progress_percent = 0 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(completed_at_ms as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();
        require_found(id, n)
    }

    async fn mark_task_fully_completed(&self, id: &TaskId, completed_at_ms: u64) -> Result<()> {
        let n = sqlx::query(
            "UPDATE tasks SET status = 'completed', progress_percent = 100, current_step = 'completed', completed_at_ms = $2 \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(completed_at_ms as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();
        require_found(id, n)
    }

    async fn increment_retry_count(&self, id: &TaskId) -> Result<u32> {
        let count: i32 = sqlx::query_scalar(
            "UPDATE tasks SET retry_count = retry_count + 1 WHERE id = $1 RETURNING retry_count",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::TaskNotFound(id.as_str().to_string()))?;
        Ok(count as u32)
    }

    async fn reset_for_retry(&self, id: &TaskId) -> Result<()> {
        let n = sqlx::query(
            "UPDATE tasks SET status = 'queued', should_stop = FALSE, error_message = NULL, \
             failure_type = 'none', started_at_ms = NULL, completed_at_ms = NULL, \
             current_step = 'queued', progress_percent = 0, static_analysis_completed = FALSE, \
             dynamic_analysis_completed = FALSE WHERE id = $1",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        require_found(id, n)
    }

    async fn list_tasks(&self, query: ListQuery) -> Result<ListPage> {
        let mut where_clauses: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(filter) = &query.status_filter {
            match filter {
                StatusFilter::Equal(s) => {
                    where_clauses.push(format!("status = ${}", binds.len() + 1));
                    binds.push(status_str(*s).to_string());
                }
                StatusFilter::NotEqual(s) => {
                    where_clauses.push(format!("status <> ${}", binds.len() + 1));
                    binds.push(status_str(*s).to_string());
                }
            }
        }
        let search_bind_idx = if let Some(search) = &query.search {
            if !search.is_empty() {
                let idx = binds.len() + 1;
                where_clauses.push(format!(
                    "(apk_name ILIKE ${idx} OR app_name ILIKE ${idx} OR package_name ILIKE ${idx})"
                ));
                binds.push(format!("%{search}%"));
                Some(idx)
            } else {
                None
            }
        } else {
            None
        };
        let _ = search_bind_idx;

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM tasks {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &binds {
            count_query = count_query.bind(b);
        }
        let total = count_query.fetch_one(&self.pool).await? as u64;

        let page_size = query.page_size.max(1) as i64;
        let offset = (query.page as i64) * page_size;
        let order_sql = "ORDER BY \
            CASE status \
                WHEN 'running' THEN 0 WHEN 'installing' THEN 1 WHEN 'collecting' THEN 2 \
                WHEN 'completed' THEN 3 WHEN 'failed' THEN 4 ELSE 5 END, \
            completed_at_ms DESC NULLS LAST, created_at_ms DESC";
        let list_sql = format!(
            "SELECT * FROM tasks {where_sql} {order_sql} LIMIT ${} OFFSET ${}",
            binds.len() + 1,
            binds.len() + 2
        );
        let mut list_query = sqlx::query(&list_sql);
        for b in &binds {
            list_query = list_query.bind(b);
        }
        list_query = list_query.bind(page_size).bind(offset);
        let rows = list_query.fetch_all(&self.pool).await?;
        let tasks = rows
            .iter()
            .map(task_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(ListPage { tasks, total })
    }

    async fn list_queued_oldest_first(&self, page: u32, page_size: u32) -> Result<ListPage> {
        let page_size_i = page_size.max(1) as i64;
        let offset = (page as i64) * page_size_i;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = 'queued'")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE status = 'queued' ORDER BY created_at_ms ASC LIMIT $1 OFFSET $2",
        )
        .bind(page_size_i)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let tasks = rows
            .iter()
            .map(task_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(ListPage {
            tasks,
            total: total as u64,
        })
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut by_status = HashMap::new();
        let mut total = 0u64;
        for row in rows {
            let status_str: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            total += n as u64;
            by_status.insert(parse_status(&status_str), n as u64);
        }
        Ok(StatusCounts { by_status, total })
    }

    async fn has_recent_task_for_apk(&self, apk_name: &str, within_seconds: u64) -> Result<bool> {
        let window_ms = (within_seconds.saturating_mul(1000)) as i64;
        let hit: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM tasks WHERE apk_name = $1 \
             AND (EXTRACT(EPOCH FROM now()) * 1000)::bigint - created_at_ms <= $2 LIMIT 1",
        )
        .bind(apk_name)
        .bind(window_ms)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hit.is_some())
    }

    async fn save_activity(&self, record: ActivityRecord) -> Result<()> {
        let flows_json = serde_json::to_value(&record.flows).unwrap_or_default();
        sqlx::query(
            "INSERT INTO task_activities (task_id, activity_name, screenshot_path, ui_hierarchy_path, flows_json) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.task_id.as_str())
        .bind(&record.activity_name)
        .bind(&record.screenshot_path)
        .bind(&record.ui_hierarchy_path)
        .bind(flows_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_activities(&self, task_id: &TaskId) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            "SELECT activity_name, screenshot_path, ui_hierarchy_path, flows_json \
             FROM task_activities WHERE task_id = $1 ORDER BY row_id ASC",
        )
        .bind(task_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let flows_json: serde_json::Value = row.try_get("flows_json")?;
            let flows: Vec<FlowRecord> = serde_json::from_value(flows_json).unwrap_or_default();
            out.push(ActivityRecord {
                task_id: task_id.clone(),
                activity_name: row.try_get("activity_name")?,
                screenshot_path: row.try_get("screenshot_path")?,
                ui_hierarchy_path: row.try_get("ui_hierarchy_path")?,
                flows,
            });
        }
        Ok(out)
    }

    async fn save_static_report(&self, report: StaticReport) -> Result<()> {
        let static_urls_json = serde_json::to_value(&report.static_urls).unwrap_or_default();
        sqlx::query(
            "INSERT INTO task_static_reports \
             (task_id, package_name, app_name, activity_count, service_count, url_count, domain_count, packer_detected, basic_info, deep_analysis, static_urls_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (task_id) DO UPDATE SET \
             package_name = EXCLUDED.package_name, app_name = EXCLUDED.app_name, \
             activity_count = EXCLUDED.activity_count, service_count = EXCLUDED.service_count, \
             url_count = EXCLUDED.url_count, domain_count = EXCLUDED.domain_count, \
             packer_detected = EXCLUDED.packer_detected, basic_info = EXCLUDED.basic_info, \
             deep_analysis = EXCLUDED.deep_analysis, static_urls_json = EXCLUDED.static_urls_json",
        )
        .bind(report.task_id.as_str())
        .bind(&report.package_name)
        .bind(&report.app_name)
        .bind(report.activity_count as i32)
        .bind(report.service_count as i32)
        .bind(report.url_count as i32)
        .bind(report.domain_count as i32)
        .bind(&report.packer_detected)
        .bind(&report.basic_info)
        .bind(&report.deep_analysis)
        .bind(static_urls_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_static_report(&self, task_id: &TaskId) -> Result<Option<StaticReport>> {
        let row = sqlx::query("SELECT * FROM task_static_reports WHERE task_id = $1")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let static_urls_json: serde_json::Value = row.try_get("static_urls_json")?;
        Ok(Some(StaticReport {
            task_id: task_id.clone(),
            package_name: row.try_get("package_name")?,
            app_name: row.try_get("app_name")?,
            activity_count: row.try_get::<i32, _>("activity_count")? as u32,
            service_count: row.try_get::<i32, _>("service_count")? as u32,
            url_count: row.try_get::<i32, _>("url_count")? as u32,
            domain_count: row.try_get::<i32, _>("domain_count")? as u32,
            packer_detected: row.try_get("packer_detected")?,
            basic_info: row.try_get("basic_info")?,
            deep_analysis: row.try_get("deep_analysis")?,
            static_urls: serde_json::from_value(static_urls_json).unwrap_or_default(),
        }))
    }

    async fn save_domain_analysis(&self, analysis: DomainAnalysis) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let domain_set_json = serde_json::to_value(&analysis.domain_set).unwrap_or_default();
        let registration_json = analysis
            .registration
            .as_ref()
            .map(registration_to_json);

        sqlx::query(
            "INSERT INTO task_domain_analysis (task_id, primary_domain, confidence, domain_set_json, registration_json) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (task_id) DO UPDATE SET \
             primary_domain = EXCLUDED.primary_domain, confidence = EXCLUDED.confidence, \
             domain_set_json = EXCLUDED.domain_set_json, registration_json = EXCLUDED.registration_json",
        )
        .bind(analysis.task_id.as_str())
        .bind(&analysis.primary_domain)
        .bind(analysis.confidence)
        .bind(domain_set_json)
        .bind(registration_json)
        .execute(&mut *tx)
        .await?;

        // Rebuilt wholesale on every re-analysis: delete then reinsert.
        sqlx::query("DELETE FROM task_app_domains WHERE task_id = $1")
            .bind(analysis.task_id.as_str())
            .execute(&mut *tx)
            .await?;
        for row in &analysis.app_domains {
            sqlx::query(
                "INSERT INTO task_app_domains (task_id, domain, ip, province, city, isp, source) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(row.task_id.as_str())
            .bind(&row.domain)
            .bind(&row.ip)
            .bind(&row.province)
            .bind(&row.city)
            .bind(&row.isp)
            .bind(locality_str(row.source))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_domain_analysis(&self, task_id: &TaskId) -> Result<Option<DomainAnalysis>> {
        let row = sqlx::query("SELECT * FROM task_domain_analysis WHERE task_id = $1")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let domain_set_json: serde_json::Value = row.try_get("domain_set_json")?;
        let registration_json: Option<serde_json::Value> = row.try_get("registration_json")?;

        let app_domain_rows = sqlx::query(
            "SELECT domain, ip, province, city, isp, source FROM task_app_domains WHERE task_id = $1 ORDER BY row_id ASC",
        )
        .bind(task_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        let mut app_domains = Vec::with_capacity(app_domain_rows.len());
        for r in app_domain_rows {
            let source_str: String = r.try_get("source")?;
            app_domains.push(AppDomainRow {
                task_id: task_id.clone(),
                domain: r.try_get("domain")?,
                ip: r.try_get("ip")?,
                province: r.try_get("province")?,
                city: r.try_get("city")?,
                isp: r.try_get("isp")?,
                source: parse_locality(&source_str),
            });
        }

        Ok(Some(DomainAnalysis {
            task_id: task_id.clone(),
            primary_domain: row.try_get("primary_domain")?,
            confidence: row.try_get("confidence")?,
            domain_set: serde_json::from_value(domain_set_json).unwrap_or_default(),
            registration: registration_json.and_then(|v| registration_from_json(&v)),
            app_domains,
        }))
    }

    async fn load_sdk_rules(&self) -> Result<Vec<SdkRule>> {
        let rows = sqlx::query("SELECT * FROM third_party_sdk_rules ORDER BY priority DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(sdk_rule_from_row).collect()
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        // Child rows cascade via FK ON DELETE CASCADE.
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_tasks(&self, ids: &[TaskId]) -> Result<()> {
        let ids: Vec<String> = ids.iter().map(|i| i.as_str().to_string()).collect();
        sqlx::query("DELETE FROM tasks WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_tasks(&self, _confirm: DeleteAllConfirmation) -> Result<()> {
        sqlx::query("DELETE FROM tasks").execute(&self.pool).await?;
        Ok(())
    }
}

fn require_found(id: &TaskId, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(RepositoryError::TaskNotFound(id.as_str().to_string()))
    } else {
        Ok(())
    }
}

fn registration_to_json(r: &RegistrationResult) -> serde_json::Value {
    serde_json::to_value(r).unwrap_or(serde_json::Value::Null)
}

fn registration_from_json(v: &serde_json::Value) -> Option<RegistrationResult> {
    serde_json::from_value(v.clone()).ok()
}

/// Parses a Postgres connection string eagerly so config loading fails fast,
/// matching the rest of the workspace's preference for surfacing
/// configuration mistakes at startup rather than at first query.
pub fn validate_database_url(url: &str) -> Result<()> {
    sqlx::postgres::PgConnectOptions::from_str(url)
        .map(|_| ())
        .map_err(RepositoryError::Database)
}
