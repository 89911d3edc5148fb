// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `packlab task list/show/retry` — read-only and retry-only views onto the
//! same Postgres rows the daemon owns. No orchestration logic lives here;
//! a retry only resets the row and republishes the message the consumer
//! would have seen on first submission.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use packlab_core::{TaskId, TaskStatus};
use packlab_engine::TaskMessage;
use packlab_storage::{ListQuery, StatusFilter};

use crate::color;
use crate::context::connect;
use crate::output::{format_time_ago, OutputFormat};
use crate::table::{Column, Table};

#[derive(Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// List tasks, most recently created first
    List {
        /// Only show tasks in this status
        #[arg(long)]
        status: Option<TaskStatusArg>,
        /// Substring search over apk/app/package name
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long = "page-size", default_value = "50")]
        page_size: u32,
    },
    /// Show everything recorded for one task
    Show {
        id: String,
    },
    /// Reset a task to queued and republish it to the broker
    Retry {
        id: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum TaskStatusArg {
    Queued,
    Installing,
    Running,
    Collecting,
    Completed,
    Failed,
    Cancelled,
}

impl From<TaskStatusArg> for TaskStatus {
    fn from(v: TaskStatusArg) -> Self {
        match v {
            TaskStatusArg::Queued => TaskStatus::Queued,
            TaskStatusArg::Installing => TaskStatus::Installing,
            TaskStatusArg::Running => TaskStatus::Running,
            TaskStatusArg::Collecting => TaskStatus::Collecting,
            TaskStatusArg::Completed => TaskStatus::Completed,
            TaskStatusArg::Failed => TaskStatus::Failed,
            TaskStatusArg::Cancelled => TaskStatus::Cancelled,
        }
    }
}

pub async fn handle(command: TaskCommand, format: OutputFormat) -> Result<()> {
    match command {
        TaskCommand::List {
            status,
            search,
            page,
            page_size,
        } => list(status, search, page, page_size, format).await,
        TaskCommand::Show { id } => show(&id, format).await,
        TaskCommand::Retry { id } => retry(&id, format).await,
    }
}

async fn list(
    status: Option<TaskStatusArg>,
    search: Option<String>,
    page: u32,
    page_size: u32,
    format: OutputFormat,
) -> Result<()> {
    let (_config, repo) = connect().await?;
    let query = ListQuery {
        page,
        page_size,
        status_filter: status.map(|s| StatusFilter::Equal(s.into())),
        search,
        eager_load_children: false,
    };
    let result = repo.list_tasks(query).await.context("listing tasks")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "total": result.total,
                "tasks": result.tasks,
            }))?);
        }
        OutputFormat::Text => {
            let mut table = Table::new(vec![
                Column::left("ID"),
                Column::status("STATUS"),
                Column::left("APK"),
                Column::right("PROGRESS"),
                Column::muted("CREATED"),
            ]);
            for task in &result.tasks {
                table.row(vec![
                    task.id.as_str().to_string(),
                    task.status.to_string(),
                    task.apk_name.clone(),
                    format!("{}%", task.progress_percent),
                    format_time_ago(task.created_at_ms),
                ]);
            }
            table.render(&mut std::io::stdout());
            println!("{}", color::muted(&format!("{} of {} total", result.tasks.len(), result.total)));
        }
    }
    Ok(())
}

async fn show(id: &str, format: OutputFormat) -> Result<()> {
    let (_config, repo) = connect().await?;
    let detail = repo
        .get_task_detail(&TaskId::new(id))
        .await
        .with_context(|| format!("loading task {id}"))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "task": detail.task,
                "activity_count": detail.activities.len(),
                "static_report": detail.static_report,
                "domain_analysis": detail.domain_analysis,
            }))?);
        }
        OutputFormat::Text => {
            let task = &detail.task;
            println!("{}: {}", color::header("id"), task.id.as_str());
            println!("{}: {}", color::header("status"), color::status(&task.status.to_string()));
            println!("{}: {}", color::header("apk"), task.apk_name);
            println!("{}: {}", color::header("step"), task.current_step);
            println!("{}: {}%", color::header("progress"), task.progress_percent);
            println!("{}: {}", color::header("retries"), task.retry_count);
            if let Some(app_name) = &task.app_name {
                println!("{}: {}", color::header("app_name"), app_name);
            }
            if let Some(package_name) = &task.package_name {
                println!("{}: {}", color::header("package_name"), package_name);
            }
            if let Some(msg) = &task.error_message {
                println!("{}: {}", color::header("error"), msg);
            }
            println!("{}: {}", color::header("activities"), detail.activities.len());
            println!(
                "{}: {}",
                color::header("static_report"),
                if detail.static_report.is_some() { "present" } else { "none" }
            );
            println!(
                "{}: {}",
                color::header("domain_analysis"),
                if detail.domain_analysis.is_some() { "present" } else { "none" }
            );
        }
    }
    Ok(())
}

async fn retry(id: &str, format: OutputFormat) -> Result<()> {
    let (config, repo) = connect().await?;
    let task_id = TaskId::new(id);
    let task = repo.get_task(&task_id).await.with_context(|| format!("loading task {id}"))?;

    repo.reset_for_retry(&task_id).await.context("resetting task for retry")?;

    let broker = packlab_broker::AmqpBroker::connect(packlab_broker::BrokerConfig {
        host: config.rabbitmq.host.clone(),
        port: config.rabbitmq.port,
        user: config.rabbitmq.user.clone(),
        password: config.rabbitmq.password.clone(),
        vhost: config.rabbitmq.vhost.clone(),
        queue: config.rabbitmq.queue.clone(),
        prefetch: 1,
    })
    .await
    .context("connecting to broker to republish task")?;

    let message = TaskMessage {
        task_id: task_id.clone(),
        apk_name: task.apk_name.clone(),
        apk_path: task.apk_path.clone(),
    };
    broker.publish(&message.encode()).await.context("republishing task")?;
    broker.close().await.ok();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "id": task_id.as_str(), "status": "queued" }));
        }
        OutputFormat::Text => {
            println!("{} {} -> queued", color::green("retried"), task_id.as_str());
        }
    }
    Ok(())
}
