// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `packlab queue stats` — per-status task counts. The broker itself only
//! exposes publish/consume, not queue depth, so this reports the same
//! status breakdown the daemon uses to decide what's left to do.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::context::connect;
use crate::output::OutputFormat;
use crate::table::{Column, Table};

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Show task counts by status
    Stats,
}

pub async fn handle(command: QueueCommand, format: OutputFormat) -> Result<()> {
    match command {
        QueueCommand::Stats => stats(format).await,
    }
}

async fn stats(format: OutputFormat) -> Result<()> {
    let (_config, repo) = connect().await?;
    let counts = repo.status_counts().await.context("loading status counts")?;

    match format {
        OutputFormat::Json => {
            let by_status: std::collections::BTreeMap<String, u64> = counts
                .by_status
                .iter()
                .map(|(status, n)| (status.to_string(), *n))
                .collect();
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "total": counts.total,
                "by_status": by_status,
            }))?);
        }
        OutputFormat::Text => {
            let mut table = Table::new(vec![Column::status("STATUS"), Column::right("COUNT")]);
            let mut rows: Vec<(String, u64)> = counts
                .by_status
                .iter()
                .map(|(status, n)| (status.to_string(), *n))
                .collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            for (status, n) in rows {
                table.row(vec![status, n.to_string()]);
            }
            table.render(&mut std::io::stdout());
            println!("total: {}", counts.total);
        }
    }
    Ok(())
}
