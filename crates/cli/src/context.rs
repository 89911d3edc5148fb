// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup for commands that need the daemon's view of the world:
//! its config file and the Postgres-backed task repository it writes to.

use std::sync::Arc;

use anyhow::{Context, Result};
use packlab_daemon::Config;
use packlab_storage::{PgTaskRepository, TaskRepository};

fn database_url(config: &Config) -> String {
    format!(
        "postgres://{}:{}@{}:{}/{}",
        config.database.user,
        config.database.password,
        config.database.host,
        config.database.port,
        config.database.db_name
    )
}

/// Loads the daemon's config (`PACKLAB_CONFIG`, or the platform config dir)
/// and connects to the same Postgres database it persists tasks to.
pub async fn connect() -> Result<(Config, Arc<dyn TaskRepository>)> {
    let config = load_config()?;
    let repo = PgTaskRepository::connect(&database_url(&config), 5)
        .await
        .context("failed to connect to the task database")?;
    Ok((config, Arc::new(repo)))
}

/// Loads the daemon's config without opening a database connection, for
/// commands that only need static configuration (e.g. the device list).
pub fn load_config() -> Result<Config> {
    Config::load().context("failed to load daemon config")
}
