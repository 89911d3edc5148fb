// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `packlab device list` — the configured fleet, as the daemon will read it
//! on next startup. Live health state lives only in the daemon's in-memory
//! `FleetManager`; this only reflects what's on disk.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::context::load_config;
use crate::output::OutputFormat;
use crate::table::{Column, Table};

#[derive(Args)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommand,
}

#[derive(Subcommand)]
pub enum DeviceCommand {
    /// List configured fleet devices
    List,
}

pub async fn handle(command: DeviceCommand, format: OutputFormat) -> Result<()> {
    match command {
        DeviceCommand::List => list(format),
    }
}

fn list(format: OutputFormat) -> Result<()> {
    let config = load_config()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config.devices)?);
        }
        OutputFormat::Text => {
            let mut table = Table::new(vec![
                Column::left("ID"),
                Column::left("ADB_TARGET"),
                Column::left("ARCH"),
                Column::muted("PROXY"),
            ]);
            for device in &config.devices {
                table.row(vec![
                    device.id.as_str().to_string(),
                    device.adb_target.clone(),
                    device.arch.to_string(),
                    format!("{}:{}", device.proxy_host, device.proxy_port),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}
