// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! packlabd — the analysis-task orchestration daemon.
//!
//! Architecture:
//! - Queue Consumer: pulls task messages off the broker, hands each to the
//!   worker pool
//! - Worker Pool: bounds how many task orchestrations run concurrently
//! - Orchestrator: drives one task through install/run/collect/domain stages
//!   against a leased device

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod consumer;
mod env;

use std::sync::Arc;
use std::time::Duration;

use packlab_adapters::{AdbTransport, LocalityApiConfig, LocalityClient, MultiResolver, RegistrationApiConfig, RegistrationClient};
use packlab_core::{Clock, SystemClock};
use packlab_domain::LocalityCache;
use packlab_engine::{
    AdbExerciseController, DomainPipeline, ExternalStaticAnalyzer, Orchestrator, OrchestratorConfig, Reconciler, WorkerPool,
};
use packlab_fleet::{FleetManager, HealthPolicy, RestPolicy};
use packlab_storage::PgTaskRepository;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::consumer::Consumer;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const DEVICE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);
const EXERCISE_DURATION: Duration = Duration::from_secs(60);
const STATIC_ANALYZER_TIMEOUT: Duration = Duration::from_secs(300);
const SCREEN_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CERT_PATH_ENV: &str = "PACKLAB_CA_CERT_PATH";
const DEFAULT_CERT_PATH: &str = "/etc/packlab/ca.pem";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("packlabd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("packlabd {}", env!("CARGO_PKG_VERSION"));
                println!("Analysis-task orchestration daemon.");
                println!();
                println!("USAGE:");
                println!("    packlabd");
                println!();
                println!("packlabd consumes queued analysis tasks from RabbitMQ, runs each");
                println!("through the orchestrator against the leased device fleet, and");
                println!("persists results to Postgres. Configuration is read from");
                println!("PACKLAB_CONFIG or <config_dir>/packlab/config.toml.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: packlabd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    let log_path = env::log_dir().join("packlabd.log");
    rotate_log_if_needed(&log_path);
    let log_guard = setup_logging(&log_path)?;

    info!("starting packlabd");

    let repo = Arc::new(
        PgTaskRepository::connect(&database_url(&config), 10)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to connect to database");
                e
            })?,
    );

    let broker = packlab_broker::AmqpBroker::connect(packlab_broker::BrokerConfig {
        host: config.rabbitmq.host.clone(),
        port: config.rabbitmq.port,
        user: config.rabbitmq.user.clone(),
        password: config.rabbitmq.password.clone(),
        vhost: config.rabbitmq.vhost.clone(),
        queue: config.rabbitmq.queue.clone(),
        prefetch: config.worker_concurrency as u16,
    })
    .await
    .map_err(|e| {
        error!(error = %e, "failed to connect to broker");
        e
    })?;

    let transport = Arc::new(AdbTransport);

    let fleet = Arc::new(FleetManager::new(
        config.devices.clone(),
        transport.clone(),
        SystemClock,
        RestPolicy::default(),
        HealthPolicy {
            consecutive_failure_threshold: config.health_check_threshold,
        },
    ));

    let health_cancel = CancellationToken::new();
    let _health_check = fleet.clone().start_health_check(HEALTH_CHECK_INTERVAL, health_cancel.clone());

    let cert_path = std::env::var(CERT_PATH_ENV).unwrap_or_else(|_| DEFAULT_CERT_PATH.to_string());
    let _cert_install = packlab_fleet::cert::spawn(transport.clone(), config.devices.clone(), cert_path);

    let resolver = MultiResolver::new(vec![
        MultiResolver::named_resolver("telecom", "114.114.114.114".parse()?)?,
        MultiResolver::named_resolver("mobile", "211.136.192.6".parse()?)?,
    ]);
    let locality = LocalityClient::new(LocalityApiConfig {
        primary_url: config.locality.primary_url.clone(),
        secondary_url: config.locality.secondary_url.clone(),
        token: config.locality.token.clone(),
    })?;
    let registration = RegistrationClient::new(RegistrationApiConfig {
        api_url: config.beian.api_url.clone(),
        api_key: config.beian.api_key.clone(),
        api_version: config.beian.api_version.clone(),
    })?;
    let domain_pipeline = Arc::new(DomainPipeline {
        resolver,
        locality,
        registration,
        cache: LocalityCache::new(),
        common_words: config.common_words.clone(),
    });

    let orchestrator = Arc::new(Orchestrator {
        repo: repo.clone(),
        fleet: fleet.clone(),
        device_transport: transport.clone(),
        exercise: Arc::new(AdbExerciseController {
            screen_interval: SCREEN_POLL_INTERVAL,
        }),
        static_analyzer: Arc::new(ExternalStaticAnalyzer {
            binary_path: config.apk_dir.join("../bin/static-analyzer").display().to_string(),
            timeout: STATIC_ANALYZER_TIMEOUT,
        }),
        domain_pipeline,
        clock: SystemClock,
        config: OrchestratorConfig {
            device_acquire_timeout: DEVICE_ACQUIRE_TIMEOUT,
            exercise_duration: EXERCISE_DURATION,
        },
    });

    let pool = Arc::new(WorkerPool::new(config.worker_concurrency));

    tokio::spawn(stats_ticker(pool.clone(), fleet.clone()));

    info!("reconciling in-flight tasks from prior run");
    let reconciler = Reconciler {
        repo: repo.clone(),
        broker: broker.clone(),
    };
    if let Err(err) = reconciler.run(SystemClock.epoch_ms()).await {
        error!(error = %err, "reconciliation failed; continuing with queue as-is");
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let consume_handle = tokio::spawn({
        let consumer = Consumer::new(broker.clone(), pool.clone(), orchestrator.clone());
        async move {
            if let Err(err) = consumer.run("packlabd").await {
                error!(error = %err, "consume loop exited");
            }
        }
    });

    println!("READY");
    info!("packlabd ready, consuming from {}", config.rabbitmq.queue);

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    health_cancel.cancel();
    consume_handle.abort();

    let grace = env::shutdown_grace();
    info!(?grace, "draining in-flight tasks");
    if tokio::time::timeout(grace, pool.stop()).await.is_err() {
        error!("shutdown grace period elapsed with tasks still in flight");
    }

    if let Err(err) = broker.close().await {
        error!(error = %err, "error closing broker connection during shutdown");
    }

    info!("packlabd stopped");
    drop(log_guard);
    Ok(())
}

/// Periodically logs worker-pool and fleet occupancy so operators can watch
/// daemon load without querying the database directly.
async fn stats_ticker<C: Clock>(pool: Arc<WorkerPool>, fleet: Arc<FleetManager<C>>) {
    let mut interval = tokio::time::interval(env::stats_interval());
    loop {
        interval.tick().await;
        info!(
            worker_concurrency = pool.concurrency(),
            pool_stopped = pool.is_stopped(),
            device_count = fleet.count(),
            "stats snapshot"
        );
    }
}

fn database_url(config: &Config) -> String {
    format!(
        "postgres://{}:{}@{}:{}/{}",
        config.database.user, config.database.password, config.database.host, config.database.port, config.database.db_name
    )
}

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotates `packlabd.log` if it exceeds [`MAX_LOG_SIZE`]. Best-effort:
/// rotation failures are silently ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }
    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    log_path: &std::path::Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let parent = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("packlabd.log"));
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_env("PACKLAB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
