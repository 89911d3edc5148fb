// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a single `Config` loaded once from TOML at
//! startup, with individual fields overridable by environment variable.
//! Nothing after construction re-reads the environment.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use packlab_core::{Arch, DeviceConfig, DeviceId};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("could not resolve a config directory and PACKLAB_CONFIG is unset")]
    NoConfigDir,
}

/// Raw TOML shape. Kept separate from [`Config`] so defaulting/derived
/// fields (e.g. parsed `Duration`s) don't need custom `Deserialize` impls.
#[derive(Debug, Deserialize)]
struct RawConfig {
    server: ServerSection,
    worker: WorkerSection,
    rabbitmq: RabbitmqSection,
    database: DatabaseSection,
    #[serde(default)]
    static_analysis: StaticAnalysisSection,
    #[serde(default)]
    beian: BeianSection,
    #[serde(default)]
    locality: LocalitySection,
    #[serde(default)]
    fleet: FleetSection,
    apk_dir: PathBuf,
    result_dir: PathBuf,
    data_dir: PathBuf,
    #[serde(default)]
    devices: Vec<FleetEntry>,
    #[serde(default)]
    common_words: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FleetSection {
    #[serde(default)]
    health_check: FleetHealthCheckSection,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            health_check: FleetHealthCheckSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FleetHealthCheckSection {
    #[serde(default = "default_health_check_threshold")]
    threshold: u32,
}

impl Default for FleetHealthCheckSection {
    fn default() -> Self {
        Self {
            threshold: default_health_check_threshold(),
        }
    }
}

fn default_health_check_threshold() -> u32 {
    3
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    port: u16,
}

#[derive(Debug, Deserialize)]
struct WorkerSection {
    concurrency: u32,
}

#[derive(Debug, Deserialize)]
struct RabbitmqSection {
    host: String,
    port: u16,
    user: String,
    password: String,
    vhost: String,
    queue: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseSection {
    #[serde(rename = "type")]
    kind: String,
    host: String,
    port: u16,
    user: String,
    password: String,
    db_name: String,
}

#[derive(Debug, Deserialize, Default)]
struct StaticAnalysisSection {
    #[serde(default)]
    hybrid: HybridSection,
}

#[derive(Debug, Deserialize, Default)]
struct HybridSection {
    #[serde(default)]
    force_deep_analysis: bool,
    #[serde(default)]
    deep_analysis_threshold: DeepAnalysisThreshold,
}

#[derive(Debug, Deserialize, Default)]
struct DeepAnalysisThreshold {
    #[serde(default)]
    file_size_mb: u32,
    #[serde(default)]
    activity_count: u32,
    #[serde(default)]
    enable_for_high_priority_packages: bool,
}

#[derive(Debug, Deserialize, Default)]
struct BeianSection {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    api_url: String,
    #[serde(default)]
    api_version: String,
    #[serde(default = "default_beian_timeout_secs")]
    timeout: u64,
}

fn default_beian_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Default)]
struct LocalitySection {
    #[serde(default)]
    primary_url: String,
    #[serde(default)]
    secondary_url: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct FleetEntry {
    id: String,
    adb_target: String,
    proxy_host: String,
    proxy_port: u16,
    mitm_container: String,
    mitm_api_port: u16,
    instrumentation_host: String,
    arch: Arch,
}

/// The resolved configuration, after env overrides are applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub worker_concurrency: u32,
    pub rabbitmq: RabbitmqConfig,
    pub database: DatabaseConfig,
    pub static_analysis: StaticAnalysisConfig,
    pub beian: BeianConfig,
    pub locality: LocalityConfig,
    pub apk_dir: PathBuf,
    pub result_dir: PathBuf,
    pub data_dir: PathBuf,
    pub devices: Vec<DeviceConfig>,
    pub health_check_threshold: u32,
    pub common_words: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct RabbitmqConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub queue: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct StaticAnalysisConfig {
    pub force_deep_analysis: bool,
    pub deep_analysis_file_size_mb: u32,
    pub deep_analysis_activity_count: u32,
    pub deep_analysis_enable_for_high_priority_packages: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BeianConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_url: String,
    pub api_version: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct LocalityConfig {
    pub primary_url: String,
    pub secondary_url: String,
    pub token: String,
}

/// Default common-words set for package-name matching, filtered out before
/// comparing an APK's package segments against a domain's registrable name.
/// Overridable via `common_words` in the config file.
fn default_common_words() -> HashSet<String> {
    [
        "app", "com", "www", "api", "mobile", "android", "net", "cn", "org", "io",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Loads the config file at `PACKLAB_CONFIG`, or `<config_dir>/packlab/config.toml`
    /// if unset, then applies env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_raw(raw).with_env_overrides())
    }

    fn from_raw(raw: RawConfig) -> Self {
        let devices = raw
            .devices
            .into_iter()
            .map(|e| DeviceConfig {
                id: DeviceId::new(e.id),
                adb_target: e.adb_target,
                proxy_host: e.proxy_host,
                proxy_port: e.proxy_port,
                mitm_container: e.mitm_container,
                mitm_api_port: e.mitm_api_port,
                instrumentation_host: e.instrumentation_host,
                arch: e.arch,
            })
            .collect();

        let common_words = if raw.common_words.is_empty() {
            default_common_words()
        } else {
            raw.common_words.into_iter().collect()
        };

        Self {
            server_port: raw.server.port,
            worker_concurrency: raw.worker.concurrency.max(1),
            rabbitmq: RabbitmqConfig {
                host: raw.rabbitmq.host,
                port: raw.rabbitmq.port,
                user: raw.rabbitmq.user,
                password: raw.rabbitmq.password,
                vhost: raw.rabbitmq.vhost,
                queue: raw.rabbitmq.queue,
            },
            database: DatabaseConfig {
                kind: raw.database.kind,
                host: raw.database.host,
                port: raw.database.port,
                user: raw.database.user,
                password: raw.database.password,
                db_name: raw.database.db_name,
            },
            static_analysis: StaticAnalysisConfig {
                force_deep_analysis: raw.static_analysis.hybrid.force_deep_analysis,
                deep_analysis_file_size_mb: raw.static_analysis.hybrid.deep_analysis_threshold.file_size_mb,
                deep_analysis_activity_count: raw.static_analysis.hybrid.deep_analysis_threshold.activity_count,
                deep_analysis_enable_for_high_priority_packages: raw
                    .static_analysis
                    .hybrid
                    .deep_analysis_threshold
                    .enable_for_high_priority_packages,
            },
            beian: BeianConfig {
                enabled: raw.beian.enabled,
                api_key: raw.beian.api_key,
                api_url: raw.beian.api_url,
                api_version: raw.beian.api_version,
                timeout: Duration::from_secs(raw.beian.timeout),
            },
            locality: LocalityConfig {
                primary_url: raw.locality.primary_url,
                secondary_url: raw.locality.secondary_url,
                token: raw.locality.token,
            },
            apk_dir: raw.apk_dir,
            result_dir: raw.result_dir,
            data_dir: raw.data_dir,
            devices,
            health_check_threshold: raw.fleet.health_check.threshold,
            common_words,
        }
    }

    /// Applies the small set of env overrides the daemon recognizes.
    fn with_env_overrides(mut self) -> Self {
        if let Some(port) = env_u16("PACKLAB_SERVER_PORT") {
            self.server_port = port;
        }
        if let Some(n) = env_u32("PACKLAB_WORKER_CONCURRENCY") {
            self.worker_concurrency = n.max(1);
        }
        if let Ok(host) = std::env::var("PACKLAB_RABBITMQ_HOST") {
            self.rabbitmq.host = host;
        }
        if let Ok(host) = std::env::var("PACKLAB_DATABASE_HOST") {
            self.database.host = host;
        }
        self
    }
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("PACKLAB_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|d| d.join("packlab").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        apk_dir = "/var/packlab/apks"
        result_dir = "/var/packlab/results"
        data_dir = "/var/packlab/data"

        [server]
        port = 8080

        [worker]
        concurrency = 4

        [rabbitmq]
        host = "localhost"
        port = 5672
        user = "guest"
        password = "guest"
        vhost = "/"
        queue = "packlab.tasks"

        [database]
        type = "postgres"
        host = "localhost"
        port = 5432
        user = "packlab"
        password = "secret"
        db_name = "packlab"

        [fleet.health_check]
        threshold = 5

        [[devices]]
        id = "d1"
        adb_target = "emulator-5554"
        proxy_host = "127.0.0.1"
        proxy_port = 8080
        mitm_container = "mitm1"
        mitm_api_port = 8081
        instrumentation_host = "127.0.0.1"
        arch = "arm64"
    "#;

    #[test]
    fn parses_every_documented_key() {
        let raw: RawConfig = toml::from_str(SAMPLE).unwrap();
        let config = Config::from_raw(raw);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.rabbitmq.queue, "packlab.tasks");
        assert_eq!(config.database.kind, "postgres");
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].arch, Arch::Arm64);
        assert_eq!(config.health_check_threshold, 5);
        assert!(!config.common_words.is_empty());
    }

    #[test]
    fn zero_concurrency_is_clamped_to_one() {
        let raw: RawConfig = toml::from_str(SAMPLE.replace("concurrency = 4", "concurrency = 0").as_str()).unwrap();
        let config = Config::from_raw(raw);
        assert_eq!(config.worker_concurrency, 1);
    }
}
