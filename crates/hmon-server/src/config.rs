use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

const DB_FILE: &str = "hmon.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_alerting_enabled")]
    pub enabled: bool,
    /// Pause between the end of one evaluation tick and the start of the next.
    #[serde(default = "default_alerting_interval_secs")]
    pub interval_secs: u64,
    /// Concurrent metric queries per tick.
    #[serde(default = "default_alerting_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: default_alerting_enabled(),
            interval_secs: default_alerting_interval_secs(),
            max_concurrent: default_alerting_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Base URL of a Prometheus-compatible query API (VictoriaMetrics).
    #[serde(default = "default_metrics_url")]
    pub url: String,
    #[serde(default = "default_metrics_timeout_secs")]
    pub timeout_secs: u64,
    /// Label that carries the host name a scoped expression refers to.
    #[serde(default = "default_metrics_scope_label")]
    pub scope_label: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            url: default_metrics_url(),
            timeout_secs: default_metrics_timeout_secs(),
            scope_label: default_metrics_scope_label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_alert_event_retention_days")]
    pub alert_event_retention_days: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            alert_event_retention_days: default_alert_event_retention_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_alerting_enabled() -> bool {
    true
}

fn default_alerting_interval_secs() -> u64 {
    60
}

fn default_alerting_max_concurrent() -> usize {
    8
}

fn default_metrics_url() -> String {
    "http://localhost:8428".to_string()
}

fn default_metrics_timeout_secs() -> u64 {
    10
}

fn default_metrics_scope_label() -> String {
    "host".to_string()
}

fn default_alert_event_retention_days() -> u32 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            alerting: AlertingConfig::default(),
            metrics: MetricsConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{path}'"))?;
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(DB_FILE)
    }
}
