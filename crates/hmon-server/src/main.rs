use anyhow::Result;
use chrono::Utc;
use hmon_storage::{MonitorStore, SqliteMonitorStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hmon_server::agent_config::agent_config;
use hmon_server::config::{ServerConfig, DEFAULT_CONFIG_PATH};
use hmon_server::ingest::{ingest_grafana, GrafanaPayload};
use hmon_server::metrics::VictoriaMetricsClient;
use hmon_server::retention;
use hmon_server::scheduler::AlertScheduler;
use hmon_server::seed::{apply_seed, SeedFile};

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  hmon-server [config.toml]                              Start the alert evaluator");
    eprintln!("  hmon-server init-seed <config.toml> <seed.json>        Load templates, devices and triggers from a seed file");
    eprintln!("  hmon-server agent-config <config.toml> <device_id>     Print the resolved agent configuration of a device");
    eprintln!("  hmon-server ingest <config.toml> <payload.json>        Store alerts from a Grafana webhook payload");
    eprintln!("  hmon-server alert-counts <config.toml>                 Print alert event counters");
    eprintln!("  hmon-server cleanup <config.toml> [days]               Delete alert events older than the retention period");
}

fn required<'a>(args: &'a [String], index: usize, message: &str) -> Result<&'a str> {
    args.get(index).map(String::as_str).ok_or_else(|| {
        print_usage();
        anyhow::anyhow!("{message}")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hmon=info".parse()?))
        .init();

    hmon_common::id::init(1, 1)?;

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-seed") => {
            let config_path = required(&args, 2, "init-seed requires <config.toml> and <seed.json> arguments")?;
            let seed_path = required(&args, 3, "init-seed requires <seed.json> argument")?;
            run_init_seed(config_path, seed_path)
        }
        Some("agent-config") => {
            let config_path = required(&args, 2, "agent-config requires <config.toml> and <device_id> arguments")?;
            let device_id = required(&args, 3, "agent-config requires <device_id> argument")?;
            run_agent_config(config_path, device_id)
        }
        Some("ingest") => {
            let config_path = required(&args, 2, "ingest requires <config.toml> and <payload.json> arguments")?;
            let payload_path = required(&args, 3, "ingest requires <payload.json> argument")?;
            run_ingest(config_path, payload_path)
        }
        Some("alert-counts") => {
            let config_path = required(&args, 2, "alert-counts requires <config.toml> argument")?;
            run_alert_counts(config_path)
        }
        Some("cleanup") => {
            let config_path = required(&args, 2, "cleanup requires <config.toml> argument")?;
            let days = args
                .get(3)
                .map(|d| d.parse::<u32>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid retention days: {e}"))?;
            run_cleanup(config_path, days)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_CONFIG_PATH);
            run_server(config_path).await
        }
    }
}

fn open_store(config_path: &str) -> Result<(ServerConfig, SqliteMonitorStore)> {
    let config = ServerConfig::load(config_path)?;
    let store = SqliteMonitorStore::open(&config.db_path())?;
    Ok((config, store))
}

#[allow(clippy::print_stdout)]
fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_init_seed(config_path: &str, seed_path: &str) -> Result<()> {
    let (_, store) = open_store(config_path)?;
    let seed = SeedFile::load(Path::new(seed_path))?;
    let summary = apply_seed(&store, &seed);
    if summary.failed > 0 {
        anyhow::bail!("{} seed rows failed, see log for details", summary.failed);
    }
    Ok(())
}

fn run_agent_config(config_path: &str, device_id: &str) -> Result<()> {
    let (_, store) = open_store(config_path)?;
    match agent_config(&store, device_id)? {
        Some(config) => print_json(&config),
        None => anyhow::bail!("Device '{device_id}' not found"),
    }
}

fn run_ingest(config_path: &str, payload_path: &str) -> Result<()> {
    let (_, store) = open_store(config_path)?;
    let content = std::fs::read_to_string(payload_path)
        .map_err(|e| anyhow::anyhow!("Failed to read payload file '{}': {}", payload_path, e))?;
    let payload: GrafanaPayload = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse payload file '{}': {}", payload_path, e))?;
    let report = ingest_grafana(&store, &payload, Utc::now())?;
    print_json(&report)
}

fn run_alert_counts(config_path: &str) -> Result<()> {
    let (_, store) = open_store(config_path)?;
    print_json(&store.alert_counts()?)
}

fn run_cleanup(config_path: &str, days: Option<u32>) -> Result<()> {
    let (config, store) = open_store(config_path)?;
    let days = days.unwrap_or(config.retention.alert_event_retention_days);
    let deleted = retention::cleanup_once(&store, days, Utc::now())?;
    tracing::info!(deleted, retention_days = days, "Alert event cleanup finished");
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        data_dir = %config.data_dir,
        metrics_url = %config.metrics.url,
        alerting = config.alerting.enabled,
        "hmon-server starting"
    );

    let store: Arc<dyn MonitorStore> = Arc::new(SqliteMonitorStore::open(&config.db_path())?);
    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    if config.alerting.enabled {
        let metrics = Arc::new(VictoriaMetricsClient::new(
            &config.metrics.url,
            &config.metrics.scope_label,
            Duration::from_secs(config.metrics.timeout_secs),
        )?);
        let scheduler = AlertScheduler::new(
            store.clone(),
            metrics,
            Duration::from_secs(config.alerting.interval_secs),
            config.alerting.max_concurrent,
        );
        let token = cancel.clone();
        handles.push(tokio::spawn(async move { scheduler.run(token).await }));
    } else {
        tracing::info!("Alerting disabled, scheduler not started");
    }

    handles.push(tokio::spawn(retention::run(
        store.clone(),
        config.retention.alert_event_retention_days,
        Duration::from_secs(config.retention.cleanup_interval_secs),
        cancel.clone(),
    )));

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    tracing::info!("hmon-server stopped");
    Ok(())
}
