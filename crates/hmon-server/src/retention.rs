//! Periodic cleanup of old alert events.

use chrono::{DateTime, Utc};
use hmon_storage::MonitorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deletes alert events older than `retention_days` relative to `now`.
pub fn cleanup_once(
    store: &dyn MonitorStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> hmon_storage::Result<u64> {
    let cutoff = now - chrono::Duration::days(i64::from(retention_days));
    store.delete_alert_events_before(cutoff)
}

/// Runs the cleanup loop until `cancel` fires. The first pass runs
/// immediately.
pub async fn run(
    store: Arc<dyn MonitorStore>,
    retention_days: u32,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_days,
        interval_secs = interval.as_secs(),
        "Alert event retention job started"
    );

    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Alert event retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match cleanup_once(store.as_ref(), retention_days, Utc::now()) {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Alert event retention: purged old rows");
                    }
                    Ok(_) => tracing::debug!("Alert event retention: no rows to purge"),
                    Err(e) => tracing::error!(error = %e, "Alert event retention: cleanup failed"),
                }
            }
        }
    }
}
