//! Alert ingestion from Grafana-style webhook payloads.
//!
//! Each incoming alert becomes one stored [`AlertEvent`], sanitized with the
//! same rule the trigger evaluator uses for its own events.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use hmon_common::id::next_id;
use hmon_common::text::{
    build_message, sanitize, sanitize_map, MessageParts, ANNOTATION_MAX_LEN, LABEL_MAX_LEN,
};
use hmon_common::types::{
    AlertEvent, Device, EvaluationState, ExpressionType, Severity, Trigger, TriggerState,
};
use hmon_storage::MonitorStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Expression stored on triggers created for external alerts.
pub const EXTERNAL_EXPRESSION: &str = "external:grafana";

const DEFAULT_ALERT_NAME: &str = "Grafana Alert";
const FALLBACK_MESSAGE: &str = "Grafana alert received.";
const DEVICE_LABELS: [&str; 5] = ["host_name", "hostname", "host", "instance", "device"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrafanaPayload {
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub alerts: Vec<GrafanaAlert>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrafanaAlert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub received: usize,
}

/// Maps a producer status onto a trigger state.
///
/// # Examples
///
/// ```
/// use hmon_server::ingest::normalize_status;
/// use hmon_common::types::TriggerState;
///
/// assert_eq!(normalize_status("firing"), TriggerState::Problem);
/// assert_eq!(normalize_status(" Resolved "), TriggerState::Ok);
/// assert_eq!(normalize_status(""), TriggerState::Problem);
/// ```
pub fn normalize_status(raw: &str) -> TriggerState {
    match raw.trim().to_lowercase().as_str() {
        "firing" | "alerting" | "triggered" | "problem" => TriggerState::Problem,
        "resolved" | "ok" | "normal" => TriggerState::Ok,
        _ => TriggerState::Problem,
    }
}

fn find_device(store: &dyn MonitorStore, labels: &HashMap<String, String>) -> Result<Option<Device>> {
    for key in DEVICE_LABELS {
        if let Some(hostname) = labels.get(key).filter(|h| !h.is_empty()) {
            return Ok(store.find_device_by_hostname(hostname)?);
        }
    }
    Ok(None)
}

fn external_trigger(name: &str, severity: Severity, description: Option<String>) -> Trigger {
    Trigger {
        id: next_id(),
        name: name.to_string(),
        description,
        template_id: None,
        device_id: None,
        expression_type: ExpressionType::Simple,
        expression: EXTERNAL_EXPRESSION.to_string(),
        recovery_expression: None,
        severity,
        duration_secs: 0,
        parent_trigger_id: None,
        enabled: true,
        evaluation: EvaluationState::default(),
    }
}

/// Stores one alert event per alert in `payload`. Triggers are looked up by
/// alert name and created on first sight.
pub fn ingest_grafana(
    store: &dyn MonitorStore,
    payload: &GrafanaPayload,
    now: DateTime<Utc>,
) -> Result<IngestReport> {
    if payload.alerts.is_empty() {
        bail!("No alerts in payload");
    }

    let mut triggers: HashMap<String, Trigger> = HashMap::new();
    let mut received = 0;

    for alert in &payload.alerts {
        let labels = sanitize_map(&alert.labels, LABEL_MAX_LEN);
        let annotations = sanitize_map(&alert.annotations, ANNOTATION_MAX_LEN);

        let alert_name = labels
            .get("alertname")
            .filter(|n| !n.is_empty())
            .map_or(DEFAULT_ALERT_NAME, String::as_str);
        let severity = labels
            .get("severity")
            .and_then(|s| s.parse().ok())
            .unwrap_or(Severity::Warning);

        let trigger = match triggers.get(alert_name) {
            Some(trigger) => trigger.clone(),
            None => {
                let trigger = match store.find_trigger_by_name(alert_name)? {
                    Some(existing) => existing,
                    None => {
                        let description = annotations
                            .get("summary")
                            .or_else(|| annotations.get("description"))
                            .filter(|d| !d.is_empty())
                            .map(|d| sanitize(d, ANNOTATION_MAX_LEN));
                        let created = external_trigger(alert_name, severity, description);
                        store.insert_trigger(&created)?;
                        tracing::info!(trigger_id = %created.id, name = alert_name, "Created trigger for external alert");
                        created
                    }
                };
                triggers.insert(alert_name.to_string(), trigger.clone());
                trigger
            }
        };

        let device = find_device(store, &labels)?;
        let message = build_message(
            &MessageParts {
                summary: annotations.get("summary").map(String::as_str),
                description: annotations.get("description").map(String::as_str),
                alert_name: labels.get("alertname").map(String::as_str),
                severity: labels.get("severity").map(String::as_str),
            },
            FALLBACK_MESSAGE,
        );

        store.insert_alert_event(&AlertEvent {
            id: next_id(),
            trigger_id: trigger.id.clone(),
            device_id: device.map(|d| d.id),
            status: normalize_status(&alert.status),
            value: None,
            message,
            acknowledged: false,
            acknowledged_at: None,
            created_at: now,
        })?;
        received += 1;
    }

    tracing::info!(
        received,
        receiver = payload.receiver.as_deref().unwrap_or(""),
        "Ingested external alerts"
    );
    Ok(IngestReport { received })
}
