use crate::state::Transition;
use chrono::{DateTime, Utc};
use hmon_common::id::next_id;
use hmon_common::text::{build_message, MessageParts};
use hmon_common::types::{AlertEvent, Trigger, TriggerState};

const FALLBACK_MESSAGE: &str = "Trigger state changed.";

/// Builds the single event recorded for a confirmed transition.
///
/// The message goes through the same sanitization as ingested alerts.
pub fn build_event(
    trigger: &Trigger,
    device_id: Option<&str>,
    transition: &Transition,
    value: Option<f64>,
    now: DateTime<Utc>,
) -> AlertEvent {
    let from = transition.from.unwrap_or(TriggerState::Unknown);
    let summary = match value {
        Some(v) => format!(
            "Trigger '{}' changed from {} to {} (value: {v})",
            trigger.name, from, transition.to
        ),
        None => format!(
            "Trigger '{}' changed from {} to {}",
            trigger.name, from, transition.to
        ),
    };
    let severity = trigger.severity.to_string();

    let message = build_message(
        &MessageParts {
            summary: Some(&summary),
            description: trigger.description.as_deref(),
            alert_name: Some(&trigger.name),
            severity: Some(&severity),
        },
        FALLBACK_MESSAGE,
    );

    AlertEvent {
        id: next_id(),
        trigger_id: trigger.id.clone(),
        device_id: device_id.map(str::to_string),
        status: transition.to,
        value,
        message,
        acknowledged: false,
        acknowledged_at: None,
        created_at: now,
    }
}
