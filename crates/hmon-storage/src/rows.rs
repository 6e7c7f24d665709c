//! Row <-> domain type mapping. Timestamps are stored as epoch millis, enums
//! as their display text.

use chrono::{DateTime, Utc};
use hmon_common::types::{
    AlertEvent, Device, EvaluationState, HostGroup, MaintenanceScope, MaintenanceWindow, Template,
    TemplateAssignment, TemplateItem, Trigger,
};
use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;

pub(crate) const TEMPLATE_COLUMNS: &str = "id, name, description, parent_template_id";

pub(crate) const ITEM_COLUMNS: &str =
    "id, template_id, name, item_key, value_kind, units, interval_secs, enabled";

pub(crate) const TRIGGER_COLUMNS: &str = "id, name, description, template_id, device_id, \
     expression_type, expression, recovery_expression, severity, duration_secs, \
     parent_trigger_id, enabled, last_state, last_raw_state, state_since, last_evaluated_at";

pub(crate) const DEVICE_COLUMNS: &str = "id, hostname, ip";

pub(crate) const ASSIGNMENT_COLUMNS: &str = "device_id, template_id, priority, assigned_at";

pub(crate) const WINDOW_COLUMNS: &str =
    "id, name, scope_type, scope_id, start_time, end_time, recurrence, collect_data, active";

pub(crate) const EVENT_COLUMNS: &str = "id, trigger_id, device_id, status, value, message, \
     acknowledged, acknowledged_at, created_at";

pub(crate) fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn opt_ms(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(from_ms))
}

/// Parses a text column through `FromStr`, reporting failures as a column
/// conversion error.
fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn opt_parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw.parse().map(Some).map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
        }),
        None => Ok(None),
    }
}

pub(crate) fn template(row: &Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent_template_id: row.get(3)?,
    })
}

pub(crate) fn item(row: &Row<'_>) -> rusqlite::Result<TemplateItem> {
    Ok(TemplateItem {
        id: row.get(0)?,
        template_id: row.get(1)?,
        name: row.get(2)?,
        key: row.get(3)?,
        value_kind: row.get(4)?,
        units: row.get(5)?,
        interval_secs: row.get::<_, i64>(6)?.max(0) as u64,
        enabled: row.get(7)?,
    })
}

pub(crate) fn trigger(row: &Row<'_>) -> rusqlite::Result<Trigger> {
    Ok(Trigger {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        template_id: row.get(3)?,
        device_id: row.get(4)?,
        expression_type: parse_col(row, 5)?,
        expression: row.get(6)?,
        recovery_expression: row.get(7)?,
        severity: parse_col(row, 8)?,
        duration_secs: row.get::<_, i64>(9)?.max(0) as u64,
        parent_trigger_id: row.get(10)?,
        enabled: row.get(11)?,
        evaluation: EvaluationState {
            last_state: opt_parse_col(row, 12)?,
            last_raw_state: opt_parse_col(row, 13)?,
            state_since: opt_ms(row, 14)?,
            last_evaluated_at: opt_ms(row, 15)?,
        },
    })
}

pub(crate) fn device(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        hostname: row.get(1)?,
        ip: row.get(2)?,
    })
}

pub(crate) fn host_group(row: &Row<'_>) -> rusqlite::Result<HostGroup> {
    Ok(HostGroup {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

pub(crate) fn assignment(row: &Row<'_>) -> rusqlite::Result<TemplateAssignment> {
    Ok(TemplateAssignment {
        device_id: row.get(0)?,
        template_id: row.get(1)?,
        priority: row.get(2)?,
        assigned_at: from_ms(row.get(3)?),
    })
}

/// `(scope_type, scope_id)` column pair of a maintenance scope.
pub(crate) fn scope_columns(scope: &MaintenanceScope) -> (&'static str, Option<&str>) {
    match scope {
        MaintenanceScope::All => ("all", None),
        MaintenanceScope::Device(id) => ("device", Some(id.as_str())),
        MaintenanceScope::Hostgroup(id) => ("hostgroup", Some(id.as_str())),
    }
}

fn scope(row: &Row<'_>, type_idx: usize, id_idx: usize) -> rusqlite::Result<MaintenanceScope> {
    let scope_type: String = row.get(type_idx)?;
    let scope_id: Option<String> = row.get(id_idx)?;
    match (scope_type.as_str(), scope_id) {
        ("all", _) => Ok(MaintenanceScope::All),
        ("device", Some(id)) => Ok(MaintenanceScope::Device(id)),
        ("hostgroup", Some(id)) => Ok(MaintenanceScope::Hostgroup(id)),
        (other, _) => Err(rusqlite::Error::FromSqlConversionFailure(
            type_idx,
            Type::Text,
            format!("invalid maintenance scope: {other}").into(),
        )),
    }
}

pub(crate) fn maintenance_window(row: &Row<'_>) -> rusqlite::Result<MaintenanceWindow> {
    Ok(MaintenanceWindow {
        id: row.get(0)?,
        name: row.get(1)?,
        scope: scope(row, 2, 3)?,
        start_time: from_ms(row.get(4)?),
        end_time: from_ms(row.get(5)?),
        recurrence: parse_col(row, 6)?,
        collect_data: row.get(7)?,
        active: row.get(8)?,
    })
}

pub(crate) fn alert_event(row: &Row<'_>) -> rusqlite::Result<AlertEvent> {
    Ok(AlertEvent {
        id: row.get(0)?,
        trigger_id: row.get(1)?,
        device_id: row.get(2)?,
        status: parse_col(row, 3)?,
        value: row.get(4)?,
        message: row.get(5)?,
        acknowledged: row.get(6)?,
        acknowledged_at: opt_ms(row, 7)?,
        created_at: from_ms(row.get(8)?),
    })
}
