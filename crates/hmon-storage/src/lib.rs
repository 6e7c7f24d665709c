//! Persistence for the monitoring entity graph and alert events.
//!
//! [`MonitorStore`] is what the evaluation engine consumes: read access to
//! templates, triggers, devices, host groups and maintenance windows, plus
//! the single write path (trigger evaluation fields and alert events).
//! [`engine::SqliteMonitorStore`] implements it over one SQLite database in
//! WAL mode.

pub mod engine;
pub mod error;
mod rows;


pub use engine::SqliteMonitorStore;
pub use error::{Result, StorageError};

use chrono::{DateTime, Utc};
use hmon_common::types::{
    AlertEvent, Device, EvaluationState, HostGroup, MaintenanceWindow, Template,
    TemplateAssignment, TemplateItem, Trigger, TriggerState,
};
use serde::Serialize;

/// Filters for listing alert events, newest first.
#[derive(Debug, Clone, Default)]
pub struct AlertEventFilter {
    pub trigger_id: Option<String>,
    pub device_id: Option<String>,
    pub status: Option<TriggerState>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Alert event totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub total: u64,
    pub problem: u64,
    pub ok: u64,
    pub unacknowledged: u64,
}

/// Persistence backend for the evaluation engine.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the scheduler, the retention task and the CLI paths all hold it.
pub trait MonitorStore: Send + Sync {
    fn list_templates(&self) -> Result<Vec<Template>>;

    /// Items of every template, in insertion order.
    fn list_template_items(&self) -> Result<Vec<TemplateItem>>;

    fn list_triggers(&self) -> Result<Vec<Trigger>>;

    fn get_trigger(&self, id: &str) -> Result<Option<Trigger>>;

    fn find_trigger_by_name(&self, name: &str) -> Result<Option<Trigger>>;

    fn insert_trigger(&self, trigger: &Trigger) -> Result<()>;

    fn list_devices(&self) -> Result<Vec<Device>>;

    fn get_device(&self, id: &str) -> Result<Option<Device>>;

    /// Case-insensitive match on hostname.
    fn find_device_by_hostname(&self, hostname: &str) -> Result<Option<Device>>;

    fn list_host_groups(&self) -> Result<Vec<HostGroup>>;

    /// `(device_id, group_id)` pairs in membership order.
    fn list_memberships(&self) -> Result<Vec<(String, String)>>;

    /// `(group_id, template_id)` pairs in attachment order.
    fn list_group_templates(&self) -> Result<Vec<(String, String)>>;

    /// Direct device assignments in assignment order.
    fn list_assignments(&self) -> Result<Vec<TemplateAssignment>>;

    fn list_maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>>;

    /// Overwrites the evaluation fields of one trigger.
    fn update_trigger_evaluation(&self, trigger_id: &str, state: &EvaluationState) -> Result<()>;

    fn insert_alert_event(&self, event: &AlertEvent) -> Result<()>;

    fn list_alert_events(&self, filter: &AlertEventFilter) -> Result<Vec<AlertEvent>>;

    fn alert_counts(&self) -> Result<AlertCounts>;

    /// Deletes events created before `cutoff`. Returns the number removed.
    fn delete_alert_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
