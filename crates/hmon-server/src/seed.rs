//! Catalog seeding from a JSON file.

use anyhow::{Context, Result};
use hmon_common::types::{
    Device, HostGroup, MaintenanceWindow, Template, TemplateAssignment, TemplateItem, Trigger,
};
use hmon_storage::{MonitorStore, SqliteMonitorStore};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub items: Vec<TemplateItem>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub host_groups: Vec<HostGroup>,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    #[serde(default)]
    pub group_templates: Vec<GroupTemplate>,
    #[serde(default)]
    pub assignments: Vec<TemplateAssignment>,
    #[serde(default)]
    pub maintenance_windows: Vec<MaintenanceWindow>,
}

#[derive(Debug, Deserialize)]
pub struct Membership {
    pub device_id: String,
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupTemplate {
    pub group_id: String,
    pub template_id: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub failed: usize,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse seed file '{}'", path.display()))
    }
}

fn record(summary: &mut SeedSummary, kind: &str, id: &str, result: hmon_storage::Result<()>) {
    match result {
        Ok(()) => {
            summary.inserted += 1;
            tracing::debug!(kind, id, "Seeded row");
        }
        Err(e) => {
            summary.failed += 1;
            tracing::warn!(kind, id, error = %e, "Failed to seed row");
        }
    }
}

/// Writes every row of `seed`. Templates go in before their items and
/// triggers; a failing row is logged and skipped.
pub fn apply_seed(store: &SqliteMonitorStore, seed: &SeedFile) -> SeedSummary {
    let mut summary = SeedSummary::default();

    for template in &seed.templates {
        record(&mut summary, "template", &template.id, store.insert_template(template));
    }
    for item in &seed.items {
        record(&mut summary, "item", &item.id, store.insert_item(item));
    }
    for trigger in &seed.triggers {
        record(&mut summary, "trigger", &trigger.id, store.insert_trigger(trigger));
    }
    for device in &seed.devices {
        record(&mut summary, "device", &device.id, store.insert_device(device));
    }
    for group in &seed.host_groups {
        record(&mut summary, "host_group", &group.id, store.insert_host_group(group));
    }
    for m in &seed.memberships {
        record(
            &mut summary,
            "membership",
            &m.device_id,
            store.add_membership(&m.device_id, &m.group_id),
        );
    }
    for gt in &seed.group_templates {
        record(
            &mut summary,
            "group_template",
            &gt.group_id,
            store.add_group_template(&gt.group_id, &gt.template_id),
        );
    }
    for assignment in &seed.assignments {
        record(
            &mut summary,
            "assignment",
            &assignment.device_id,
            store.insert_assignment(assignment),
        );
    }
    for window in &seed.maintenance_windows {
        record(
            &mut summary,
            "maintenance_window",
            &window.id,
            store.insert_maintenance_window(window),
        );
    }

    tracing::info!(
        inserted = summary.inserted,
        failed = summary.failed,
        "Seed file applied"
    );
    summary
}
