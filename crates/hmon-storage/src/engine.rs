use crate::error::{Result, StorageError};
use crate::rows::{self, to_ms};
use crate::{AlertCounts, AlertEventFilter, MonitorStore};
use chrono::{DateTime, Utc};
use hmon_common::types::{
    AlertEvent, Device, EvaluationState, HostGroup, MaintenanceWindow, Template,
    TemplateAssignment, TemplateItem, Trigger, TriggerState,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS templates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    parent_template_id TEXT
);

CREATE TABLE IF NOT EXISTS template_items (
    id TEXT PRIMARY KEY,
    template_id TEXT NOT NULL,
    name TEXT NOT NULL,
    item_key TEXT NOT NULL,
    value_kind TEXT NOT NULL DEFAULT 'numeric',
    units TEXT,
    interval_secs INTEGER NOT NULL DEFAULT 60,
    enabled INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_items_template ON template_items(template_id);

CREATE TABLE IF NOT EXISTS triggers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    template_id TEXT,
    device_id TEXT,
    expression_type TEXT NOT NULL DEFAULT 'simple',
    expression TEXT NOT NULL,
    recovery_expression TEXT,
    severity TEXT NOT NULL DEFAULT 'average',
    duration_secs INTEGER NOT NULL DEFAULT 0,
    parent_trigger_id TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_state TEXT,
    last_raw_state TEXT,
    state_since INTEGER,
    last_evaluated_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_triggers_name ON triggers(name);

CREATE TABLE IF NOT EXISTS devices (
    id TEXT PRIMARY KEY,
    hostname TEXT NOT NULL,
    ip TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_devices_hostname ON devices(hostname COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS host_groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS host_group_members (
    device_id TEXT NOT NULL,
    group_id TEXT NOT NULL,
    PRIMARY KEY (device_id, group_id)
);

CREATE TABLE IF NOT EXISTS host_group_templates (
    group_id TEXT NOT NULL,
    template_id TEXT NOT NULL,
    PRIMARY KEY (group_id, template_id)
);

CREATE TABLE IF NOT EXISTS template_assignments (
    device_id TEXT NOT NULL,
    template_id TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    assigned_at INTEGER NOT NULL,
    PRIMARY KEY (device_id, template_id)
);

CREATE TABLE IF NOT EXISTS maintenance_windows (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    scope_type TEXT NOT NULL,
    scope_id TEXT,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    recurrence TEXT NOT NULL DEFAULT 'none',
    collect_data INTEGER NOT NULL DEFAULT 1,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS alert_events (
    id TEXT PRIMARY KEY,
    trigger_id TEXT NOT NULL,
    device_id TEXT,
    status TEXT NOT NULL,
    value REAL,
    message TEXT NOT NULL,
    acknowledged INTEGER NOT NULL DEFAULT 0,
    acknowledged_at INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_events_created ON alert_events(created_at);
CREATE INDEX IF NOT EXISTS idx_alert_events_trigger ON alert_events(trigger_id);
";

/// SQLite-backed [`MonitorStore`]. A single connection behind a mutex; every
/// call is short, so readers and the scheduler simply take turns.
pub struct SqliteMonitorStore {
    conn: Mutex<Connection>,
}

impl SqliteMonitorStore {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("Monitor store schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn query_all<T>(
        &self,
        sql: &str,
        map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map([], map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_template(&self, template: &Template) -> Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO templates (id, name, description, parent_template_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &template.id,
                &template.name,
                &template.description,
                &template.parent_template_id,
            ],
        )?;
        Ok(())
    }

    pub fn insert_item(&self, item: &TemplateItem) -> Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO template_items
                 (id, template_id, name, item_key, value_kind, units, interval_secs, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &item.id,
                &item.template_id,
                &item.name,
                &item.key,
                &item.value_kind,
                &item.units,
                item.interval_secs as i64,
                item.enabled,
            ],
        )?;
        Ok(())
    }

    pub fn insert_device(&self, device: &Device) -> Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO devices (id, hostname, ip) VALUES (?1, ?2, ?3)",
            params![&device.id, &device.hostname, &device.ip],
        )?;
        Ok(())
    }

    pub fn insert_host_group(&self, group: &HostGroup) -> Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO host_groups (id, name) VALUES (?1, ?2)",
            params![&group.id, &group.name],
        )?;
        Ok(())
    }

    /// Adds a device to a host group. Repeating a membership keeps its
    /// original position.
    pub fn add_membership(&self, device_id: &str, group_id: &str) -> Result<()> {
        self.lock().execute(
            "INSERT OR IGNORE INTO host_group_members (device_id, group_id) VALUES (?1, ?2)",
            params![device_id, group_id],
        )?;
        Ok(())
    }

    pub fn add_group_template(&self, group_id: &str, template_id: &str) -> Result<()> {
        self.lock().execute(
            "INSERT OR IGNORE INTO host_group_templates (group_id, template_id) VALUES (?1, ?2)",
            params![group_id, template_id],
        )?;
        Ok(())
    }

    /// Assigns a template directly to a device. Re-assigning the same
    /// template replaces the old assignment and moves it to the end.
    pub fn insert_assignment(&self, assignment: &TemplateAssignment) -> Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO template_assignments (device_id, template_id, priority, assigned_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &assignment.device_id,
                &assignment.template_id,
                assignment.priority,
                to_ms(assignment.assigned_at),
            ],
        )?;
        Ok(())
    }

    pub fn insert_maintenance_window(&self, window: &MaintenanceWindow) -> Result<()> {
        let (scope_type, scope_id) = rows::scope_columns(&window.scope);
        self.lock().execute(
            "INSERT OR REPLACE INTO maintenance_windows
                 (id, name, scope_type, scope_id, start_time, end_time, recurrence, collect_data, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &window.id,
                &window.name,
                scope_type,
                scope_id,
                to_ms(window.start_time),
                to_ms(window.end_time),
                window.recurrence.to_string(),
                window.collect_data,
                window.active,
            ],
        )?;
        Ok(())
    }
}

impl MonitorStore for SqliteMonitorStore {
    fn list_templates(&self) -> Result<Vec<Template>> {
        self.query_all(
            &format!("SELECT {} FROM templates ORDER BY rowid", rows::TEMPLATE_COLUMNS),
            rows::template,
        )
    }

    fn list_template_items(&self) -> Result<Vec<TemplateItem>> {
        self.query_all(
            &format!("SELECT {} FROM template_items ORDER BY rowid", rows::ITEM_COLUMNS),
            rows::item,
        )
    }

    fn list_triggers(&self) -> Result<Vec<Trigger>> {
        self.query_all(
            &format!("SELECT {} FROM triggers ORDER BY rowid", rows::TRIGGER_COLUMNS),
            rows::trigger,
        )
    }

    fn get_trigger(&self, id: &str) -> Result<Option<Trigger>> {
        let conn = self.lock();
        let sql = format!("SELECT {} FROM triggers WHERE id = ?1", rows::TRIGGER_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], rows::trigger)
            .optional()?)
    }

    fn find_trigger_by_name(&self, name: &str) -> Result<Option<Trigger>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM triggers WHERE name = ?1 ORDER BY rowid LIMIT 1",
            rows::TRIGGER_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![name], rows::trigger)
            .optional()?)
    }

    fn insert_trigger(&self, trigger: &Trigger) -> Result<()> {
        let eval = &trigger.evaluation;
        self.lock().execute(
            &format!(
                "INSERT OR REPLACE INTO triggers ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                rows::TRIGGER_COLUMNS
            ),
            params![
                &trigger.id,
                &trigger.name,
                &trigger.description,
                &trigger.template_id,
                &trigger.device_id,
                trigger.expression_type.to_string(),
                &trigger.expression,
                &trigger.recovery_expression,
                trigger.severity.to_string(),
                trigger.duration_secs as i64,
                &trigger.parent_trigger_id,
                trigger.enabled,
                eval.last_state.map(|s| s.to_string()),
                eval.last_raw_state.map(|s| s.to_string()),
                eval.state_since.map(to_ms),
                eval.last_evaluated_at.map(to_ms),
            ],
        )?;
        Ok(())
    }

    fn list_devices(&self) -> Result<Vec<Device>> {
        self.query_all(
            &format!("SELECT {} FROM devices ORDER BY rowid", rows::DEVICE_COLUMNS),
            rows::device,
        )
    }

    fn get_device(&self, id: &str) -> Result<Option<Device>> {
        let conn = self.lock();
        let sql = format!("SELECT {} FROM devices WHERE id = ?1", rows::DEVICE_COLUMNS);
        Ok(conn.query_row(&sql, params![id], rows::device).optional()?)
    }

    fn find_device_by_hostname(&self, hostname: &str) -> Result<Option<Device>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM devices WHERE hostname = ?1 COLLATE NOCASE LIMIT 1",
            rows::DEVICE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![hostname], rows::device)
            .optional()?)
    }

    fn list_host_groups(&self) -> Result<Vec<HostGroup>> {
        self.query_all(
            "SELECT id, name FROM host_groups ORDER BY rowid",
            rows::host_group,
        )
    }

    fn list_memberships(&self) -> Result<Vec<(String, String)>> {
        self.query_all(
            "SELECT device_id, group_id FROM host_group_members ORDER BY rowid",
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    fn list_group_templates(&self) -> Result<Vec<(String, String)>> {
        self.query_all(
            "SELECT group_id, template_id FROM host_group_templates ORDER BY rowid",
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    fn list_assignments(&self) -> Result<Vec<TemplateAssignment>> {
        self.query_all(
            &format!(
                "SELECT {} FROM template_assignments ORDER BY rowid",
                rows::ASSIGNMENT_COLUMNS
            ),
            rows::assignment,
        )
    }

    fn list_maintenance_windows(&self) -> Result<Vec<MaintenanceWindow>> {
        self.query_all(
            &format!(
                "SELECT {} FROM maintenance_windows ORDER BY rowid",
                rows::WINDOW_COLUMNS
            ),
            rows::maintenance_window,
        )
    }

    fn update_trigger_evaluation(&self, trigger_id: &str, state: &EvaluationState) -> Result<()> {
        let updated = self.lock().execute(
            "UPDATE triggers
             SET last_state = ?2, last_raw_state = ?3, state_since = ?4, last_evaluated_at = ?5
             WHERE id = ?1",
            params![
                trigger_id,
                state.last_state.map(|s| s.to_string()),
                state.last_raw_state.map(|s| s.to_string()),
                state.state_since.map(to_ms),
                state.last_evaluated_at.map(to_ms),
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                entity: "trigger",
                id: trigger_id.to_string(),
            });
        }
        Ok(())
    }

    fn insert_alert_event(&self, event: &AlertEvent) -> Result<()> {
        self.lock().execute(
            &format!(
                "INSERT INTO alert_events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rows::EVENT_COLUMNS
            ),
            params![
                &event.id,
                &event.trigger_id,
                &event.device_id,
                event.status.to_string(),
                event.value,
                &event.message,
                event.acknowledged,
                event.acknowledged_at.map(to_ms),
                to_ms(event.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_alert_events(&self, filter: &AlertEventFilter) -> Result<Vec<AlertEvent>> {
        let mut sql = format!("SELECT {} FROM alert_events WHERE 1 = 1", rows::EVENT_COLUMNS);
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(trigger_id) = &filter.trigger_id {
            params.push(Box::new(trigger_id.clone()));
            sql.push_str(&format!(" AND trigger_id = ?{}", params.len()));
        }
        if let Some(device_id) = &filter.device_id {
            params.push(Box::new(device_id.clone()));
            sql.push_str(&format!(" AND device_id = ?{}", params.len()));
        }
        if let Some(status) = filter.status {
            params.push(Box::new(status.to_string()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        let limit = filter.limit.map_or(-1, |l| l as i64);
        params.push(Box::new(limit));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
        params.push(Box::new(filter.offset as i64));
        sql.push_str(&format!(" OFFSET ?{}", params.len()));

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), rows::alert_event)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn alert_counts(&self) -> Result<AlertCounts> {
        let conn = self.lock();
        let counts = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN acknowledged = 0 THEN 1 ELSE 0 END), 0)
             FROM alert_events",
            params![TriggerState::Problem.to_string(), TriggerState::Ok.to_string()],
            |row| {
                Ok(AlertCounts {
                    total: row.get::<_, i64>(0)? as u64,
                    problem: row.get::<_, i64>(1)? as u64,
                    ok: row.get::<_, i64>(2)? as u64,
                    unacknowledged: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(counts)
    }

    fn delete_alert_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = self.lock().execute(
            "DELETE FROM alert_events WHERE created_at < ?1",
            params![to_ms(cutoff)],
        )?;
        tracing::debug!(removed, cutoff = %cutoff, "Deleted old alert events");
        Ok(removed as u64)
    }
}
