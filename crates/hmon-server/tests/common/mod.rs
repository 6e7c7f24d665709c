#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmon_common::types::{
    AlertEvent, Device, EvaluationState, ExpressionType, HostGroup, MaintenanceWindow, Severity,
    Template, TemplateAssignment, TemplateItem, Trigger,
};
use hmon_server::metrics::{MetricRequest, MetricSample, MetricsBackend, MetricsError};
use hmon_storage::{AlertCounts, AlertEventFilter, MonitorStore, SqliteMonitorStore, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteMonitorStore>,
}

pub fn build_test_context() -> TestContext {
    let temp_dir = tempfile::tempdir().expect("temp dir should be created");
    let store = SqliteMonitorStore::open(&temp_dir.path().join("hmon.db"))
        .expect("store should open");
    TestContext {
        temp_dir,
        store: Arc::new(store),
    }
}

/// 2024-06-01 12:00:00 UTC, a Saturday.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

/// Metrics backend serving canned samples keyed by metric name.
#[derive(Default)]
pub struct FakeMetrics {
    samples: Mutex<HashMap<String, MetricSample>>,
    failing: Mutex<Vec<String>>,
    requests: Mutex<Vec<MetricRequest>>,
}

impl FakeMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, metric: &str, value: f64) {
        self.set_sample(metric, MetricSample::Value(value));
    }

    pub fn set_sample(&self, metric: &str, sample: MetricSample) {
        self.samples
            .lock()
            .unwrap()
            .insert(metric.to_string(), sample);
    }

    pub fn clear(&self, metric: &str) {
        self.samples.lock().unwrap().remove(metric);
    }

    pub fn fail(&self, metric: &str) {
        self.failing.lock().unwrap().push(metric.to_string());
    }

    pub fn requests(&self) -> Vec<MetricRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsBackend for FakeMetrics {
    async fn fetch(&self, request: &MetricRequest) -> Result<MetricSample, MetricsError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.lock().unwrap().contains(&request.metric) {
            return Err(MetricsError::Status(503));
        }
        Ok(self
            .samples
            .lock()
            .unwrap()
            .get(&request.metric)
            .cloned()
            .unwrap_or(MetricSample::NoData))
    }
}

/// Store that rejects alert events for one trigger and delegates
/// everything else to SQLite.
pub struct FailingEventStore {
    pub inner: Arc<SqliteMonitorStore>,
    pub failing_trigger_id: String,
}

impl FailingEventStore {
    pub fn new(inner: Arc<SqliteMonitorStore>, failing_trigger_id: &str) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing_trigger_id: failing_trigger_id.to_string(),
        })
    }
}

impl MonitorStore for FailingEventStore {
    fn list_templates(&self) -> hmon_storage::Result<Vec<Template>> {
        self.inner.list_templates()
    }

    fn list_template_items(&self) -> hmon_storage::Result<Vec<TemplateItem>> {
        self.inner.list_template_items()
    }

    fn list_triggers(&self) -> hmon_storage::Result<Vec<Trigger>> {
        self.inner.list_triggers()
    }

    fn get_trigger(&self, id: &str) -> hmon_storage::Result<Option<Trigger>> {
        self.inner.get_trigger(id)
    }

    fn find_trigger_by_name(&self, name: &str) -> hmon_storage::Result<Option<Trigger>> {
        self.inner.find_trigger_by_name(name)
    }

    fn insert_trigger(&self, trigger: &Trigger) -> hmon_storage::Result<()> {
        self.inner.insert_trigger(trigger)
    }

    fn list_devices(&self) -> hmon_storage::Result<Vec<Device>> {
        self.inner.list_devices()
    }

    fn get_device(&self, id: &str) -> hmon_storage::Result<Option<Device>> {
        self.inner.get_device(id)
    }

    fn find_device_by_hostname(&self, hostname: &str) -> hmon_storage::Result<Option<Device>> {
        self.inner.find_device_by_hostname(hostname)
    }

    fn list_host_groups(&self) -> hmon_storage::Result<Vec<HostGroup>> {
        self.inner.list_host_groups()
    }

    fn list_memberships(&self) -> hmon_storage::Result<Vec<(String, String)>> {
        self.inner.list_memberships()
    }

    fn list_group_templates(&self) -> hmon_storage::Result<Vec<(String, String)>> {
        self.inner.list_group_templates()
    }

    fn list_assignments(&self) -> hmon_storage::Result<Vec<TemplateAssignment>> {
        self.inner.list_assignments()
    }

    fn list_maintenance_windows(&self) -> hmon_storage::Result<Vec<MaintenanceWindow>> {
        self.inner.list_maintenance_windows()
    }

    fn update_trigger_evaluation(
        &self,
        trigger_id: &str,
        state: &EvaluationState,
    ) -> hmon_storage::Result<()> {
        self.inner.update_trigger_evaluation(trigger_id, state)
    }

    fn insert_alert_event(&self, event: &AlertEvent) -> hmon_storage::Result<()> {
        if event.trigger_id == self.failing_trigger_id {
            return Err(StorageError::NotFound {
                entity: "alert_event",
                id: event.id.clone(),
            });
        }
        self.inner.insert_alert_event(event)
    }

    fn list_alert_events(&self, filter: &AlertEventFilter) -> hmon_storage::Result<Vec<AlertEvent>> {
        self.inner.list_alert_events(filter)
    }

    fn alert_counts(&self) -> hmon_storage::Result<AlertCounts> {
        self.inner.alert_counts()
    }

    fn delete_alert_events_before(&self, cutoff: DateTime<Utc>) -> hmon_storage::Result<u64> {
        self.inner.delete_alert_events_before(cutoff)
    }
}

pub fn make_trigger(id: &str, expression: &str) -> Trigger {
    Trigger {
        id: id.to_string(),
        name: format!("Trigger {id}"),
        description: None,
        template_id: None,
        device_id: None,
        expression_type: ExpressionType::Simple,
        expression: expression.to_string(),
        recovery_expression: None,
        severity: Severity::High,
        duration_secs: 0,
        parent_trigger_id: None,
        enabled: true,
        evaluation: EvaluationState::default(),
    }
}

pub fn make_device(id: &str, hostname: &str) -> Device {
    Device {
        id: id.to_string(),
        hostname: hostname.to_string(),
        ip: None,
    }
}

pub fn make_template(id: &str, parent: Option<&str>) -> Template {
    Template {
        id: id.to_string(),
        name: format!("Template {id}"),
        description: None,
        parent_template_id: parent.map(str::to_string),
    }
}

pub fn make_group(id: &str) -> HostGroup {
    HostGroup {
        id: id.to_string(),
        name: format!("Group {id}"),
    }
}

pub fn make_assignment(device_id: &str, template_id: &str, priority: i64) -> TemplateAssignment {
    TemplateAssignment {
        device_id: device_id.to_string(),
        template_id: template_id.to_string(),
        priority,
        assigned_at: t0(),
    }
}
