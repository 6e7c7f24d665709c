use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trigger severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use hmon_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Disaster > Severity::Warning);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Average,
    High,
    Disaster,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Average => write!(f, "average"),
            Severity::High => write!(f, "high"),
            Severity::Disaster => write!(f, "disaster"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "average" => Ok(Severity::Average),
            "high" => Ok(Severity::High),
            "disaster" => Ok(Severity::Disaster),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Evaluation state of a trigger. `Unknown` is the state before the first
/// successful evaluation and the verdict of an unparseable expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerState {
    Ok,
    Problem,
    Unknown,
}

impl TriggerState {
    pub fn is_problem(self) -> bool {
        matches!(self, TriggerState::Problem)
    }
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerState::Ok => write!(f, "OK"),
            TriggerState::Problem => write!(f, "PROBLEM"),
            TriggerState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for TriggerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OK" => Ok(TriggerState::Ok),
            "PROBLEM" => Ok(TriggerState::Problem),
            "UNKNOWN" => Ok(TriggerState::Unknown),
            _ => Err(format!("unknown trigger state: {s}")),
        }
    }
}

/// A reusable bundle of items and triggers. `parent_template_id` forms a
/// single-parent inheritance chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_template_id: Option<String>,
}

/// A metric the agent collects. Unique by `key` within a merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateItem {
    pub id: String,
    pub template_id: String,
    pub name: String,
    pub key: String,
    /// e.g. `numeric`, `text`
    pub value_kind: String,
    pub units: Option<String>,
    pub interval_secs: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionType {
    #[default]
    Simple,
    Compound,
}

impl std::fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressionType::Simple => write!(f, "simple"),
            ExpressionType::Compound => write!(f, "compound"),
        }
    }
}

impl std::str::FromStr for ExpressionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(ExpressionType::Simple),
            "compound" => Ok(ExpressionType::Compound),
            _ => Err(format!("unknown expression type: {s}")),
        }
    }
}

/// Persisted evaluation fields of a trigger. Only the trigger state machine
/// writes these; everything else reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationState {
    /// Last confirmed state; `None` before the first evaluation.
    pub last_state: Option<TriggerState>,
    /// Raw verdict of the last non-suppressed tick.
    pub last_raw_state: Option<TriggerState>,
    /// When the raw verdict last changed.
    pub state_since: Option<DateTime<Utc>>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Owning template, if the trigger was defined on one.
    pub template_id: Option<String>,
    /// Device the trigger is scoped to, if any.
    pub device_id: Option<String>,
    pub expression_type: ExpressionType,
    /// Simple expression text, or compound spec as JSON.
    pub expression: String,
    pub recovery_expression: Option<String>,
    pub severity: Severity,
    /// Seconds the raw verdict must stay PROBLEM before it is confirmed.
    pub duration_secs: u64,
    pub parent_trigger_id: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub evaluation: EvaluationState,
}

/// Expression prefix of triggers that only record alerts raised elsewhere.
pub const EXTERNAL_EXPRESSION_PREFIX: &str = "external:";

impl Trigger {
    /// Externally fed triggers carry no evaluable expression.
    pub fn is_external(&self) -> bool {
        self.expression.starts_with(EXTERNAL_EXPRESSION_PREFIX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub hostname: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostGroup {
    pub id: String,
    pub name: String,
}

/// Direct template assignment on a device. Assignments rank above every
/// host-group template regardless of `priority`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateAssignment {
    pub device_id: String,
    pub template_id: String,
    pub priority: i64,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum MaintenanceScope {
    All,
    Device(String),
    Hostgroup(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recurrence::None => write!(f, "none"),
            Recurrence::Daily => write!(f, "daily"),
            Recurrence::Weekly => write!(f, "weekly"),
        }
    }
}

impl std::str::FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            _ => Err(format!("unknown recurrence: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: String,
    pub name: String,
    pub scope: MaintenanceScope,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub recurrence: Recurrence,
    /// Keep collecting metrics while alerting is suppressed.
    pub collect_data: bool,
    pub active: bool,
}

/// Alert event row. Immutable once written, apart from acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub trigger_id: String,
    pub device_id: Option<String>,
    pub status: TriggerState,
    pub value: Option<f64>,
    pub message: String,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
