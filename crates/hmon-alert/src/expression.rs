//! Trigger expression parsing and evaluation.
//!
//! Three textual shapes are accepted for simple expressions:
//!
//! 1. scoped: `{web-01:cpu.load.avg(5m)} > 80`
//! 2. function call: `avg_over_time(cpu_load[5m]) > 80`
//! 3. bare: `cpu_load > 80`
//!
//! Compound expressions are JSON:
//! `{"operator": "or", "conditions": [{"metric": "cpu", "operator": ">", "value": 90}]}`.
//!
//! Evaluation never fails: anything that does not parse yields
//! [`TriggerState::Unknown`] and a warning in the log.

use crate::window::{parse_window, WindowFunction};
use hmon_common::types::{ExpressionType, TriggerState};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

const THRESHOLD: &str = r"(-?\d+(?:\.\d+)?)";

static SCOPED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\{{([^:{{}}]+):([^{{}}]+)\}}\s*([<>=!]+)\s*{THRESHOLD}\s*$"
    ))
    .unwrap_or_else(|e| panic!("invalid scoped expression regex: {e}"))
});

static SCOPED_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)\.([A-Za-z0-9_]+)\(([^()]*)\)$")
        .unwrap_or_else(|e| panic!("invalid scoped call regex: {e}"))
});

static OVER_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^([A-Za-z0-9]+)_over_time\(\s*([A-Za-z_:][A-Za-z0-9_:.]*)\s*\[([^\]]+)\]\s*\)\s*([<>=!]+)\s*{THRESHOLD}\s*$"
    ))
    .unwrap_or_else(|e| panic!("invalid over_time expression regex: {e}"))
});

static BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^([A-Za-z_][A-Za-z0-9_.]*)\s*([<>=!]+)\s*{THRESHOLD}\s*$"
    ))
    .unwrap_or_else(|e| panic!("invalid bare expression regex: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognized expression: {0}")]
    Unrecognized(String),

    #[error("unknown comparison operator: {0}")]
    UnknownOperator(String),

    #[error("unknown window function: {0}")]
    UnknownFunction(String),

    #[error("invalid time window: {0}")]
    InvalidWindow(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("unknown logical operator: {0}")]
    UnknownLogic(String),

    #[error("invalid compound expression: {0}")]
    InvalidCompound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

impl FromStr for CompareOp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            ">=" => Ok(Self::GreaterEqual),
            "<=" => Ok(Self::LessEqual),
            "=" | "==" => Ok(Self::Equal),
            "!=" | "<>" => Ok(Self::NotEqual),
            _ => Err(ParseError::UnknownOperator(s.to_string())),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        };
        write!(f, "{symbol}")
    }
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => (value - threshold).abs() < f64::EPSILON,
            Self::NotEqual => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

/// What an expression needs from the metrics backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricRef {
    /// Host scope from `{scope:...}`, if any.
    pub scope: Option<String>,
    pub metric: String,
    /// Aggregation over `window`; `None` means the latest value.
    pub function: Option<WindowFunction>,
    pub window: Option<Duration>,
}

impl MetricRef {
    fn latest(metric: &str) -> Self {
        Self {
            scope: None,
            metric: metric.to_string(),
            function: None,
            window: None,
        }
    }

    /// Reduces fetched samples to the value the comparison uses.
    pub fn reduce(&self, samples: &[f64]) -> Option<f64> {
        match self.function {
            Some(function) => function.apply(samples),
            None => samples.last().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleExpr {
    pub metric: MetricRef,
    pub operator: CompareOp,
    pub threshold: f64,
}

impl SimpleExpr {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();

        if let Some(caps) = SCOPED_RE.captures(text) {
            let metric = parse_scoped_target(caps[1].trim(), caps[2].trim())?;
            return Self::build(metric, &caps[3], &caps[4]);
        }

        if let Some(caps) = OVER_TIME_RE.captures(text) {
            let function = parse_function(&caps[1])?;
            let window = parse_window(&caps[3])
                .ok_or_else(|| ParseError::InvalidWindow(caps[3].to_string()))?;
            let metric = MetricRef {
                scope: None,
                metric: caps[2].to_string(),
                function: Some(function),
                window: Some(window),
            };
            return Self::build(metric, &caps[4], &caps[5]);
        }

        if let Some(caps) = BARE_RE.captures(text) {
            return Self::build(MetricRef::latest(&caps[1]), &caps[2], &caps[3]);
        }

        Err(ParseError::Unrecognized(text.to_string()))
    }

    fn build(metric: MetricRef, operator: &str, threshold: &str) -> Result<Self, ParseError> {
        Ok(Self {
            metric,
            operator: operator.parse()?,
            threshold: threshold
                .parse()
                .map_err(|_| ParseError::InvalidThreshold(threshold.to_string()))?,
        })
    }

    pub fn evaluate(&self, value: f64) -> bool {
        self.operator.check(value, self.threshold)
    }
}

fn parse_function(name: &str) -> Result<WindowFunction, ParseError> {
    name.parse()
        .map_err(|_| ParseError::UnknownFunction(name.to_string()))
}

/// `cpu.load.avg(5m)` -> metric `cpu.load`, `avg` over 5 minutes.
/// `cpu.load.last()` and `cpu.load` both mean the latest value.
fn parse_scoped_target(scope: &str, target: &str) -> Result<MetricRef, ParseError> {
    let Some(caps) = SCOPED_CALL_RE.captures(target) else {
        return Ok(MetricRef {
            scope: Some(scope.to_string()),
            ..MetricRef::latest(target)
        });
    };

    let function = parse_function(&caps[2])?;
    let window_literal = caps[3].trim();
    let (function, window) = if window_literal.is_empty() {
        if function != WindowFunction::Last {
            return Err(ParseError::InvalidWindow(format!("{function}() needs a window")));
        }
        (None, None)
    } else {
        let window = parse_window(window_literal)
            .ok_or_else(|| ParseError::InvalidWindow(window_literal.to_string()))?;
        (Some(function), Some(window))
    };

    Ok(MetricRef {
        scope: Some(scope.to_string()),
        metric: caps[1].to_string(),
        function,
        window,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub metric: String,
    pub operator: CompareOp,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundSpec {
    pub logic: Logic,
    pub conditions: Vec<Condition>,
}

#[derive(Deserialize)]
struct RawCompound {
    #[serde(default = "default_logic")]
    operator: String,
    #[serde(default)]
    conditions: Vec<RawCondition>,
}

#[derive(Deserialize)]
struct RawCondition {
    metric: String,
    #[serde(default = "default_compare")]
    operator: String,
    #[serde(default)]
    value: f64,
}

fn default_logic() -> String {
    "and".to_string()
}

fn default_compare() -> String {
    ">".to_string()
}

impl CompoundSpec {
    pub fn parse(json: &str) -> Result<Self, ParseError> {
        let raw: RawCompound = serde_json::from_str(json)
            .map_err(|e| ParseError::InvalidCompound(e.to_string()))?;

        let logic = match raw.operator.to_lowercase().as_str() {
            "and" => Logic::And,
            "or" => Logic::Or,
            _ => return Err(ParseError::UnknownLogic(raw.operator)),
        };

        let conditions = raw
            .conditions
            .into_iter()
            .map(|c| {
                Ok(Condition {
                    operator: c.operator.parse()?,
                    metric: c.metric,
                    value: c.value,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(Self { logic, conditions })
    }

    /// A condition whose metric is missing from `values` counts as false.
    /// An empty condition list is never a problem.
    pub fn evaluate(&self, values: &HashMap<String, f64>) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        let mut results = self.conditions.iter().map(|c| match values.get(&c.metric) {
            Some(value) => c.operator.check(*value, c.value),
            None => {
                tracing::warn!(metric = %c.metric, "No value for compound condition metric");
                false
            }
        });
        match self.logic {
            Logic::And => results.all(|r| r),
            Logic::Or => results.any(|r| r),
        }
    }
}

/// A parsed trigger expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Simple(SimpleExpr),
    Compound(CompoundSpec),
}

impl Expression {
    pub fn parse(kind: ExpressionType, text: &str) -> Result<Self, ParseError> {
        match kind {
            ExpressionType::Simple => SimpleExpr::parse(text).map(Self::Simple),
            ExpressionType::Compound => CompoundSpec::parse(text).map(Self::Compound),
        }
    }

    /// Metric references the expression needs, one per distinct metric.
    pub fn metric_refs(&self) -> Vec<MetricRef> {
        match self {
            Self::Simple(expr) => vec![expr.metric.clone()],
            Self::Compound(spec) => {
                let mut refs: Vec<MetricRef> = Vec::new();
                for condition in &spec.conditions {
                    if !refs.iter().any(|r| r.metric == condition.metric) {
                        refs.push(MetricRef::latest(&condition.metric));
                    }
                }
                refs
            }
        }
    }

    /// Evaluates against an observation. A simple expression without a
    /// primary value is unknown.
    pub fn verdict(&self, observation: &Observation) -> Verdict {
        let is_problem = match self {
            Self::Simple(expr) => match observation.value {
                Some(value) => expr.evaluate(value),
                None => return Verdict::unknown(),
            },
            Self::Compound(spec) => spec.evaluate(&observation.values),
        };
        Verdict::from_problem(is_problem)
    }
}

/// Metric values gathered for one evaluation of a trigger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Reduced value of a simple expression's metric.
    pub value: Option<f64>,
    /// Latest value per metric name, for compound expressions.
    pub values: HashMap<String, f64>,
}

impl Observation {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            values: HashMap::new(),
        }
    }

    pub fn values(values: HashMap<String, f64>) -> Self {
        Self {
            value: None,
            values,
        }
    }
}

/// Raw result of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub is_problem: bool,
    pub state: TriggerState,
}

impl Verdict {
    pub fn unknown() -> Self {
        Self {
            is_problem: false,
            state: TriggerState::Unknown,
        }
    }

    pub fn from_problem(is_problem: bool) -> Self {
        Self {
            is_problem,
            state: if is_problem {
                TriggerState::Problem
            } else {
                TriggerState::Ok
            },
        }
    }
}

/// Evaluates a simple expression text against an already reduced value.
///
/// # Examples
///
/// ```
/// use hmon_alert::expression::evaluate_simple;
/// use hmon_common::types::TriggerState;
///
/// assert_eq!(evaluate_simple("cpu_percent > 90", 95.0).state, TriggerState::Problem);
/// assert_eq!(evaluate_simple("cpu_percent > 90", 50.0).state, TriggerState::Ok);
/// assert_eq!(evaluate_simple("cpu_percent ~ 90", 95.0).state, TriggerState::Unknown);
/// ```
pub fn evaluate_simple(expression: &str, value: f64) -> Verdict {
    match SimpleExpr::parse(expression) {
        Ok(expr) => Verdict::from_problem(expr.evaluate(value)),
        Err(e) => {
            tracing::warn!(expression, error = %e, "Failed to parse expression");
            Verdict::unknown()
        }
    }
}

/// Evaluates a compound JSON spec against current values by metric name.
pub fn evaluate_compound(spec: &str, values: &HashMap<String, f64>) -> Verdict {
    match CompoundSpec::parse(spec) {
        Ok(spec) => Verdict::from_problem(spec.evaluate(values)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse compound expression");
            Verdict::unknown()
        }
    }
}
