//! Metrics backend access for trigger evaluation.

use async_trait::async_trait;
use hmon_alert::expression::MetricRef;
use serde::Deserialize;
use std::time::Duration;

/// One metric lookup issued by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricRequest {
    pub metric: String,
    /// Host the metric is scoped to, matched against the scope label.
    pub scope: Option<String>,
    /// Range to fetch; `None` asks for the latest value only.
    pub window: Option<Duration>,
}

impl MetricRequest {
    /// Builds a request for `metric_ref`. An expression without an explicit
    /// scope falls back to `default_scope` (the trigger's device).
    pub fn for_ref(metric_ref: &MetricRef, default_scope: Option<&str>) -> Self {
        Self {
            metric: metric_ref.metric.clone(),
            scope: metric_ref
                .scope
                .clone()
                .or_else(|| default_scope.map(str::to_string)),
            window: metric_ref.window,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSample {
    Value(f64),
    /// Time-ordered samples of a range query.
    Series(Vec<f64>),
    NoData,
}

impl MetricSample {
    /// Reduces the sample to the single value `metric_ref` compares against.
    /// Empty data yields `None`.
    pub fn reduce(&self, metric_ref: &MetricRef) -> Option<f64> {
        match self {
            MetricSample::Value(v) => metric_ref.reduce(std::slice::from_ref(v)),
            MetricSample::Series(values) => metric_ref.reduce(values),
            MetricSample::NoData => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metrics backend returned HTTP {0}")]
    Status(u16),

    #[error("metrics query failed: {0}")]
    Query(String),

    #[error("invalid sample value: {0}")]
    InvalidValue(String),
}

/// Query capability the scheduler consumes. No data is a normal result,
/// not an error.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn fetch(&self, request: &MetricRequest) -> Result<MetricSample, MetricsError>;
}

/// Client for the Prometheus-compatible `/api/v1/query` endpoint of
/// VictoriaMetrics.
pub struct VictoriaMetricsClient {
    client: reqwest::Client,
    base_url: String,
    scope_label: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Deserialize)]
struct QueryResult {
    /// Instant vector sample.
    #[serde(default)]
    value: Option<(f64, String)>,
    /// Range vector samples.
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl VictoriaMetricsClient {
    pub fn new(base_url: &str, scope_label: &str, timeout: Duration) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            scope_label: scope_label.to_string(),
        })
    }

    /// `{__name__="cpu.load",host="web-01"}[300s]`
    pub fn selector(&self, request: &MetricRequest) -> String {
        let mut matchers = vec![format!("__name__=\"{}\"", escape(&request.metric))];
        if let Some(scope) = &request.scope {
            matchers.push(format!("{}=\"{}\"", self.scope_label, escape(scope)));
        }
        let mut selector = format!("{{{}}}", matchers.join(","));
        if let Some(window) = request.window {
            selector.push_str(&format!("[{}s]", window.as_secs()));
        }
        selector
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse_value(raw: &str) -> Result<f64, MetricsError> {
    raw.parse()
        .map_err(|_| MetricsError::InvalidValue(raw.to_string()))
}

#[async_trait]
impl MetricsBackend for VictoriaMetricsClient {
    async fn fetch(&self, request: &MetricRequest) -> Result<MetricSample, MetricsError> {
        let query = self.selector(request);
        let response = self
            .client
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", query.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MetricsError::Status(response.status().as_u16()));
        }

        let body: QueryResponse = response.json().await?;
        if body.status != "success" {
            return Err(MetricsError::Query(
                body.error.unwrap_or_else(|| body.status.clone()),
            ));
        }

        // Only the first series is used; scoped selectors match one host.
        let Some(first) = body.data.and_then(|d| d.result.into_iter().next()) else {
            tracing::debug!(query = %query, "No data for metric query");
            return Ok(MetricSample::NoData);
        };

        if request.window.is_some() {
            let values = first
                .values
                .iter()
                .map(|(_, v)| parse_value(v))
                .collect::<Result<Vec<_>, _>>()?;
            if values.is_empty() {
                return Ok(MetricSample::NoData);
            }
            return Ok(MetricSample::Series(values));
        }

        match first.value {
            Some((_, v)) => Ok(MetricSample::Value(parse_value(&v)?)),
            None => Ok(MetricSample::NoData),
        }
    }
}
