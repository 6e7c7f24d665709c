use crate::catalog::load_catalog;
use crate::metrics::{MetricRequest, MetricSample, MetricsBackend};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use hmon_alert::emitter::build_event;
use hmon_alert::expression::{Expression, MetricRef, Observation, SimpleExpr};
use hmon_alert::maintenance::MaintenanceCalendar;
use hmon_alert::state::{step, GateContext, Outcome, Transition};
use hmon_common::types::{Device, Trigger, TriggerState};
use hmon_storage::MonitorStore;
use hmon_template::{Catalog, ConfigResolver, EffectiveConfig};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Counters for one evaluation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub suppressed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub events: usize,
}

enum Recovery {
    None,
    Invalid,
    Expr(SimpleExpr),
}

struct PlannedTrigger {
    trigger: Trigger,
    device: Option<Device>,
    groups: Vec<String>,
    /// `None` when the expression does not parse.
    expression: Option<Expression>,
    recovery: Recovery,
}

impl PlannedTrigger {
    fn default_scope(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.hostname.as_str())
    }

    fn metric_refs(&self) -> Vec<MetricRef> {
        let mut refs = self
            .expression
            .as_ref()
            .map(Expression::metric_refs)
            .unwrap_or_default();
        if let Recovery::Expr(expr) = &self.recovery {
            refs.push(expr.metric.clone());
        }
        refs
    }
}

type Samples = HashMap<MetricRequest, std::result::Result<MetricSample, String>>;

/// Periodically evaluates every enabled trigger.
///
/// Metric queries of a tick run concurrently (bounded by `max_concurrent`);
/// gating, state persistence and event emission then run sequentially so a
/// parent trigger's fresh state is visible to its children in the same tick.
pub struct AlertScheduler {
    store: Arc<dyn MonitorStore>,
    metrics: Arc<dyn MetricsBackend>,
    interval: Duration,
    max_concurrent: usize,
}

impl AlertScheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        metrics: Arc<dyn MetricsBackend>,
        interval: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            metrics,
            interval: interval.max(Duration::from_secs(1)),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs ticks until `cancel` fires. Cancellation is only observed while
    /// sleeping between ticks, so an in-flight tick always completes.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            max_concurrent = self.max_concurrent,
            "Alert scheduler started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.tick(Utc::now()).await {
                Ok(summary) => tracing::info!(
                    evaluated = summary.evaluated,
                    suppressed = summary.suppressed,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    events = summary.events,
                    "Alert evaluation tick finished"
                ),
                Err(e) => tracing::error!(error = %e, "Alert evaluation tick failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Alert scheduler stopped");
    }

    /// Evaluates every enabled trigger once. Only failures to load the
    /// trigger set are returned; per-trigger failures are logged and counted.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let triggers = self
            .store
            .list_triggers()
            .context("Failed to load triggers")?;
        let catalog =
            load_catalog(self.store.as_ref()).context("Failed to load template catalog")?;
        let calendar = MaintenanceCalendar::new(
            self.store
                .list_maintenance_windows()
                .context("Failed to load maintenance windows")?,
        );

        let mut states: HashMap<String, Option<TriggerState>> = triggers
            .iter()
            .map(|t| (t.id.clone(), t.evaluation.last_state))
            .collect();

        let mut summary = TickSummary::default();
        let enabled = triggers
            .into_iter()
            .filter(|t| t.enabled && !t.is_external());
        let plans = plan_triggers(enabled, &catalog, &mut summary);
        let samples = self.fetch_all(&plans).await;

        for plan in &plans {
            if let Err(e) =
                self.evaluate(plan, &samples, &mut states, &calendar, now, &mut summary)
            {
                summary.failed += 1;
                tracing::error!(
                    trigger_id = %plan.trigger.id,
                    trigger = %plan.trigger.name,
                    error = %e,
                    "Trigger evaluation failed"
                );
            }
        }

        Ok(summary)
    }

    async fn fetch_all(&self, plans: &[PlannedTrigger]) -> Samples {
        let requests: HashSet<MetricRequest> = plans
            .iter()
            .flat_map(|plan| {
                let scope = plan.default_scope();
                plan.metric_refs()
                    .into_iter()
                    .map(move |r| MetricRequest::for_ref(&r, scope))
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for request in requests {
            let semaphore = semaphore.clone();
            let metrics = self.metrics.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = metrics.fetch(&request).await.map_err(|e| e.to_string());
                (request, result)
            });
        }

        let mut samples = Samples::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((request, result)) => {
                    samples.insert(request, result);
                }
                Err(e) => tracing::error!(error = %e, "Metric query task failed"),
            }
        }
        samples
    }

    fn evaluate(
        &self,
        plan: &PlannedTrigger,
        samples: &Samples,
        states: &mut HashMap<String, Option<TriggerState>>,
        calendar: &MaintenanceCalendar,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> Result<()> {
        let trigger = &plan.trigger;
        let gates = GateContext {
            parent_in_problem: trigger
                .parent_trigger_id
                .as_deref()
                .and_then(|parent| states.get(parent))
                .is_some_and(|state| *state == Some(TriggerState::Problem)),
            in_maintenance: plan
                .device
                .as_ref()
                .is_some_and(|d| calendar.is_in_maintenance(&d.id, &plan.groups, now)),
        };

        let (raw, value, recovery_met) = if gates.parent_in_problem || gates.in_maintenance {
            (TriggerState::Unknown, None, None)
        } else {
            observe(plan, samples)?
        };

        match step(trigger, raw, recovery_met, gates, now) {
            Outcome::Suppressed(reason) => {
                summary.suppressed += 1;
                tracing::debug!(trigger_id = %trigger.id, %reason, "Trigger evaluation suppressed");
            }
            Outcome::Skipped => {
                summary.skipped += 1;
                tracing::debug!(trigger_id = %trigger.id, "No verdict for trigger, skipped");
            }
            Outcome::Evaluated { state, transition } => {
                self.store
                    .update_trigger_evaluation(&trigger.id, &state)
                    .context("Failed to persist trigger state")?;
                states.insert(trigger.id.clone(), state.last_state);
                summary.evaluated += 1;

                if let Some(transition) = transition.filter(Transition::should_alert) {
                    let device_id = plan.device.as_ref().map(|d| d.id.as_str());
                    let event = build_event(trigger, device_id, &transition, value, now);
                    self.store
                        .insert_alert_event(&event)
                        .context("Failed to write alert event")?;
                    summary.events += 1;
                    tracing::info!(
                        trigger_id = %trigger.id,
                        trigger = %trigger.name,
                        from = ?transition.from,
                        to = %transition.to,
                        value = ?value,
                        "Trigger state changed"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Resolves devices and parses expressions for the enabled triggers.
///
/// A trigger scoped to a device and owned by a template only runs when the
/// template still applies to that device.
fn plan_triggers(
    triggers: impl Iterator<Item = Trigger>,
    catalog: &Catalog,
    summary: &mut TickSummary,
) -> Vec<PlannedTrigger> {
    let resolver = ConfigResolver::new(catalog);
    let mut configs: HashMap<String, Option<EffectiveConfig>> = HashMap::new();
    let mut plans = Vec::new();

    for trigger in triggers {
        let device = match trigger.device_id.as_deref() {
            Some(device_id) => match catalog.device(device_id) {
                Some(device) => Some(device.clone()),
                None => {
                    tracing::warn!(trigger_id = %trigger.id, device_id, "Trigger references a missing device");
                    summary.skipped += 1;
                    continue;
                }
            },
            None => None,
        };

        if let (Some(device), Some(_)) = (&device, &trigger.template_id) {
            let config = configs
                .entry(device.id.clone())
                .or_insert_with(|| resolver.effective_config(&device.id).ok());
            if !config.as_ref().is_some_and(|c| c.has_trigger(&trigger.id)) {
                tracing::debug!(
                    trigger_id = %trigger.id,
                    device_id = %device.id,
                    "Trigger template not applied to device, skipped"
                );
                summary.skipped += 1;
                continue;
            }
        }

        let expression = match Expression::parse(trigger.expression_type, &trigger.expression) {
            Ok(expression) => Some(expression),
            Err(e) => {
                tracing::warn!(
                    trigger_id = %trigger.id,
                    expression = %trigger.expression,
                    error = %e,
                    "Failed to parse trigger expression"
                );
                None
            }
        };

        let recovery = match trigger.recovery_expression.as_deref() {
            None => Recovery::None,
            Some(text) => match SimpleExpr::parse(text) {
                Ok(expr) => Recovery::Expr(expr),
                Err(e) => {
                    tracing::warn!(
                        trigger_id = %trigger.id,
                        expression = text,
                        error = %e,
                        "Failed to parse recovery expression"
                    );
                    Recovery::Invalid
                }
            },
        };

        let groups = device
            .as_ref()
            .map(|d| catalog.groups_of(&d.id).to_vec())
            .unwrap_or_default();

        plans.push(PlannedTrigger {
            trigger,
            device,
            groups,
            expression,
            recovery,
        });
    }

    plans
}

/// Raw verdict, captured value and recovery verdict of one trigger.
fn observe(
    plan: &PlannedTrigger,
    samples: &Samples,
) -> Result<(TriggerState, Option<f64>, Option<bool>)> {
    let Some(expression) = &plan.expression else {
        return Ok((TriggerState::Unknown, None, None));
    };

    let scope = plan.default_scope();
    let lookup = |metric_ref: &MetricRef| -> Result<Option<f64>> {
        let request = MetricRequest::for_ref(metric_ref, scope);
        match samples.get(&request) {
            Some(Ok(sample)) => Ok(sample.reduce(metric_ref)),
            Some(Err(e)) => Err(anyhow!("metric query for '{}' failed: {e}", request.metric)),
            None => Ok(None),
        }
    };

    let observation = match expression {
        Expression::Simple(expr) => Observation {
            value: lookup(&expr.metric)?,
            values: HashMap::new(),
        },
        Expression::Compound(_) => {
            let mut values = HashMap::new();
            for metric_ref in expression.metric_refs() {
                if let Some(value) = lookup(&metric_ref)? {
                    values.insert(metric_ref.metric.clone(), value);
                }
            }
            if values.is_empty() {
                return Ok((TriggerState::Unknown, None, None));
            }
            Observation::values(values)
        }
    };

    let raw = expression.verdict(&observation).state;
    // Recovery only matters when a confirmed PROBLEM sees a non-PROBLEM verdict.
    let leaving_problem = plan.trigger.evaluation.last_state == Some(TriggerState::Problem)
        && raw != TriggerState::Problem;
    let recovery_met = match &plan.recovery {
        _ if !leaving_problem => None,
        Recovery::None => None,
        Recovery::Invalid => Some(false),
        Recovery::Expr(expr) => Some(lookup(&expr.metric)?.is_some_and(|v| expr.evaluate(v))),
    };

    Ok((raw, observation.value, recovery_met))
}
