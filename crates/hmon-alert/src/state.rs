//! Trigger state machine.
//!
//! [`step`] is a pure function of the trigger's persisted evaluation fields,
//! this tick's raw verdict, and the suppression gates. It never touches
//! storage; the caller persists the returned state and emits the transition.

use chrono::{DateTime, Duration, Utc};
use hmon_common::types::{EvaluationState, Trigger, TriggerState};

/// External conditions checked before a trigger is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateContext {
    /// The trigger's parent trigger is currently in PROBLEM.
    pub parent_in_problem: bool,
    /// The trigger's device is inside a maintenance window.
    pub in_maintenance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    ParentProblem,
    Maintenance,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuppressReason::ParentProblem => write!(f, "parent trigger in problem"),
            SuppressReason::Maintenance => write!(f, "maintenance window"),
        }
    }
}

/// A change of confirmed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// `None` on the very first evaluation.
    pub from: Option<TriggerState>,
    pub to: TriggerState,
}

impl Transition {
    /// Entering PROBLEM always alerts; leaving it alerts as a recovery.
    /// The first-ever OK is silent.
    pub fn should_alert(&self) -> bool {
        match (self.from, self.to) {
            (_, TriggerState::Problem) => true,
            (Some(TriggerState::Problem), TriggerState::Ok) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A gate held; the persisted state must stay exactly as it was.
    Suppressed(SuppressReason),
    /// The raw verdict was UNKNOWN; nothing changes.
    Skipped,
    Evaluated {
        state: EvaluationState,
        transition: Option<Transition>,
    },
}

/// A duration too large to represent is never satisfied.
fn held_long_enough(held: Duration, duration_secs: u64) -> bool {
    if duration_secs == 0 {
        return true;
    }
    i64::try_from(duration_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .is_some_and(|required| held >= required)
}

/// Advances a trigger by one tick.
///
/// `recovery_met` is the verdict of the recovery expression, or `None` when
/// the trigger has none. Gates are checked in order: parent dependency, then
/// maintenance. A raw PROBLEM is confirmed only once it has held for
/// `duration_secs`; a raw OK clears a confirmed PROBLEM only when recovery
/// is met.
pub fn step(
    trigger: &Trigger,
    raw: TriggerState,
    recovery_met: Option<bool>,
    gates: GateContext,
    now: DateTime<Utc>,
) -> Outcome {
    if gates.parent_in_problem {
        return Outcome::Suppressed(SuppressReason::ParentProblem);
    }
    if gates.in_maintenance {
        return Outcome::Suppressed(SuppressReason::Maintenance);
    }
    if raw == TriggerState::Unknown {
        return Outcome::Skipped;
    }

    let prev = &trigger.evaluation;
    let state_since = match (prev.last_raw_state, prev.state_since) {
        (Some(last_raw), Some(since)) if last_raw == raw => since,
        _ => now,
    };

    let confirmed = match raw {
        TriggerState::Problem => {
            if held_long_enough(now - state_since, trigger.duration_secs) {
                TriggerState::Problem
            } else {
                prev.last_state.unwrap_or(TriggerState::Unknown)
            }
        }
        _ => {
            if prev.last_state == Some(TriggerState::Problem) && !recovery_met.unwrap_or(true) {
                TriggerState::Problem
            } else {
                TriggerState::Ok
            }
        }
    };

    let transition = (prev.last_state != Some(confirmed)).then_some(Transition {
        from: prev.last_state,
        to: confirmed,
    });
    // Waiting out the duration on a never-evaluated trigger keeps it unconfirmed.
    let transition = transition.filter(|t| t.to != TriggerState::Unknown);

    Outcome::Evaluated {
        state: EvaluationState {
            last_state: if confirmed == TriggerState::Unknown {
                prev.last_state
            } else {
                Some(confirmed)
            },
            last_raw_state: Some(raw),
            state_since: Some(state_since),
            last_evaluated_at: Some(now),
        },
        transition,
    }
}
