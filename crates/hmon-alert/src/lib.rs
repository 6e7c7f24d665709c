//! Trigger evaluation for hmon.
//!
//! - [`expression`] parses trigger expressions and produces raw verdicts.
//! - [`window`] holds the closed set of time-window aggregation functions.
//! - [`state`] turns raw verdicts into confirmed transitions under the
//!   dependency, maintenance, recovery and duration gates.
//! - [`maintenance`] answers whether a device is under maintenance.
//! - [`emitter`] builds the alert event for a confirmed transition.
//!
//! Nothing in this crate performs I/O; the scheduler in `hmon-server`
//! fetches metrics and persists the results.

pub mod emitter;
pub mod expression;
pub mod maintenance;
pub mod state;
pub mod window;
