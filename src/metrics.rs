//! Metric helpers for `scenario_sim`.
//!
//! This module defines metric names and thin helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::{execution::ExecutionStatus, message::Direction};

/// Name of the gauge tracking executions whose body is running.
pub const EXECUTIONS_RUNNING: &str = "simulator_executions_running";
/// Name of the counter tracking finished executions by status.
pub const EXECUTIONS_TOTAL: &str = "simulator_executions_total";
/// Name of the counter tracking correlation decisions by outcome.
pub const CORRELATION_TOTAL: &str = "simulator_correlation_total";
/// Name of the counter tracking routed and sent messages by direction.
pub const MESSAGES_TOTAL: &str = "simulator_messages_total";
/// Name of the counter tracking inbound messages nothing handled.
pub const UNHANDLED_TOTAL: &str = "simulator_unhandled_messages_total";

/// How a correlation attempt or handler ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationOutcome {
    Matched,
    Unmatched,
    TimedOut,
    Cancelled,
}

impl CorrelationOutcome {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Record an execution body starting.
pub fn inc_running() {
    #[cfg(feature = "metrics")]
    gauge!(EXECUTIONS_RUNNING).increment(1.0);
}

/// Record an execution body finishing.
pub fn dec_running() {
    #[cfg(feature = "metrics")]
    gauge!(EXECUTIONS_RUNNING).decrement(1.0);
}

/// Record a terminal execution status.
pub fn inc_executions(status: ExecutionStatus) {
    #[cfg(feature = "metrics")]
    counter!(EXECUTIONS_TOTAL, "status" => status.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = status;
}

/// Record a correlation decision.
pub fn inc_correlation(outcome: CorrelationOutcome) {
    #[cfg(feature = "metrics")]
    counter!(CORRELATION_TOTAL, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record a message routed in or sent out.
pub fn inc_messages(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an inbound message that nothing handled.
pub fn inc_unhandled() {
    #[cfg(feature = "metrics")]
    counter!(UNHANDLED_TOTAL).increment(1);
}
