//! Simulator configuration.
//!
//! [`SimulatorConfig`] can be built in code with its `#[must_use]` setters or
//! deserialized from any serde format. Durations are expressed in
//! milliseconds when deserialized.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::correlation::DEFAULT_CORRELATION_TIMEOUT;

/// Number of scenario bodies that may run at once.
pub const DEFAULT_WORKERS: usize = 10;
/// How long shutdown waits for in-flight executions before aborting them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Capacity of channel-backed outbound endpoints.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;
/// Header naming the scenario an inbound message wants.
pub const DEFAULT_SCENARIO_HEADER: &str = "scenario";

/// Tunables for a running simulator.
///
/// # Invariants
/// - `workers` and `outbound_capacity` are at least 1
/// - `correlation_timeout` is at least 1 millisecond
///
/// ```
/// use std::time::Duration;
///
/// use scenario_sim::config::SimulatorConfig;
///
/// let config = SimulatorConfig::default()
///     .workers(0)
///     .correlation_timeout(Duration::from_millis(250));
/// assert_eq!(config.workers, 1);
/// assert_eq!(config.correlation_timeout, Duration::from_millis(250));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub workers: usize,
    #[serde(with = "millis", rename = "correlation_timeout_ms")]
    pub correlation_timeout: Duration,
    #[serde(with = "millis", rename = "shutdown_grace_ms")]
    pub shutdown_grace: Duration,
    pub outbound_capacity: usize,
    /// Scenario launched for messages no mapping claims.
    pub default_scenario: Option<String>,
    /// Header consulted for a scenario name; `None` disables the lookup.
    pub scenario_header: Option<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            correlation_timeout: DEFAULT_CORRELATION_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            default_scenario: None,
            scenario_header: Some(DEFAULT_SCENARIO_HEADER.to_owned()),
        }
    }
}

impl SimulatorConfig {
    /// Set the worker pool size. Values below 1 are raised to 1.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    #[must_use]
    pub fn correlation_timeout(mut self, timeout: Duration) -> Self {
        self.correlation_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn default_scenario(mut self, name: impl Into<String>) -> Self {
        self.default_scenario = Some(name.into());
        self
    }

    #[must_use]
    pub fn scenario_header(mut self, header: Option<String>) -> Self {
        self.scenario_header = header;
        self
    }

    /// Clamp values that arrived through deserialization.
    #[must_use]
    pub fn normalized(self) -> Self {
        let grace = self.shutdown_grace;
        let timeout = self.correlation_timeout;
        let workers = self.workers;
        let capacity = self.outbound_capacity;
        self.workers(workers)
            .correlation_timeout(timeout)
            .shutdown_grace(grace)
            .outbound_capacity(capacity)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_documents_with_defaults() {
        let config: SimulatorConfig = serde_json::from_str(
            r#"{"workers":3,"correlation_timeout_ms":1500,"default_scenario":"FaxQueued"}"#,
        )
        .expect("config should deserialize");

        assert_eq!(config.workers, 3);
        assert_eq!(config.correlation_timeout, Duration::from_millis(1500));
        assert_eq!(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
        assert_eq!(config.default_scenario.as_deref(), Some("FaxQueued"));
        assert_eq!(config.scenario_header.as_deref(), Some(DEFAULT_SCENARIO_HEADER));
    }

    #[test]
    fn normalization_clamps_zero_values() {
        let config: SimulatorConfig =
            serde_json::from_str(r#"{"workers":0,"outbound_capacity":0,"correlation_timeout_ms":0}"#)
                .expect("config should deserialize");
        let config = config.normalized();

        assert_eq!(config.workers, 1);
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.correlation_timeout, Duration::from_millis(1));
    }
}
