//! Records describing scenario executions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    message::{Direction, Message},
    scenario::ScenarioParameter,
};

/// Variable name under which a running scenario sees its own execution id.
pub const EXECUTION_ID_VARIABLE: &str = "executionId";

/// Identifier assigned to a scenario execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionId(u64);

impl From<u64> for ExecutionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ExecutionId {
    /// Create a new [`ExecutionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Lifecycle status of an execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// The scenario body has not returned yet.
    Running,
    /// The scenario body returned normally.
    Success,
    /// The scenario body failed, panicked, or was terminated.
    Failed,
}

impl ExecutionStatus {
    /// Whether the status can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool { self != Self::Running }

    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// A message exchanged during an execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Whether the scenario received or sent the message.
    pub direction: Direction,
    pub message: Message,
    /// When the recorder stored the message.
    pub recorded_at: DateTime<Utc>,
}

/// One running or completed scenario instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioExecution {
    pub execution_id: ExecutionId,
    /// Name the scenario was launched under.
    pub scenario_name: String,
    /// When the record was created.
    pub start: DateTime<Utc>,
    /// Set once the status becomes terminal.
    pub end: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Launch parameters after merging with the declared defaults.
    pub parameters: Vec<ScenarioParameter>,
    /// Messages exchanged, in the order they were recorded.
    pub messages: Vec<MessageRecord>,
    /// Diagnostic captured for failed executions.
    pub error: Option<String>,
}

impl ScenarioExecution {
    /// Create a running execution started now.
    #[must_use]
    pub fn start(
        execution_id: ExecutionId,
        scenario_name: impl Into<String>,
        parameters: Vec<ScenarioParameter>,
    ) -> Self {
        Self {
            execution_id,
            scenario_name: scenario_name.into(),
            start: Utc::now(),
            end: None,
            status: ExecutionStatus::Running,
            parameters,
            messages: Vec::new(),
            error: None,
        }
    }

    /// Move to a terminal status.
    ///
    /// Returns `false` and leaves the record untouched if it is already
    /// terminal, or if `status` is [`ExecutionStatus::Running`].
    pub fn complete(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end = Some(Utc::now());
        self.error = error;
        true
    }

    /// Messages recorded in `direction`, oldest first.
    pub fn messages_in(&self, direction: Direction) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(move |record| record.direction == direction)
            .map(|record| &record.message)
    }
}
