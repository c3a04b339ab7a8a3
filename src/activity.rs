//! Recording of executions and the messages they exchange.
//!
//! [`ActivityRecorder`] is the seam to whatever persists simulator activity.
//! [`InMemoryActivityRecorder`] keeps everything in process and backs the
//! demo binary and the test suite.

use std::sync::{
    Mutex,
    PoisonError,
    atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use crate::{
    execution::{ExecutionId, ExecutionStatus, MessageRecord, ScenarioExecution},
    message::{Direction, Message},
    scenario::ScenarioParameter,
};

/// Persists execution records and associated messages.
///
/// Implementations are called concurrently from many workers, always for
/// distinct execution ids per call site, and must assign ids that increase
/// in creation order.
pub trait ActivityRecorder: Send + Sync + 'static {
    /// Create a running execution record with a fresh id.
    fn create_execution(&self, scenario_name: &str, parameters: &[ScenarioParameter]) -> ScenarioExecution;

    /// Attach `message` to an execution.
    fn append_message(&self, execution_id: ExecutionId, message: &Message, direction: Direction);

    /// Move an execution to a terminal status.
    ///
    /// Must be a no-op for executions that are already terminal, so the
    /// first completion wins when a worker and shutdown race. Returns
    /// whether this call made the transition.
    fn complete_execution(&self, execution_id: ExecutionId, status: ExecutionStatus, error: Option<String>) -> bool;

    /// Record an inbound message that nothing handled.
    fn record_unhandled(&self, message: &Message);

    /// Fetch a snapshot of one execution.
    fn execution(&self, execution_id: ExecutionId) -> Option<ScenarioExecution>;

    /// Snapshot all executions ordered by id.
    fn executions(&self) -> Vec<ScenarioExecution>;

    /// Snapshot all unhandled inbound messages, oldest first.
    fn unhandled_messages(&self) -> Vec<Message>;
}

/// Process-local [`ActivityRecorder`].
#[derive(Debug)]
pub struct InMemoryActivityRecorder {
    executions: DashMap<ExecutionId, ScenarioExecution>,
    unhandled: Mutex<Vec<Message>>,
    next_id: AtomicU64,
}

impl Default for InMemoryActivityRecorder {
    fn default() -> Self {
        Self {
            executions: DashMap::new(),
            unhandled: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryActivityRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl ActivityRecorder for InMemoryActivityRecorder {
    fn create_execution(&self, scenario_name: &str, parameters: &[ScenarioParameter]) -> ScenarioExecution {
        let id = ExecutionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let execution = ScenarioExecution::start(id, scenario_name, parameters.to_vec());
        self.executions.insert(id, execution.clone());
        execution
    }

    fn append_message(&self, execution_id: ExecutionId, message: &Message, direction: Direction) {
        if let Some(mut execution) = self.executions.get_mut(&execution_id) {
            execution.messages.push(MessageRecord {
                direction,
                message: message.clone(),
                recorded_at: Utc::now(),
            });
        } else {
            warn!(%execution_id, %direction, "message recorded against unknown execution");
        }
    }

    fn complete_execution(&self, execution_id: ExecutionId, status: ExecutionStatus, error: Option<String>) -> bool {
        self.executions
            .get_mut(&execution_id)
            .is_some_and(|mut execution| execution.complete(status, error))
    }

    fn record_unhandled(&self, message: &Message) {
        self.unhandled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
    }

    fn execution(&self, execution_id: ExecutionId) -> Option<ScenarioExecution> {
        self.executions.get(&execution_id).map(|entry| entry.value().clone())
    }

    fn executions(&self) -> Vec<ScenarioExecution> {
        let mut all: Vec<ScenarioExecution> =
            self.executions.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by_key(|execution| execution.execution_id);
        all
    }

    fn unhandled_messages(&self) -> Vec<Message> {
        self.unhandled.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn recorder() -> InMemoryActivityRecorder { InMemoryActivityRecorder::new() }

    #[rstest]
    fn ids_increase_in_creation_order(recorder: InMemoryActivityRecorder) {
        let first = recorder.create_execution("a", &[]);
        let second = recorder.create_execution("b", &[]);
        assert!(first.execution_id < second.execution_id);
        assert_eq!(recorder.executions().len(), 2);
    }

    #[rstest]
    fn messages_attach_to_their_execution(recorder: InMemoryActivityRecorder) {
        let execution = recorder.create_execution("FaxSent", &[]);
        recorder.append_message(execution.execution_id, &Message::new("in"), Direction::Inbound);
        recorder.append_message(execution.execution_id, &Message::new("out"), Direction::Outbound);

        let stored = recorder.execution(execution.execution_id).expect("execution stored");
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(
            stored.messages_in(Direction::Outbound).collect::<Vec<_>>(),
            vec![&Message::new("out")]
        );
    }

    #[rstest]
    fn first_completion_wins(recorder: InMemoryActivityRecorder) {
        let execution = recorder.create_execution("FaxSent", &[]);
        assert!(recorder.complete_execution(execution.execution_id, ExecutionStatus::Success, None));
        assert!(!recorder.complete_execution(
            execution.execution_id,
            ExecutionStatus::Failed,
            Some("late".into()),
        ));
        assert!(!recorder.complete_execution(ExecutionId::new(999), ExecutionStatus::Failed, None));

        let stored = recorder.execution(execution.execution_id).expect("execution stored");
        assert_eq!(stored.status, ExecutionStatus::Success);
        assert!(stored.error.is_none());
    }

    #[rstest]
    fn unhandled_messages_are_kept(recorder: InMemoryActivityRecorder) {
        recorder.record_unhandled(&Message::new("orphan"));
        assert_eq!(recorder.unhandled_messages(), vec![Message::new("orphan")]);
    }
}
