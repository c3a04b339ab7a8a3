//! Tests for the `CorrelationRegistry` and correlated routing.

use std::{collections::BTreeSet, time::Duration};

use proptest::prelude::*;
use rstest::{fixture, rstest};
use scenario_sim::{
    CorrelationHandler,
    CorrelationKey,
    CorrelationKeySet,
    CorrelationRegistry,
    ExecutionId,
    ExecutionStatus,
    Message,
    RouteOutcome,
    ScenarioParameter,
    SimulatorConfig,
    SimulatorError,
    correlation::{CorrelationError, HandlerState},
};

mod common;
use common::{TestResult, harness_with, next_outbound, wait_for_pending, wait_for_terminal};

#[fixture]
fn registry() -> CorrelationRegistry { CorrelationRegistry::new(Duration::from_secs(30)) }

fn handler(execution: u64, name: &str, value: &str) -> CorrelationHandler {
    CorrelationHandler::new(ExecutionId::new(execution), CorrelationKey::new(name, value))
}

/// A handler expires once its timeout elapses and leaves the registry.
#[rstest]
#[tokio::test(start_paused = true)]
async fn handler_times_out_after_its_deadline(registry: CorrelationRegistry) -> TestResult {
    let handle = registry.register(handler(1, "referenceId", "9").with_timeout(Duration::from_millis(100)))?;
    let id = handle.id();

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(handle.state(), HandlerState::TimedOut);
    assert!(!registry.contains(id));
    assert!(registry.try_match(&Message::new("").with_header("referenceId", "9")).is_none());
    assert_eq!(handle.wait().await, Err(CorrelationError::TimedOut));
    Ok(())
}

/// The earliest registered handler wins when several accept a message.
#[rstest]
#[tokio::test]
async fn earliest_handler_matches_first(registry: CorrelationRegistry) -> TestResult {
    let first = registry.register(CorrelationHandler::new(
        ExecutionId::new(1),
        CorrelationKeySet::new().with("a", "1"),
    ))?;
    let second = registry.register(CorrelationHandler::new(
        ExecutionId::new(2),
        CorrelationKeySet::new().with("b", "2"),
    ))?;
    let message = Message::new("both").with_header("a", "1").with_header("b", "2");

    let found = registry.try_match(&message).ok_or("first handler should match")?;
    assert_eq!(found.handler_id, first.id());
    assert_eq!(found.execution_id, ExecutionId::new(1));

    let found = registry.try_match(&message).ok_or("second handler should match")?;
    assert_eq!(found.handler_id, second.id());
    assert!(registry.is_empty());

    assert_eq!(first.wait().await?, message);
    assert_eq!(second.wait().await?, message);
    Ok(())
}

/// Identical key sets cannot wait at the same time.
#[rstest]
#[tokio::test]
async fn duplicate_keys_are_refused(registry: CorrelationRegistry) -> TestResult {
    let _held = registry.register(handler(1, "referenceId", "7"))?;
    let refused = registry.register(handler(2, "referenceId", "7"));
    assert!(matches!(refused, Err(CorrelationError::DuplicateKey(_))));
    assert_eq!(
        SimulatorError::from(CorrelationError::DuplicateKey(CorrelationKeySet::new())).to_string(),
        "correlation keys {} are already awaited by another handler"
    );
    Ok(())
}

/// A match racing the timeout resolves the handler exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn match_and_timeout_race_resolves_once() -> TestResult {
    let registry = CorrelationRegistry::new(Duration::from_millis(1));
    for round in 0..100_u64 {
        let value = round.to_string();
        let handle = registry.register(handler(round, "round", &value))?;
        let matcher = {
            let registry = registry.clone();
            let message = Message::new(value.clone()).with_header("round", value.clone());
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                registry.try_match(&message).is_some()
            })
        };
        let matched = matcher.await?;
        let outcome = handle.wait().await;

        if matched {
            assert_eq!(outcome, Ok(Message::new(value.clone()).with_header("round", value)));
        } else {
            assert_eq!(outcome, Err(CorrelationError::TimedOut));
        }
        assert!(registry.is_empty());
    }
    Ok(())
}

/// A correlated message reaches its execution exactly once; a repeat of the
/// same message finds nothing to claim it.
#[tokio::test]
async fn correlated_message_is_delivered_once() -> TestResult {
    let mut harness = harness_with(SimulatorConfig::default())?;
    let simulator = &harness.simulator;
    let id = simulator
        .launch("AwaitsReference", vec![ScenarioParameter::new("referenceId", "7")])
        .await?;
    wait_for_pending(simulator, 1).await?;

    let reply = Message::new("status").with_header("referenceId", "7");
    let outcome = simulator.receive(reply.clone()).await?;
    assert!(matches!(outcome, RouteOutcome::Correlated { execution, .. } if execution == id));
    assert_eq!(next_outbound(&mut harness.outbound).await?, Message::new("echo:status"));

    assert!(matches!(simulator.receive(reply.clone()).await, Err(SimulatorError::NoMatch)));

    let execution = wait_for_terminal(simulator, id).await?;
    assert_eq!(execution.status, ExecutionStatus::Success);
    let inbound: Vec<_> = execution.messages_in(scenario_sim::Direction::Inbound).collect();
    assert_eq!(inbound, vec![&reply]);
    Ok(())
}

/// Cancelling an execution's handlers wakes its waits with `Cancelled`.
#[rstest]
#[tokio::test]
async fn cancel_execution_releases_its_handlers(registry: CorrelationRegistry) -> TestResult {
    let first = registry.register(handler(1, "a", "1"))?;
    let second = registry.register(handler(1, "b", "2"))?;
    let other = registry.register(handler(2, "c", "3"))?;

    assert_eq!(registry.cancel_execution(ExecutionId::new(1)), 2);
    assert_eq!(first.wait().await, Err(CorrelationError::Cancelled));
    assert_eq!(second.state(), HandlerState::Cancelled);
    assert!(registry.contains(other.id()));
    Ok(())
}

proptest! {
    /// Every message with a distinct key value reaches only its own handler.
    #[test]
    fn disjoint_keys_match_their_own_handler(values in proptest::collection::btree_set("[a-z0-9]{1,8}", 1..16)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        runtime.block_on(async {
            let registry = CorrelationRegistry::new(Duration::from_secs(30));
            let values: Vec<String> = values.into_iter().collect();
            let mut handles = Vec::new();
            for (index, value) in values.iter().enumerate() {
                let owner = ExecutionId::new(u64::try_from(index + 1).unwrap_or(u64::MAX));
                let handle = registry
                    .register(CorrelationHandler::new(owner, CorrelationKey::new("key", value.clone())))
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                handles.push((owner, handle));
            }

            let mut seen = BTreeSet::new();
            for (value, (owner, _)) in values.iter().zip(&handles).rev() {
                let found = registry.try_match(&Message::new(value.clone()).with_header("key", value.clone()));
                prop_assert_eq!(found.map(|m| m.execution_id), Some(*owner));
                prop_assert!(seen.insert(*owner));
            }
            prop_assert!(registry.is_empty());

            for (value, (_, handle)) in values.iter().zip(handles) {
                let delivered = handle.wait().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(&delivered.payload, value);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
