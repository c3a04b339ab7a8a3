//! Tests for bounded, idempotent simulator shutdown.

use std::time::{Duration, Instant};

use scenario_sim::{
    ExecutionStatus,
    ScenarioParameter,
    SimulatorConfig,
    SimulatorError,
    service::TERMINATED_AFTER_GRACE,
};

mod common;
use common::{BLOCKING_BODY, TestResult, harness_with, wait_for_pending};

/// In-flight executions end terminally and later launches are refused.
#[tokio::test]
async fn shutdown_finishes_in_flight_executions() -> TestResult {
    let harness = harness_with(SimulatorConfig::default().shutdown_grace(Duration::from_secs(2)))?;
    let simulator = harness.simulator;

    let mut ids = Vec::new();
    for _ in 0..2 {
        ids.push(simulator.launch("Sleeps", Vec::new()).await?);
    }
    ids.push(
        simulator
            .launch("AwaitsReference", vec![ScenarioParameter::new("referenceId", "1")])
            .await?,
    );
    wait_for_pending(&simulator, 1).await?;
    assert_eq!(simulator.service().in_flight(), 3);

    tokio::time::timeout(Duration::from_secs(3), simulator.shutdown()).await?;

    for id in ids {
        let execution = simulator.execution(id).ok_or("execution recorded")?;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.end.is_some());
    }
    assert_eq!(simulator.service().in_flight(), 0);
    assert!(simulator.correlation().is_empty());
    assert!(simulator.is_shutting_down());

    assert!(matches!(
        simulator.launch("Succeeds", Vec::new()).await,
        Err(SimulatorError::ShuttingDown)
    ));
    assert_eq!(simulator.executions().len(), 3);
    Ok(())
}

/// Bodies that ignore cancellation are terminated once the grace period ends.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stragglers_are_terminated_after_the_grace_period() -> TestResult {
    let harness = harness_with(SimulatorConfig::default().shutdown_grace(Duration::from_millis(50)))?;
    let simulator = harness.simulator;
    let id = simulator.launch("BlocksThread", Vec::new()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    simulator.shutdown().await;
    assert!(started.elapsed() < BLOCKING_BODY / 2, "shutdown waited for the body");

    let execution = simulator.execution(id).ok_or("execution recorded")?;
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.error.as_deref(), Some(TERMINATED_AFTER_GRACE));
    assert_eq!(simulator.service().in_flight(), 0);

    // The body returning later does not overwrite the outcome.
    tokio::time::sleep(BLOCKING_BODY).await;
    let execution = simulator.execution(id).ok_or("execution recorded")?;
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.error.as_deref(), Some(TERMINATED_AFTER_GRACE));
    Ok(())
}

/// Launches waiting for a worker are refused once shutdown starts.
#[tokio::test]
async fn waiting_launches_are_refused_on_shutdown() -> TestResult {
    let harness = harness_with(SimulatorConfig::default().workers(1))?;
    let simulator = harness.simulator;
    simulator.launch("Sleeps", Vec::new()).await?;

    let waiting = {
        let simulator = simulator.clone();
        tokio::spawn(async move { simulator.launch("Succeeds", Vec::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    simulator.shutdown().await;

    assert!(matches!(waiting.await?, Err(SimulatorError::ShuttingDown)));
    assert_eq!(simulator.executions().len(), 1);
    Ok(())
}

/// Repeated shutdown calls return immediately.
#[tokio::test]
async fn shutdown_is_idempotent() -> TestResult {
    let harness = harness_with(SimulatorConfig::default())?;
    let simulator = harness.simulator;
    simulator.shutdown().await;
    tokio::time::timeout(Duration::from_millis(100), simulator.shutdown()).await?;
    Ok(())
}
