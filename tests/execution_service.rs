//! Tests for launching, isolating and cancelling scenario executions.

use std::{collections::BTreeSet, time::Duration};

use futures::future::join_all;
use rstest::{fixture, rstest};
use scenario_sim::{ExecutionStatus, ScenarioParameter, SimulatorConfig, SimulatorError};

mod common;
use common::{Harness, TestResult, harness_with, wait_for_terminal};

#[fixture]
fn harness() -> Harness {
    harness_with(SimulatorConfig::default()).expect("start simulator")
}

/// Concurrent launches receive distinct ids that grow in creation order.
#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_launches_get_unique_increasing_ids(harness: Harness) -> TestResult {
    let simulator = harness.simulator;
    let launches = (0..50).map(|_| {
        let simulator = simulator.clone();
        tokio::spawn(async move { simulator.launch("Succeeds", Vec::new()).await })
    });
    let mut ids = BTreeSet::new();
    for joined in join_all(launches).await {
        assert!(ids.insert(joined??));
    }
    assert_eq!(ids.len(), 50);

    for id in &ids {
        wait_for_terminal(&simulator, *id).await?;
    }
    let executions = simulator.executions();
    assert_eq!(executions.len(), 50);
    assert!(
        executions
            .windows(2)
            .all(|pair| pair[0].execution_id < pair[1].execution_id)
    );
    Ok(())
}

/// A failing scenario is recorded as failed without touching its neighbours.
#[rstest]
#[tokio::test]
async fn failures_are_isolated(harness: Harness) -> TestResult {
    let simulator = harness.simulator;
    let failing = simulator.launch("Fails", Vec::new()).await?;
    let passing = simulator.launch("Succeeds", Vec::new()).await?;

    let failed = wait_for_terminal(&simulator, failing).await?;
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("kaput"));
    assert!(failed.end.is_some_and(|end| end >= failed.start));

    let succeeded = wait_for_terminal(&simulator, passing).await?;
    assert_eq!(succeeded.status, ExecutionStatus::Success);
    assert!(succeeded.error.is_none());
    Ok(())
}

/// A panicking body fails its execution and leaves the pool usable.
#[rstest]
#[tokio::test]
async fn panics_fail_the_execution(harness: Harness) -> TestResult {
    let simulator = harness.simulator;
    let panicking = simulator.launch("Panics", Vec::new()).await?;
    let failed = wait_for_terminal(&simulator, panicking).await?;
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert!(failed.error.is_some_and(|error| error.contains("boom")));

    let next = simulator.launch("Succeeds", Vec::new()).await?;
    assert_eq!(wait_for_terminal(&simulator, next).await?.status, ExecutionStatus::Success);
    Ok(())
}

/// Unknown names are refused before any record exists.
#[rstest]
#[tokio::test]
async fn refused_launches_leave_no_record(harness: Harness) -> TestResult {
    let simulator = harness.simulator;
    assert!(matches!(
        simulator.launch("Nope", Vec::new()).await,
        Err(SimulatorError::UnknownScenario(name)) if name == "Nope"
    ));
    assert!(simulator.executions().is_empty());
    Ok(())
}

/// Declared parameters are checked and merged with their defaults.
#[tokio::test]
async fn declared_parameters_are_enforced() -> TestResult {
    let simulator = scenario_sim::samples::register_all(scenario_sim::SimulatorBuilder::default())?.start()?;

    let missing = simulator.launch("UpdateFaxStatus", Vec::new()).await;
    assert!(matches!(missing, Err(SimulatorError::ScenarioContract(reason)) if reason.contains("referenceId")));

    let bad_option = simulator
        .launch(
            "HelloStarter",
            vec![ScenarioParameter::new("title", "Dr")],
        )
        .await;
    assert!(matches!(bad_option, Err(SimulatorError::ScenarioContract(_))));
    assert!(simulator.executions().is_empty());

    let id = simulator
        .launch("HelloStarter", vec![ScenarioParameter::new("firstname", "Minnie")])
        .await?;
    let execution = wait_for_terminal(&simulator, id).await?;
    assert_eq!(execution.status, ExecutionStatus::Success);
    let firstname = execution
        .parameters
        .iter()
        .find(|p| p.name == "firstname")
        .ok_or("firstname recorded")?;
    assert_eq!(firstname.value, "Minnie");
    let title = execution
        .parameters
        .iter()
        .find(|p| p.name == "title")
        .ok_or("title recorded")?;
    assert_eq!(title.value, "Miss");
    Ok(())
}

/// With every worker busy, further launches wait for a free slot.
#[tokio::test]
async fn launches_wait_for_a_free_worker() -> TestResult {
    let harness = harness_with(SimulatorConfig::default().workers(1))?;
    let simulator = harness.simulator;
    let blocking = simulator.launch("Sleeps", Vec::new()).await?;

    let waiting = tokio::time::timeout(
        Duration::from_millis(50),
        simulator.launch("Succeeds", Vec::new()),
    )
    .await;
    assert!(waiting.is_err(), "launch should wait while the only worker is busy");
    assert_eq!(simulator.executions().len(), 1);

    let queued = {
        let simulator = simulator.clone();
        tokio::spawn(async move { simulator.launch("Succeeds", Vec::new()).await })
    };
    assert!(simulator.cancel(blocking));
    let cancelled = wait_for_terminal(&simulator, blocking).await?;
    assert_eq!(cancelled.status, ExecutionStatus::Failed);

    let next = queued.await??;
    assert_eq!(wait_for_terminal(&simulator, next).await?.status, ExecutionStatus::Success);
    Ok(())
}

/// Cancelling a finished or unknown execution reports `false`.
#[rstest]
#[tokio::test]
async fn cancel_ignores_finished_executions(harness: Harness) -> TestResult {
    let simulator = harness.simulator;
    let id = simulator.launch("Succeeds", Vec::new()).await?;
    wait_for_terminal(&simulator, id).await?;
    assert!(!simulator.cancel(id));
    assert_eq!(simulator.service().in_flight(), 0);
    Ok(())
}
