//! Shared utilities for integration tests.
//!
//! Provides small scenarios with predictable behaviour, a simulator fixture
//! wired to a channel endpoint, and helpers for awaiting terminal executions.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::time::Duration;

use async_trait::async_trait;
use scenario_sim::{
    ChannelEndpoint,
    CorrelationKey,
    ExecutionId,
    Message,
    Scenario,
    ScenarioContext,
    ScenarioError,
    ScenarioExecution,
    Simulator,
    SimulatorBuilder,
    SimulatorConfig,
};
use tokio::sync::mpsc;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Completes immediately.
pub struct Succeeds;

#[async_trait]
impl Scenario for Succeeds {
    async fn run(&self, _ctx: &mut ScenarioContext) -> Result<(), ScenarioError> { Ok(()) }
}

/// Fails with a fixed diagnostic.
pub struct Fails;

#[async_trait]
impl Scenario for Fails {
    async fn run(&self, _ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        Err(ScenarioError::failed("kaput"))
    }
}

/// Panics inside the body.
pub struct Panics;

#[async_trait]
impl Scenario for Panics {
    async fn run(&self, _ctx: &mut ScenarioContext) -> Result<(), ScenarioError> { panic!("boom") }
}

/// Sleeps for a minute unless cancelled.
pub struct Sleeps;

#[async_trait]
impl Scenario for Sleeps {
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        ctx.sleep(Duration::from_secs(60)).await
    }
}

/// Blocks its worker thread without yielding, then succeeds.
///
/// Cancellation cannot reach it, so only the shutdown grace period ends it.
pub struct BlocksThread;

/// How long [`BlocksThread`] holds its thread.
pub const BLOCKING_BODY: Duration = Duration::from_millis(400);

#[async_trait]
impl Scenario for BlocksThread {
    async fn run(&self, _ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        std::thread::sleep(BLOCKING_BODY);
        Ok(())
    }
}

/// Waits for a message whose `referenceId` header carries the launch
/// parameter of the same name, then echoes its payload.
pub struct AwaitsReference;

#[async_trait]
impl Scenario for AwaitsReference {
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
        let reference = ctx.require("referenceId")?.to_owned();
        let reply = ctx
            .receive(ctx.correlation(CorrelationKey::new("referenceId", reference)))
            .await?;
        ctx.send(Message::new(format!("echo:{}", reply.payload))).await
    }
}

/// A simulator with the test scenarios registered and its outbound channel.
pub struct Harness {
    pub simulator: Simulator,
    pub outbound: mpsc::Receiver<Message>,
}

/// Register the test scenarios on `builder` and start it with a channel
/// endpoint.
pub fn start(builder: SimulatorBuilder) -> TestResult<Harness> {
    let (endpoint, outbound) = ChannelEndpoint::new(builder.config().outbound_capacity)?;
    let simulator = builder
        .scenario("Succeeds", Succeeds)?
        .scenario("Fails", Fails)?
        .scenario("Panics", Panics)?
        .scenario("Sleeps", Sleeps)?
        .scenario("AwaitsReference", AwaitsReference)?
        .scenario("BlocksThread", BlocksThread)?
        .endpoint(endpoint)
        .start()?;
    Ok(Harness {
        simulator,
        outbound,
    })
}

/// Start the test scenarios with `config`.
pub fn harness_with(config: SimulatorConfig) -> TestResult<Harness> { start(SimulatorBuilder::new(config)) }

/// Poll until `id` reaches a terminal status.
pub async fn wait_for_terminal(simulator: &Simulator, id: ExecutionId) -> TestResult<ScenarioExecution> {
    let poll = async {
        loop {
            if let Some(execution) = simulator.execution(id)
                && execution.status.is_terminal()
            {
                return execution;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .map_err(|_| format!("execution {id} did not finish").into())
}

/// Poll until the registry holds `count` pending handlers.
pub async fn wait_for_pending(simulator: &Simulator, count: usize) -> TestResult<()> {
    let poll = async {
        while simulator.correlation().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .map_err(|_| format!("expected {count} pending handlers").into())
}

/// Receive the next outbound message or fail after a second.
pub async fn next_outbound(outbound: &mut mpsc::Receiver<Message>) -> TestResult<Message> {
    tokio::time::timeout(Duration::from_secs(1), outbound.recv())
        .await?
        .ok_or_else(|| "outbound channel closed".into())
}
