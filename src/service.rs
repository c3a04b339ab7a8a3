//! Scenario execution service.
//!
//! [`ScenarioExecutionService`] turns a launch request into a tracked
//! execution: it validates the parameters, creates the execution record,
//! and runs the scenario body on a bounded pool of Tokio tasks. Each
//! execution owns a child [`CancellationToken`] of the service's shutdown
//! token, so shutdown reaches every body that is waiting or sleeping.

mod worker;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    sync::{Semaphore, oneshot},
    task::AbortHandle,
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};

use crate::{
    Result,
    SimulatorError,
    execution::{ExecutionId, ExecutionStatus},
    message::{Direction, Message},
    metrics,
    scenario::{
        Scenario,
        ScenarioContext,
        ScenarioMatch,
        ScenarioParameter,
        ScenarioRegistry,
        ScenarioServices,
        resolve_parameters,
    },
};

/// Diagnostic recorded for executions aborted at the end of the shutdown
/// grace period.
pub const TERMINATED_AFTER_GRACE: &str = "terminated after shutdown grace period";

struct Running {
    cancel: CancellationToken,
    abort: AbortHandle,
}

struct Inner {
    scenarios: Arc<ScenarioRegistry>,
    services: ScenarioServices,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    closing: AtomicBool,
    running: DashMap<ExecutionId, Running>,
}

/// Runs scenarios as independent, tracked, cancellable executions.
///
/// Cloning the service yields another handle to the same pool.
#[derive(Clone)]
pub struct ScenarioExecutionService {
    inner: Arc<Inner>,
}

impl ScenarioExecutionService {
    /// Create a service running at most `workers` scenario bodies at once.
    #[must_use]
    pub fn new(scenarios: Arc<ScenarioRegistry>, services: ScenarioServices, workers: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                scenarios,
                services,
                permits: Arc::new(Semaphore::new(workers.max(1))),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                closing: AtomicBool::new(false),
                running: DashMap::new(),
            }),
        }
    }

    /// Launch the scenario registered under `name`.
    ///
    /// Waits while every worker is busy, then returns as soon as the body
    /// has been spawned.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::UnknownScenario`] for an unregistered name,
    /// [`SimulatorError::ScenarioContract`] if `parameters` violate the
    /// scenario's declarations, and [`SimulatorError::ShuttingDown`] once
    /// shutdown has begun. No execution record exists in any of these cases.
    pub async fn run(&self, name: &str, parameters: Vec<ScenarioParameter>) -> Result<ExecutionId> {
        let scenario = self.inner.scenarios.lookup_by_name(name)?;
        self.launch(name, scenario, parameters, None).await
    }

    /// Launch an explicit scenario instance under `name`.
    ///
    /// # Errors
    ///
    /// As for [`run`](Self::run), minus the name lookup.
    pub async fn run_with(
        &self,
        scenario: Arc<dyn Scenario>,
        name: &str,
        parameters: Vec<ScenarioParameter>,
    ) -> Result<ExecutionId> {
        self.launch(name, scenario, parameters, None).await
    }

    /// Launch the scenario selected for `trigger`, recording the trigger as
    /// the execution's first inbound message.
    ///
    /// # Errors
    ///
    /// As for [`run`](Self::run).
    pub async fn run_triggered(&self, selected: ScenarioMatch, trigger: Message) -> Result<ExecutionId> {
        let ScenarioMatch { name, scenario } = selected;
        self.launch(&name, scenario, Vec::new(), Some(trigger)).await
    }

    async fn launch(
        &self,
        name: &str,
        scenario: Arc<dyn Scenario>,
        parameters: Vec<ScenarioParameter>,
        trigger: Option<Message>,
    ) -> Result<ExecutionId> {
        if self.is_shutting_down() {
            return Err(SimulatorError::ShuttingDown);
        }
        let parameters = resolve_parameters(&scenario.parameters(), parameters)
            .map_err(SimulatorError::ScenarioContract)?;

        let permit = tokio::select! {
            biased;
            () = self.inner.shutdown.cancelled() => return Err(SimulatorError::ShuttingDown),
            permit = Arc::clone(&self.inner.permits).acquire_owned() => {
                permit.map_err(|_| SimulatorError::ShuttingDown)?
            }
        };
        if self.is_shutting_down() {
            return Err(SimulatorError::ShuttingDown);
        }

        let services = &self.inner.services;
        let execution = services.recorder.create_execution(name, &parameters);
        let id = execution.execution_id;
        if let Some(message) = &trigger {
            services.recorder.append_message(id, message, Direction::Inbound);
        }
        info!(execution_id = %id, scenario = %name, "starting scenario");

        let cancel = self.inner.shutdown.child_token();
        let ctx = ScenarioContext::new(id, name, &parameters, trigger, services.clone(), cancel.clone());
        // The body starts only once it is tracked, so its own removal
        // from `running` cannot precede the insertion.
        let (tracked, ready) = oneshot::channel();
        let handle = self.inner.tracker.spawn(worker::execute(
            Arc::clone(&self.inner),
            scenario,
            ctx,
            cancel.clone(),
            permit,
            ready,
        ));
        self.inner.running.insert(
            id,
            Running {
                cancel,
                abort: handle.abort_handle(),
            },
        );
        let _ = tracked.send(());
        Ok(id)
    }

    /// Cancel one in-flight execution.
    ///
    /// Returns `false` if the execution is not running.
    pub fn cancel(&self, execution_id: ExecutionId) -> bool {
        match self.inner.running.get(&execution_id) {
            Some(running) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of executions whose body has not returned.
    #[must_use]
    pub fn in_flight(&self) -> usize { self.inner.running.len() }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool { self.inner.closing.load(Ordering::Acquire) }

    /// Stop accepting launches and cancel everything in flight.
    ///
    /// Pending correlation handlers are cancelled, bodies are signalled
    /// through their cancellation tokens, and the call waits up to `grace`
    /// for them to return. Executions still running after that are aborted
    /// and recorded as failed. Later calls return immediately.
    pub async fn shutdown(&self, grace: Duration) {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(in_flight = self.in_flight(), "shutting down scenario execution service");
        self.inner.shutdown.cancel();
        self.inner.permits.close();
        self.inner.services.correlation.clear();
        self.inner.tracker.close();

        if timeout(grace, self.inner.tracker.wait()).await.is_ok() {
            return;
        }
        let stragglers: Vec<(ExecutionId, AbortHandle)> = self
            .inner
            .running
            .iter()
            .map(|entry| (*entry.key(), entry.value().abort.clone()))
            .collect();
        warn!(
            count = stragglers.len(),
            "aborting executions that outlived the shutdown grace period"
        );
        for (id, abort) in stragglers {
            abort.abort();
            self.inner.running.remove(&id);
            if self.inner.services.recorder.complete_execution(
                id,
                ExecutionStatus::Failed,
                Some(TERMINATED_AFTER_GRACE.into()),
            ) {
                metrics::inc_executions(ExecutionStatus::Failed);
            }
        }
    }
}
