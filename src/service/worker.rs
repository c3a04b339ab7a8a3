//! Task body for a single scenario execution.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::Inner;
use crate::{
    execution::ExecutionStatus,
    metrics,
    scenario::{Scenario, ScenarioContext, ScenarioError},
};

/// Decrements the running gauge even when the task is aborted mid-body.
struct RunningGauge;

impl RunningGauge {
    fn enter() -> Self {
        metrics::inc_running();
        Self
    }
}

impl Drop for RunningGauge {
    fn drop(&mut self) { metrics::dec_running(); }
}

/// Run `scenario` to completion and record the terminal status.
///
/// Panics in the body are caught and recorded as failures.
pub(super) async fn execute(
    inner: Arc<Inner>,
    scenario: Arc<dyn Scenario>,
    mut ctx: ScenarioContext,
    cancel: CancellationToken,
    permit: OwnedSemaphorePermit,
    ready: oneshot::Receiver<()>,
) {
    let _permit = permit;
    let _ = ready.await;
    let _gauge = RunningGauge::enter();
    let id = ctx.execution_id();
    let name = ctx.scenario_name().to_owned();

    let outcome = AssertUnwindSafe(async {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScenarioError::Cancelled),
            result = scenario.run(&mut ctx) => result,
        }
    })
    .catch_unwind()
    .await;
    // Release any handlers the body left registered before reporting.
    drop(ctx);

    let (status, failure) = match outcome {
        Ok(Ok(())) => (ExecutionStatus::Success, None),
        Ok(Err(ScenarioError::Cancelled)) => {
            warn!(execution_id = %id, scenario = %name, "scenario cancelled");
            (ExecutionStatus::Failed, Some(ScenarioError::Cancelled.to_string()))
        }
        Ok(Err(e)) => {
            error!(execution_id = %id, scenario = %name, error = %e, "scenario failed");
            (ExecutionStatus::Failed, Some(e.to_string()))
        }
        Err(panic) => {
            let panic_msg = describe_panic(panic.as_ref());
            error!(execution_id = %id, scenario = %name, panic = %panic_msg, "scenario panicked");
            (ExecutionStatus::Failed, Some(format!("scenario panicked: {panic_msg}")))
        }
    };
    if status == ExecutionStatus::Success {
        info!(execution_id = %id, scenario = %name, "scenario completed");
    }

    inner.running.remove(&id);
    // Shutdown may already have recorded this execution as terminated.
    if inner.services.recorder.complete_execution(id, status, failure) {
        metrics::inc_executions(status);
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else {
        "non-string panic payload".to_owned()
    }
}
