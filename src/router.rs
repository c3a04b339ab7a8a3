//! Inbound message dispatch.
//!
//! Every inbound message is offered to the correlation registry first, so
//! replies to running executions are never mistaken for new requests. Only
//! uncorrelated messages select and launch a scenario, and messages nothing
//! claims go to the fallback responder if one is installed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    Result,
    SimulatorError,
    activity::ActivityRecorder,
    correlation::{CorrelationRegistry, HandlerId},
    execution::ExecutionId,
    message::{Direction, Message},
    metrics,
    scenario::ScenarioRegistry,
    service::ScenarioExecutionService,
};

/// Produces a reply for messages no handler or scenario claims.
pub trait FallbackResponder: Send + Sync + 'static {
    /// Reply to `message`, or `None` to acknowledge it silently.
    fn respond(&self, message: &Message) -> Option<Message>;
}

impl<F> FallbackResponder for F
where
    F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
{
    fn respond(&self, message: &Message) -> Option<Message> { self(message) }
}

/// Fallback that answers every unclaimed message with the same reply.
#[derive(Clone, Debug)]
pub struct StaticFallback {
    reply: Message,
}

impl StaticFallback {
    /// Answer every unclaimed message with a copy of `reply`.
    #[must_use]
    pub fn new(reply: Message) -> Self { Self { reply } }
}

impl FallbackResponder for StaticFallback {
    fn respond(&self, _message: &Message) -> Option<Message> { Some(self.reply.clone()) }
}

/// What the router did with an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to a waiting correlation handler.
    Correlated {
        handler: HandlerId,
        execution: ExecutionId,
    },
    /// Started a new execution.
    Launched {
        scenario: String,
        execution: ExecutionId,
    },
    /// Recorded as unhandled; `response` is the fallback reply, if any.
    Fallback { response: Option<Message> },
}

/// Routes inbound messages to handlers, scenarios, or the fallback.
#[derive(Clone)]
pub struct InboundRouter {
    correlation: CorrelationRegistry,
    scenarios: Arc<ScenarioRegistry>,
    service: ScenarioExecutionService,
    recorder: Arc<dyn ActivityRecorder>,
    fallback: Option<Arc<dyn FallbackResponder>>,
}

impl InboundRouter {
    #[must_use]
    pub fn new(
        correlation: CorrelationRegistry,
        scenarios: Arc<ScenarioRegistry>,
        service: ScenarioExecutionService,
        recorder: Arc<dyn ActivityRecorder>,
    ) -> Self {
        Self {
            correlation,
            scenarios,
            service,
            recorder,
            fallback: None,
        }
    }

    /// Install a responder for unclaimed messages.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackResponder>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Dispatch one inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::NoMatch`] if nothing claims the message
    /// and no fallback is installed, and propagates launch errors such as
    /// [`SimulatorError::ShuttingDown`].
    pub async fn route(&self, message: Message) -> Result<RouteOutcome> {
        metrics::inc_messages(Direction::Inbound);

        if let Some(found) = self.correlation.try_match(&message) {
            debug!(
                handler_id = %found.handler_id,
                execution_id = %found.execution_id,
                "inbound message correlated"
            );
            return Ok(RouteOutcome::Correlated {
                handler: found.handler_id,
                execution: found.execution_id,
            });
        }

        if let Some(selected) = self.scenarios.match_message(&message) {
            let scenario = selected.name.clone();
            let execution = self.service.run_triggered(selected, message).await?;
            info!(scenario = %scenario, execution_id = %execution, "inbound message launched scenario");
            return Ok(RouteOutcome::Launched { scenario, execution });
        }

        self.recorder.record_unhandled(&message);
        metrics::inc_unhandled();
        match &self.fallback {
            Some(fallback) => {
                let response = fallback.respond(&message);
                debug!(replied = response.is_some(), "inbound message handled by fallback");
                Ok(RouteOutcome::Fallback { response })
            }
            None => {
                warn!(path = ?message.path, "no handler or scenario matched inbound message");
                Err(SimulatorError::NoMatch)
            }
        }
    }
}
