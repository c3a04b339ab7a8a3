//! Per-execution context handed to scenario bodies.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ScenarioError, ScenarioParameter};
use crate::{
    activity::ActivityRecorder,
    correlation::{CorrelationHandle, CorrelationHandler, CorrelationKeySet, CorrelationRegistry, HandlerId},
    endpoint::OutboundEndpoint,
    execution::{EXECUTION_ID_VARIABLE, ExecutionId},
    message::{Direction, Message},
    metrics,
};

/// Collaborators injected into every execution.
#[derive(Clone)]
pub struct ScenarioServices {
    /// Destination for messages the scenario sends.
    pub endpoint: Arc<dyn OutboundEndpoint>,
    /// Registry used for correlated waits.
    pub correlation: CorrelationRegistry,
    /// Recorder receiving the outbound messages.
    pub recorder: Arc<dyn ActivityRecorder>,
}

/// Isolated state of one execution.
///
/// Variables are seeded from the launch parameters plus the execution id
/// under [`EXECUTION_ID_VARIABLE`]. Correlation handlers registered through
/// the context are cancelled when it is dropped, whether the body returned,
/// failed, or was aborted.
pub struct ScenarioContext {
    execution_id: ExecutionId,
    scenario_name: String,
    variables: HashMap<String, String>,
    trigger: Option<Message>,
    services: ScenarioServices,
    cancel: CancellationToken,
    handlers: Vec<HandlerId>,
}

impl ScenarioContext {
    /// Build a context for `execution_id`.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        scenario_name: impl Into<String>,
        parameters: &[ScenarioParameter],
        trigger: Option<Message>,
        services: ScenarioServices,
        cancel: CancellationToken,
    ) -> Self {
        let mut variables: HashMap<String, String> = parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        variables.insert(EXECUTION_ID_VARIABLE.to_owned(), execution_id.to_string());
        Self {
            execution_id,
            scenario_name: scenario_name.into(),
            variables,
            trigger,
            services,
            cancel,
            handlers: Vec::new(),
        }
    }

    /// Identifier of the execution this context belongs to.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId { self.execution_id }

    /// Name the scenario was launched under.
    #[must_use]
    pub fn scenario_name(&self) -> &str { &self.scenario_name }

    /// Inbound message that caused the launch, if the router started it.
    #[must_use]
    pub fn trigger(&self) -> Option<&Message> { self.trigger.as_ref() }

    /// Value of a launch parameter or variable set by the body.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> { self.variables.get(name).map(String::as_str) }

    /// Look up a variable that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::UnknownVariable`] if it is not set.
    pub fn require(&self, name: &str) -> Result<&str, ScenarioError> {
        self.variable(name)
            .ok_or_else(|| ScenarioError::UnknownVariable(name.to_owned()))
    }

    /// Set a variable visible to later [`resolve`](Self::resolve) calls.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Replace every `${name}` in `template` with the variable's value.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::UnknownVariable`] for the first placeholder
    /// naming an unset variable. An unterminated `${` is kept verbatim.
    pub fn resolve(&self, template: &str) -> Result<String, ScenarioError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            out.push_str(self.require(&after[..end])?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Send `message` through the outbound endpoint and record it.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Endpoint`] if the endpoint rejects it.
    pub async fn send(&self, message: Message) -> Result<(), ScenarioError> {
        self.services.endpoint.send(message.clone()).await?;
        self.services
            .recorder
            .append_message(self.execution_id, &message, Direction::Outbound);
        metrics::inc_messages(Direction::Outbound);
        debug!(execution_id = %self.execution_id, "outbound message sent");
        Ok(())
    }

    /// Handler owned by this execution watching `keys` in message headers.
    #[must_use]
    pub fn correlation(&self, keys: impl Into<CorrelationKeySet>) -> CorrelationHandler {
        CorrelationHandler::new(self.execution_id, keys)
    }

    /// Register `handler` without waiting on it yet.
    ///
    /// Registering before sending the message that provokes the reply avoids
    /// missing a fast response.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Correlation`] if registration is refused.
    pub fn expect(&mut self, handler: CorrelationHandler) -> Result<CorrelationHandle, ScenarioError> {
        let handle = self.services.correlation.register(handler)?;
        self.handlers.push(handle.id());
        Ok(handle)
    }

    /// Wait on a handle obtained from [`expect`](Self::expect).
    ///
    /// The delivered message is recorded as inbound on this execution, even
    /// when the execution is cancelled after the message matched.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Correlation`] on timeout or cancellation of
    /// the handler and [`ScenarioError::Cancelled`] if the execution is
    /// cancelled while waiting.
    pub async fn wait(&mut self, handle: CorrelationHandle) -> Result<Message, ScenarioError> {
        let id = handle.id();
        let delivery = handle.wait();
        tokio::pin!(delivery);
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                if self.services.correlation.cancel(id) {
                    Err(ScenarioError::Cancelled)
                } else {
                    // Resolved before the cancel landed; a matched message is kept.
                    delivery.await.map_err(ScenarioError::from)
                }
            }
            outcome = &mut delivery => outcome.map_err(ScenarioError::from),
        };
        self.handlers.retain(|pending| *pending != id);
        if let Ok(message) = &result {
            self.services
                .recorder
                .append_message(self.execution_id, message, Direction::Inbound);
        }
        result
    }

    /// Register `handler` and wait for the message it matches.
    ///
    /// # Errors
    ///
    /// See [`expect`](Self::expect) and [`wait`](Self::wait).
    pub async fn receive(&mut self, handler: CorrelationHandler) -> Result<Message, ScenarioError> {
        let handle = self.expect(handler)?;
        self.wait(handle).await
    }

    /// Sleep unless the execution is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Cancelled`] on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ScenarioError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ScenarioError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Whether the execution has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }
}

impl Drop for ScenarioContext {
    fn drop(&mut self) {
        for id in self.handlers.drain(..) {
            self.services.correlation.cancel(id);
        }
    }
}

impl fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("execution_id", &self.execution_id)
            .field("scenario_name", &self.scenario_name)
            .field("variables", &self.variables)
            .field("pending_handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
