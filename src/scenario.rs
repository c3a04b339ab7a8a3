//! Scenario definitions and the registry that selects them.
//!
//! A scenario is any type implementing [`Scenario`]: one asynchronous entry
//! point receiving the execution's [`ScenarioContext`], plus the list of
//! parameters it accepts at launch.

mod context;
mod mapper;
mod parameter;
mod registry;

use async_trait::async_trait;
use thiserror::Error;

pub use context::{ScenarioContext, ScenarioServices};
pub use mapper::{HeaderMapper, MessagePattern, PatternMapper, ScenarioMapper};
pub(crate) use parameter::resolve_parameters;
pub use parameter::{ParameterKind, ParameterOption, ScenarioParameter, ScenarioParameterBuilder};
pub use registry::{ScenarioMatch, ScenarioRegistry};

use crate::{correlation::CorrelationError, endpoint::EndpointError};

/// Errors raised from inside a scenario body.
///
/// These never leave the execution that raised them; the execution service
/// records them on the execution as its failure diagnostic.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The scenario decided the exchange failed.
    #[error("{0}")]
    Failed(String),
    /// A template or lookup referenced a variable the context does not hold.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    /// A correlated wait failed.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    /// An outbound message could not be sent.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    /// The execution was cancelled, usually by shutdown.
    #[error("execution cancelled")]
    Cancelled,
}

impl ScenarioError {
    /// Fail the scenario with a free-form diagnostic.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self { Self::Failed(message.into()) }
}

/// A simulated behaviour that can be launched as an execution.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use scenario_sim::{
///     message::Message,
///     scenario::{Scenario, ScenarioContext, ScenarioError},
/// };
///
/// struct Echo;
///
/// #[async_trait]
/// impl Scenario for Echo {
///     async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError> {
///         let payload = ctx
///             .trigger()
///             .map(|message| message.payload.clone())
///             .unwrap_or_default();
///         ctx.send(Message::new(payload)).await
///     }
/// }
/// ```
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    /// Run the scenario body to completion.
    ///
    /// # Errors
    ///
    /// Any error marks the execution as failed.
    async fn run(&self, ctx: &mut ScenarioContext) -> Result<(), ScenarioError>;

    /// Parameters accepted at launch, with their defaults.
    fn parameters(&self) -> Vec<ScenarioParameter> { Vec::new() }
}
