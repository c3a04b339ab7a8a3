//! Canonical error and result types for the crate.
//!
//! Component errors ([`CorrelationError`], [`ScenarioError`],
//! [`EndpointError`]) stay local to the module that raises them and are folded
//! into [`SimulatorError`] at the public launch and routing surface.

use thiserror::Error;

use crate::{
    correlation::{CorrelationError, CorrelationKeySet},
    endpoint::EndpointError,
    scenario::ScenarioError,
};

/// Top-level error type exposed by `scenario_sim`.
///
/// Errors raised inside a running scenario never surface here; they are
/// captured into that execution's record instead.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Another waiting handler already watches the same correlation keys.
    #[error("correlation keys {0} are already awaited by another handler")]
    DuplicateKey(CorrelationKeySet),
    /// No correlation handler, scenario or fallback accepted the message.
    #[error("no correlation handler or scenario matched the inbound message")]
    NoMatch,
    /// A scenario definition or launch request violates the scenario contract.
    #[error("scenario contract violated: {0}")]
    ScenarioContract(String),
    /// A scenario body failed while executing.
    #[error("scenario failed: {0}")]
    ScenarioRuntime(#[from] ScenarioError),
    /// A correlated wait expired before a matching message arrived.
    #[error("correlation wait timed out")]
    Timeout,
    /// No scenario is registered under the requested name.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
    /// The simulator is shutting down and refuses new launches.
    #[error("simulator is shutting down")]
    ShuttingDown,
    /// A correlated wait was cancelled before it resolved.
    #[error("operation cancelled")]
    Cancelled,
    /// An outbound endpoint rejected a message.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
    /// A correlation registry operation failed.
    #[error("correlation error: {0}")]
    Correlation(CorrelationError),
}

impl From<CorrelationError> for SimulatorError {
    fn from(error: CorrelationError) -> Self {
        match error {
            CorrelationError::DuplicateKey(keys) => Self::DuplicateKey(keys),
            CorrelationError::TimedOut => Self::Timeout,
            CorrelationError::Cancelled => Self::Cancelled,
            other => Self::Correlation(other),
        }
    }
}

/// Canonical result alias used by `scenario_sim` public APIs.
pub type Result<T> = std::result::Result<T, SimulatorError>;
