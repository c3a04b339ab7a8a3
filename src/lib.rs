#![doc(html_root_url = "https://docs.rs/scenario_sim/latest")]
//! Public API for the `scenario_sim` library.
//!
//! This crate provides the core of a test-double simulator: inbound
//! messages either wake a running scenario waiting on a correlated reply or
//! launch a new scenario execution, and every execution is recorded with
//! its parameters, messages and outcome.

pub mod activity;
pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod execution;
pub mod message;
pub mod metrics;
pub mod router;
pub mod samples;
pub mod scenario;
pub mod service;
pub mod simulator;

pub use activity::{ActivityRecorder, InMemoryActivityRecorder};
pub use config::SimulatorConfig;
pub use correlation::{CorrelationHandler, CorrelationKey, CorrelationKeySet, CorrelationRegistry};
pub use endpoint::{ChannelEndpoint, OutboundEndpoint};
/// Result type alias re-exported for the launch and routing surface.
pub use error::{Result, SimulatorError};
pub use execution::{ExecutionId, ExecutionStatus, ScenarioExecution};
pub use message::{Direction, Message};
pub use router::{InboundRouter, RouteOutcome};
pub use scenario::{Scenario, ScenarioContext, ScenarioError, ScenarioParameter, ScenarioRegistry};
pub use service::ScenarioExecutionService;
pub use simulator::{Simulator, SimulatorBuilder};
