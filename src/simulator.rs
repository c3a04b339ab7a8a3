//! Assembled simulator: scenarios, correlation, execution and routing.
//!
//! [`SimulatorBuilder`] collects scenario definitions and collaborators and
//! wires them into a running [`Simulator`]. Transport adapters only need
//! [`Simulator::receive`] for inbound traffic and an [`OutboundEndpoint`]
//! for outbound traffic.

use std::sync::Arc;

use tracing::info;

use crate::{
    Result,
    activity::{ActivityRecorder, InMemoryActivityRecorder},
    config::SimulatorConfig,
    correlation::CorrelationRegistry,
    endpoint::{DiscardEndpoint, OutboundEndpoint},
    execution::{ExecutionId, ScenarioExecution},
    message::Message,
    router::{FallbackResponder, InboundRouter, RouteOutcome},
    scenario::{
        HeaderMapper,
        MessagePattern,
        Scenario,
        ScenarioMapper,
        ScenarioParameter,
        ScenarioRegistry,
        ScenarioServices,
    },
    service::ScenarioExecutionService,
};

/// Builder for [`Simulator`].
///
/// ```no_run
/// use scenario_sim::{config::SimulatorConfig, samples, simulator::SimulatorBuilder};
///
/// # async fn run() -> scenario_sim::Result<()> {
/// let simulator = samples::register_fax_scenarios(SimulatorBuilder::new(
///     SimulatorConfig::default().workers(4),
/// ))?
/// .start()?;
/// let id = simulator.launch("FaxSent", Vec::new()).await?;
/// # let _ = id;
/// simulator.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SimulatorBuilder {
    config: SimulatorConfig,
    scenarios: ScenarioRegistry,
    recorder: Option<Arc<dyn ActivityRecorder>>,
    endpoint: Option<Arc<dyn OutboundEndpoint>>,
    fallback: Option<Arc<dyn FallbackResponder>>,
}

impl Default for SimulatorBuilder {
    fn default() -> Self { Self::new(SimulatorConfig::default()) }
}

impl SimulatorBuilder {
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config: config.normalized(),
            scenarios: ScenarioRegistry::new(),
            recorder: None,
            endpoint: None,
            fallback: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SimulatorConfig { &self.config }

    /// Register a scenario launched by name.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::ScenarioContract`](crate::SimulatorError::ScenarioContract)
    /// if the name is empty or already taken, or the scenario's parameter
    /// declarations are invalid.
    pub fn scenario(mut self, name: impl Into<String>, scenario: impl Scenario) -> Result<Self> {
        self.scenarios.register(name, scenario)?;
        Ok(self)
    }

    /// Register a scenario that also handles inbound messages matching
    /// `pattern`.
    ///
    /// # Errors
    ///
    /// See [`scenario`](Self::scenario).
    pub fn matched(
        mut self,
        name: impl Into<String>,
        pattern: MessagePattern,
        scenario: impl Scenario,
    ) -> Result<Self> {
        self.scenarios.register_matched(name, pattern, scenario)?;
        Ok(self)
    }

    /// Add a custom mapping rule, consulted in registration order.
    #[must_use]
    pub fn mapper(mut self, mapper: impl ScenarioMapper) -> Self {
        self.scenarios.add_mapper(mapper);
        self
    }

    #[must_use]
    pub fn recorder(mut self, recorder: Arc<dyn ActivityRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Destination for scenario output. Defaults to [`DiscardEndpoint`].
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl OutboundEndpoint) -> Self {
        self.endpoint = Some(Arc::new(endpoint));
        self
    }

    #[must_use]
    pub fn fallback(mut self, fallback: impl FallbackResponder) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Wire the collaborators together.
    ///
    /// The header mapping configured by
    /// [`SimulatorConfig::scenario_header`] is consulted after every mapper
    /// added to the builder.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::UnknownScenario`](crate::SimulatorError::UnknownScenario)
    /// if the configured default scenario is not registered.
    pub fn start(self) -> Result<Simulator> {
        let Self {
            config,
            mut scenarios,
            recorder,
            endpoint,
            fallback,
        } = self;

        if let Some(header) = &config.scenario_header {
            scenarios.add_mapper(HeaderMapper::new(header.clone()));
        }
        if let Some(name) = &config.default_scenario {
            scenarios.lookup_by_name(name)?;
            scenarios.set_default(name.clone());
        }

        let scenarios = Arc::new(scenarios);
        let recorder: Arc<dyn ActivityRecorder> =
            recorder.unwrap_or_else(|| Arc::new(InMemoryActivityRecorder::new()));
        let endpoint: Arc<dyn OutboundEndpoint> = endpoint.unwrap_or_else(|| Arc::new(DiscardEndpoint));
        let correlation = CorrelationRegistry::new(config.correlation_timeout);
        let service = ScenarioExecutionService::new(
            Arc::clone(&scenarios),
            ScenarioServices {
                endpoint,
                correlation: correlation.clone(),
                recorder: Arc::clone(&recorder),
            },
            config.workers,
        );
        let mut router = InboundRouter::new(
            correlation.clone(),
            Arc::clone(&scenarios),
            service.clone(),
            Arc::clone(&recorder),
        );
        if let Some(fallback) = fallback {
            router = router.with_fallback(fallback);
        }

        info!(
            scenarios = scenarios.len(),
            workers = config.workers,
            default_scenario = ?config.default_scenario,
            "simulator started"
        );
        Ok(Simulator {
            config,
            scenarios,
            correlation,
            recorder,
            service,
            router,
        })
    }
}

/// A running simulator.
#[derive(Clone)]
pub struct Simulator {
    config: SimulatorConfig,
    scenarios: Arc<ScenarioRegistry>,
    correlation: CorrelationRegistry,
    recorder: Arc<dyn ActivityRecorder>,
    service: ScenarioExecutionService,
    router: InboundRouter,
}

impl Simulator {
    #[must_use]
    pub fn builder() -> SimulatorBuilder { SimulatorBuilder::default() }

    /// Launch a scenario by name, as an operator would.
    ///
    /// # Errors
    ///
    /// See [`ScenarioExecutionService::run`].
    pub async fn launch(&self, name: &str, parameters: Vec<ScenarioParameter>) -> Result<ExecutionId> {
        self.service.run(name, parameters).await
    }

    /// Route one inbound message.
    ///
    /// # Errors
    ///
    /// See [`InboundRouter::route`].
    pub async fn receive(&self, message: Message) -> Result<RouteOutcome> { self.router.route(message).await }

    /// Cancel a running execution.
    pub fn cancel(&self, execution_id: ExecutionId) -> bool { self.service.cancel(execution_id) }

    #[must_use]
    pub fn execution(&self, execution_id: ExecutionId) -> Option<ScenarioExecution> {
        self.recorder.execution(execution_id)
    }

    #[must_use]
    pub fn executions(&self) -> Vec<ScenarioExecution> { self.recorder.executions() }

    #[must_use]
    pub fn scenario_names(&self) -> Vec<String> { self.scenarios.names() }

    #[must_use]
    pub fn config(&self) -> &SimulatorConfig { &self.config }

    #[must_use]
    pub fn correlation(&self) -> &CorrelationRegistry { &self.correlation }

    #[must_use]
    pub fn recorder(&self) -> &Arc<dyn ActivityRecorder> { &self.recorder }

    #[must_use]
    pub fn service(&self) -> &ScenarioExecutionService { &self.service }

    /// Shut down using the configured grace period.
    pub async fn shutdown(&self) { self.service.shutdown(self.config.shutdown_grace).await; }

    /// Whether [`shutdown`](Self::shutdown) has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool { self.service.is_shutting_down() }
}
