//! Name- and message-based lookup of scenario definitions.

use std::{collections::HashMap, fmt, sync::Arc};

use tracing::debug;

use super::{MessagePattern, PatternMapper, Scenario, ScenarioMapper};
use crate::{SimulatorError, message::Message};

/// A scenario selected for an inbound message.
#[derive(Clone)]
pub struct ScenarioMatch {
    pub name: String,
    pub scenario: Arc<dyn Scenario>,
}

impl fmt::Debug for ScenarioMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioMatch")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registered scenarios plus the rules that select them.
///
/// The registry is populated before the simulator starts and read-only
/// afterwards. Mappers are consulted in registration order; the first one
/// naming a registered scenario wins, and the default scenario, if any,
/// handles whatever no mapper claims.
#[derive(Default)]
pub struct ScenarioRegistry {
    scenarios: HashMap<String, Arc<dyn Scenario>>,
    mappers: Vec<Box<dyn ScenarioMapper>>,
    default_scenario: Option<String>,
}

impl ScenarioRegistry {
    /// Create a registry with no scenarios, mappers or default.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `scenario` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::ScenarioContract`] if the name is empty or
    /// taken, or if the scenario declares a parameter without a name or
    /// declares the same parameter twice.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        scenario: impl Scenario,
    ) -> Result<(), SimulatorError> {
        self.register_arc(name, Arc::new(scenario))
    }

    /// Register an already shared scenario instance.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        scenario: Arc<dyn Scenario>,
    ) -> Result<(), SimulatorError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SimulatorError::ScenarioContract(
                "scenario name must not be empty".into(),
            ));
        }
        if self.scenarios.contains_key(&name) {
            return Err(SimulatorError::ScenarioContract(format!(
                "scenario '{name}' is already registered"
            )));
        }
        check_declared_parameters(&name, scenario.as_ref())?;
        debug!(scenario = %name, "scenario registered");
        self.scenarios.insert(name, scenario);
        Ok(())
    }

    /// Register `scenario` and route messages matching `pattern` to it.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_matched(
        &mut self,
        name: impl Into<String>,
        pattern: MessagePattern,
        scenario: impl Scenario,
    ) -> Result<(), SimulatorError> {
        let name = name.into();
        self.register(name.clone(), scenario)?;
        self.add_mapper(PatternMapper::new(pattern, name));
        Ok(())
    }

    /// Append a mapping rule.
    pub fn add_mapper(&mut self, mapper: impl ScenarioMapper) { self.mappers.push(Box::new(mapper)); }

    /// Scenario that handles messages no mapper claims.
    pub fn set_default(&mut self, name: impl Into<String>) { self.default_scenario = Some(name.into()); }

    /// Look up a scenario by name.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::UnknownScenario`] if nothing is registered
    /// under `name`.
    pub fn lookup_by_name(&self, name: &str) -> Result<Arc<dyn Scenario>, SimulatorError> {
        self.scenarios
            .get(name)
            .cloned()
            .ok_or_else(|| SimulatorError::UnknownScenario(name.to_owned()))
    }

    /// Select the scenario for an inbound message.
    #[must_use]
    pub fn match_message(&self, message: &Message) -> Option<ScenarioMatch> {
        let mapped = self.mappers.iter().find_map(|mapper| {
            mapper
                .scenario_name(message)
                .filter(|name| self.scenarios.contains_key(name))
        });
        let name = mapped.or_else(|| self.default_scenario.clone())?;
        let scenario = self.scenarios.get(&name).cloned()?;
        Some(ScenarioMatch { name, scenario })
    }

    /// Registered scenario names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scenarios.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered scenarios.
    #[must_use]
    pub fn len(&self) -> usize { self.scenarios.len() }

    /// Whether no scenario is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.scenarios.is_empty() }
}

fn check_declared_parameters(name: &str, scenario: &dyn Scenario) -> Result<(), SimulatorError> {
    let declared = scenario.parameters();
    for (index, parameter) in declared.iter().enumerate() {
        if parameter.name.trim().is_empty() {
            return Err(SimulatorError::ScenarioContract(format!(
                "scenario '{name}' declares a parameter without a name"
            )));
        }
        if declared[..index].iter().any(|earlier| earlier.name == parameter.name) {
            return Err(SimulatorError::ScenarioContract(format!(
                "scenario '{name}' declares parameter '{}' twice",
                parameter.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::scenario::{HeaderMapper, ScenarioContext, ScenarioError, ScenarioParameter};

    struct Noop;

    #[async_trait]
    impl Scenario for Noop {
        async fn run(&self, _ctx: &mut ScenarioContext) -> Result<(), ScenarioError> { Ok(()) }
    }

    struct Declares(Vec<ScenarioParameter>);

    #[async_trait]
    impl Scenario for Declares {
        async fn run(&self, _ctx: &mut ScenarioContext) -> Result<(), ScenarioError> { Ok(()) }

        fn parameters(&self) -> Vec<ScenarioParameter> { self.0.clone() }
    }

    #[fixture]
    fn registry() -> ScenarioRegistry {
        let mut registry = ScenarioRegistry::new();
        registry
            .register_matched(
                "GetPet",
                MessagePattern::new().path("/pet/{id}").method("GET"),
                Noop,
            )
            .expect("register GetPet");
        registry.register("FaxSent", Noop).expect("register FaxSent");
        registry.register("FaxQueued", Noop).expect("register FaxQueued");
        registry.add_mapper(HeaderMapper::new("scenario"));
        registry
    }

    #[rstest]
    fn structural_match_selects_scenario(registry: ScenarioRegistry) {
        let message = Message::new("").with_path("/pet/3").with_method("GET");
        let found = registry.match_message(&message).expect("GetPet should match");
        assert_eq!(found.name, "GetPet");
    }

    #[rstest]
    fn header_mapping_ignores_unknown_names(mut registry: ScenarioRegistry) {
        let unknown = Message::new("").with_header("scenario", "Missing");
        assert!(registry.match_message(&unknown).is_none());

        registry.set_default("FaxQueued");
        let found = registry.match_message(&unknown).expect("default applies");
        assert_eq!(found.name, "FaxQueued");
    }

    #[rstest]
    fn lookup_by_name_reports_unknown(registry: ScenarioRegistry) {
        assert!(registry.lookup_by_name("FaxSent").is_ok());
        assert!(matches!(
            registry.lookup_by_name("Nope"),
            Err(SimulatorError::UnknownScenario(name)) if name == "Nope"
        ));
    }

    #[rstest]
    #[case("")]
    #[case("FaxSent")]
    fn invalid_names_violate_the_contract(mut registry: ScenarioRegistry, #[case] name: &str) {
        assert!(matches!(
            registry.register(name, Noop),
            Err(SimulatorError::ScenarioContract(_))
        ));
    }

    #[rstest]
    fn duplicate_parameter_declarations_are_rejected(mut registry: ScenarioRegistry) {
        let scenario = Declares(vec![
            ScenarioParameter::new("id", ""),
            ScenarioParameter::new("id", ""),
        ]);
        assert!(matches!(
            registry.register("Twice", scenario),
            Err(SimulatorError::ScenarioContract(_))
        ));
        assert_eq!(registry.len(), 3);
    }
}
