//! Declarative launch parameters.

use serde::{Deserialize, Serialize};

/// One selectable entry of a dropdown parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterOption {
    pub key: String,
    pub value: String,
}

/// Input control used to present a parameter to an operator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterKind {
    #[default]
    Textbox,
    Textarea,
    Dropdown { options: Vec<ParameterOption> },
}

/// A named value passed to a scenario at launch.
///
/// Scenarios declare their parameters with defaults; launch requests supply
/// values by name. Only `name` is required when deserializing, so a launch
/// request can be as small as `[{"name": "referenceId", "value": "42"}]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioParameter {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kind: ParameterKind,
    #[serde(default)]
    pub value: String,
}

impl ScenarioParameter {
    /// A plain text value, as supplied by a launch request.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            required: false,
            kind: ParameterKind::Textbox,
            value: value.into(),
        }
    }

    /// Start building a declared parameter.
    #[must_use]
    pub fn builder() -> ScenarioParameterBuilder { ScenarioParameterBuilder::default() }

    fn option_keys(&self) -> Option<impl Iterator<Item = &str>> {
        match &self.kind {
            ParameterKind::Dropdown { options } => Some(options.iter().map(|o| o.key.as_str())),
            _ => None,
        }
    }
}

/// Builder for declared [`ScenarioParameter`]s.
///
/// ```
/// use scenario_sim::scenario::{ParameterKind, ScenarioParameter};
///
/// let title = ScenarioParameter::builder()
///     .name("title")
///     .label("Title")
///     .required()
///     .dropdown()
///     .add_option("Mr", "Mr.")
///     .add_option("Miss", "Miss")
///     .value("Miss")
///     .build();
/// assert!(matches!(title.kind, ParameterKind::Dropdown { ref options } if options.len() == 2));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ScenarioParameterBuilder {
    name: String,
    label: String,
    required: bool,
    kind: ParameterKind,
    value: String,
}

impl ScenarioParameterBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn textbox(mut self) -> Self {
        self.kind = ParameterKind::Textbox;
        self
    }

    #[must_use]
    pub fn textarea(mut self) -> Self {
        self.kind = ParameterKind::Textarea;
        self
    }

    /// Present the parameter as a dropdown. Add entries with
    /// [`add_option`](Self::add_option).
    #[must_use]
    pub fn dropdown(mut self) -> Self {
        if !matches!(self.kind, ParameterKind::Dropdown { .. }) {
            self.kind = ParameterKind::Dropdown {
                options: Vec::new(),
            };
        }
        self
    }

    /// Append a dropdown entry, switching the parameter to a dropdown if
    /// needed.
    #[must_use]
    pub fn add_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self = self.dropdown();
        if let ParameterKind::Dropdown { options } = &mut self.kind {
            options.push(ParameterOption {
                key: key.into(),
                value: value.into(),
            });
        }
        self
    }

    /// Default value used when a launch does not supply one.
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    #[must_use]
    pub fn build(self) -> ScenarioParameter {
        ScenarioParameter {
            name: self.name,
            label: self.label,
            required: self.required,
            kind: self.kind,
            value: self.value,
        }
    }
}

/// Merge supplied values over declared defaults.
///
/// Declared parameters come first, in declaration order, followed by any
/// supplied parameter the scenario did not declare.
///
/// # Errors
///
/// Returns a description of the first violation: a required parameter left
/// empty, or a dropdown value that is not one of its option keys.
pub(crate) fn resolve_parameters(
    declared: &[ScenarioParameter],
    supplied: Vec<ScenarioParameter>,
) -> Result<Vec<ScenarioParameter>, String> {
    let mut supplied = supplied;
    let mut resolved = Vec::with_capacity(declared.len() + supplied.len());
    for declaration in declared {
        let mut parameter = declaration.clone();
        if let Some(index) = supplied.iter().position(|p| p.name == declaration.name) {
            parameter.value = supplied.remove(index).value;
        }
        if parameter.required && parameter.value.is_empty() {
            return Err(format!("missing required parameter '{}'", parameter.name));
        }
        if let Some(mut keys) = parameter.option_keys()
            && !parameter.value.is_empty()
            && !keys.any(|key| key == parameter.value)
        {
            return Err(format!(
                "value '{}' is not an option of parameter '{}'",
                parameter.value, parameter.name
            ));
        }
        resolved.push(parameter);
    }
    resolved.extend(supplied);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn declared() -> Vec<ScenarioParameter> {
        vec![
            ScenarioParameter::builder()
                .name("title")
                .required()
                .add_option("Mr", "Mr.")
                .add_option("Miss", "Miss")
                .value("Miss")
                .build(),
            ScenarioParameter::builder()
                .name("referenceId")
                .required()
                .textbox()
                .build(),
        ]
    }

    #[test]
    fn supplied_values_override_defaults() {
        let resolved = resolve_parameters(
            &declared(),
            vec![
                ScenarioParameter::new("referenceId", "42"),
                ScenarioParameter::new("extra", "kept"),
            ],
        )
        .expect("parameters should resolve");

        let values: Vec<(&str, &str)> = resolved
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![("title", "Miss"), ("referenceId", "42"), ("extra", "kept")]
        );
    }

    #[rstest]
    #[case(vec![], "missing required parameter 'referenceId'")]
    #[case(
        vec![ScenarioParameter::new("referenceId", "1"), ScenarioParameter::new("title", "Dr")],
        "value 'Dr' is not an option of parameter 'title'"
    )]
    fn violations_are_reported(#[case] supplied: Vec<ScenarioParameter>, #[case] expected: &str) {
        let error = resolve_parameters(&declared(), supplied).expect_err("launch should fail");
        assert_eq!(error, expected);
    }

    #[test]
    fn launch_requests_deserialize_from_minimal_json() {
        let parameters: Vec<ScenarioParameter> =
            serde_json::from_str(r#"[{"name":"referenceId","value":"42"}]"#)
                .expect("launch body should deserialize");
        assert_eq!(parameters, vec![ScenarioParameter::new("referenceId", "42")]);
    }
}
