//! Rules mapping inbound messages onto scenario names.

use crate::message::Message;

/// Chooses the scenario that should handle an inbound message.
///
/// Closures of the form `Fn(&Message) -> Option<String>` implement this
/// trait.
pub trait ScenarioMapper: Send + Sync + 'static {
    /// Name of the scenario for `message`, if this rule recognises it.
    fn scenario_name(&self, message: &Message) -> Option<String>;
}

impl<F> ScenarioMapper for F
where
    F: Fn(&Message) -> Option<String> + Send + Sync + 'static,
{
    fn scenario_name(&self, message: &Message) -> Option<String> { self(message) }
}

/// Maps a message to the scenario named in one of its headers.
#[derive(Clone, Debug)]
pub struct HeaderMapper {
    header: String,
}

impl HeaderMapper {
    #[must_use]
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl ScenarioMapper for HeaderMapper {
    fn scenario_name(&self, message: &Message) -> Option<String> {
        message.header(&self.header).map(str::to_owned)
    }
}

/// Structural description of the messages a scenario accepts.
///
/// Every configured criterion must hold. Path templates compare segment by
/// segment; a segment of `*` or `{name}` accepts any single segment.
///
/// ```
/// use scenario_sim::{message::Message, scenario::MessagePattern};
///
/// let pattern = MessagePattern::new().path("/pet/{petId}").method("GET");
/// assert!(pattern.matches(&Message::new("").with_path("/pet/12").with_method("get")));
/// assert!(!pattern.matches(&Message::new("").with_path("/pet").with_method("GET")));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePattern {
    path: Option<String>,
    method: Option<String>,
    headers: Vec<(String, String)>,
    payload_contains: Option<String>,
}

impl MessagePattern {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn path(mut self, template: impl Into<String>) -> Self {
        self.path = Some(template.into());
        self
    }

    /// Require a request method, compared case-insensitively.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn payload_contains(mut self, fragment: impl Into<String>) -> Self {
        self.payload_contains = Some(fragment.into());
        self
    }

    /// Whether `message` meets every criterion.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(template) = &self.path
            && !message
                .path
                .as_deref()
                .is_some_and(|path| path_matches(template, path))
        {
            return false;
        }
        if let Some(method) = &self.method
            && !message
                .method
                .as_deref()
                .is_some_and(|actual| actual.eq_ignore_ascii_case(method))
        {
            return false;
        }
        if !self
            .headers
            .iter()
            .all(|(name, value)| message.header(name) == Some(value.as_str()))
        {
            return false;
        }
        self.payload_contains
            .as_deref()
            .is_none_or(|fragment| message.payload.contains(fragment))
    }
}

fn path_matches(template: &str, path: &str) -> bool {
    let mut expected = template.trim_matches('/').split('/');
    let mut actual = path.trim_matches('/').split('/');
    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return true,
            (Some(want), Some(got)) => {
                let wildcard = want == "*" || (want.starts_with('{') && want.ends_with('}'));
                if !wildcard && want != got {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Binds a [`MessagePattern`] to a scenario name.
#[derive(Clone, Debug)]
pub struct PatternMapper {
    pattern: MessagePattern,
    scenario: String,
}

impl PatternMapper {
    #[must_use]
    pub fn new(pattern: MessagePattern, scenario: impl Into<String>) -> Self {
        Self {
            pattern,
            scenario: scenario.into(),
        }
    }
}

impl ScenarioMapper for PatternMapper {
    fn scenario_name(&self, message: &Message) -> Option<String> {
        self.pattern.matches(message).then(|| self.scenario.clone())
    }
}
