//! Correlation keys and the rules that extract them from messages.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A name/value pair identifying the conversation a message belongs to.
///
/// ```
/// use scenario_sim::correlation::CorrelationKey;
///
/// let key = CorrelationKey::new("referenceId", "42");
/// assert_eq!(key.to_string(), "referenceId=42");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationKey {
    name: String,
    value: String,
}

impl CorrelationKey {
    /// Create a key from its name and expected value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Name under which the value is carried by a message.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Value a message must carry to satisfy this key.
    #[must_use]
    pub fn value(&self) -> &str { &self.value }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Ordered set of keys watched by a single handler.
///
/// Equality is set equality, so two handlers built from the same keys in a
/// different order collide in the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKeySet(BTreeSet<CorrelationKey>);

impl CorrelationKeySet {
    /// Create an empty key set.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Add a key to the set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(CorrelationKey::new(name, value));
        self
    }

    /// Iterate over the keys in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CorrelationKey> { self.0.iter() }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether the set contains no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Whether `message` carries every key of this set, as seen by `extractor`.
    #[must_use]
    pub fn satisfied_by(&self, message: &Message, extractor: &dyn KeyExtractor) -> bool {
        self.0
            .iter()
            .all(|key| extractor.extract(key.name(), message).as_deref() == Some(key.value()))
    }
}

impl From<CorrelationKey> for CorrelationKeySet {
    fn from(key: CorrelationKey) -> Self { Self(BTreeSet::from([key])) }
}

impl FromIterator<CorrelationKey> for CorrelationKeySet {
    fn from_iter<I: IntoIterator<Item = CorrelationKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CorrelationKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, key) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("}")
    }
}

/// An inbound message whose JSON payload has been parsed at most once.
///
/// The registry builds one per lookup so extractors reading the payload do
/// not re-parse it for every waiting handler.
#[derive(Debug)]
pub struct ParsedMessage<'a> {
    message: &'a Message,
    json: Option<serde_json::Value>,
}

impl<'a> ParsedMessage<'a> {
    /// Parse `message`'s payload if it looks like a JSON object or array.
    #[must_use]
    pub fn new(message: &'a Message) -> Self {
        let payload = message.payload.trim_start();
        let json = if payload.starts_with(['{', '[']) {
            serde_json::from_str(payload).ok()
        } else {
            None
        };
        Self { message, json }
    }

    #[must_use]
    pub fn message(&self) -> &Message { self.message }

    /// The parsed payload, if it was valid JSON.
    #[must_use]
    pub fn json(&self) -> Option<&serde_json::Value> { self.json.as_ref() }
}

/// Rule that reads the value of a named key from a message.
///
/// Closures of the form `Fn(&str, &Message) -> Option<String>` implement this
/// trait, so ad-hoc rules need no dedicated type.
pub trait KeyExtractor: Send + Sync + 'static {
    /// Return the value carried for `name`, if the message carries one.
    fn extract(&self, name: &str, message: &Message) -> Option<String>;

    /// Like [`extract`](Self::extract), reusing an already parsed payload.
    fn extract_parsed(&self, name: &str, parsed: &ParsedMessage<'_>) -> Option<String> {
        self.extract(name, parsed.message())
    }
}

impl<F> KeyExtractor for F
where
    F: Fn(&str, &Message) -> Option<String> + Send + Sync + 'static,
{
    fn extract(&self, name: &str, message: &Message) -> Option<String> { self(name, message) }
}

/// Reads keys from message headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderExtractor;

impl KeyExtractor for HeaderExtractor {
    fn extract(&self, name: &str, message: &Message) -> Option<String> {
        message.header(name).map(str::to_owned)
    }
}

/// Reads keys from a JSON payload.
///
/// The first field named after the key is used, searching nested objects and
/// arrays depth-first. String and number values are accepted.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFieldExtractor;

impl KeyExtractor for JsonFieldExtractor {
    fn extract(&self, name: &str, message: &Message) -> Option<String> {
        self.extract_parsed(name, &ParsedMessage::new(message))
    }

    fn extract_parsed(&self, name: &str, parsed: &ParsedMessage<'_>) -> Option<String> {
        find_field(parsed.json()?, name)
    }
}

fn find_field(value: &serde_json::Value, name: &str) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(found) = map.get(name).and_then(scalar_text) {
                return Some(found);
            }
            map.values().find_map(|nested| find_field(nested, name))
        }
        serde_json::Value::Array(items) => items.iter().find_map(|item| find_field(item, name)),
        _ => None,
    }
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn key_sets_compare_regardless_of_insertion_order() {
        let left = CorrelationKeySet::new().with("a", "1").with("b", "2");
        let right = CorrelationKeySet::new().with("b", "2").with("a", "1");
        assert_eq!(left, right);
        assert_eq!(left.to_string(), "{a=1, b=2}");
    }

    #[rstest]
    #[case(r#"{"referenceId":"42"}"#, Some("42"))]
    #[case(r#"{"referenceId":42}"#, Some("42"))]
    #[case(r#"{"fax":{"status":{"referenceId":"7"}}}"#, Some("7"))]
    #[case(r#"[{"other":1},{"referenceId":"9"}]"#, Some("9"))]
    #[case(r#"{"referenceId":null}"#, None)]
    #[case("not json", None)]
    fn json_extractor_finds_nested_fields(#[case] payload: &str, #[case] expected: Option<&str>) {
        let message = Message::new(payload);
        assert_eq!(
            JsonFieldExtractor.extract("referenceId", &message).as_deref(),
            expected
        );
    }

    #[test]
    fn set_requires_every_key() {
        let keys = CorrelationKeySet::new()
            .with("referenceId", "1")
            .with("tenant", "acme");
        let partial = Message::new("").with_header("referenceId", "1");
        let full = partial.clone().with_header("tenant", "acme");

        assert!(!keys.satisfied_by(&partial, &HeaderExtractor));
        assert!(keys.satisfied_by(&full, &HeaderExtractor));
    }

    #[rstest]
    #[case("  {\"a\":1}", true)]
    #[case("[1, 2]", true)]
    #[case("plain text", false)]
    #[case("{broken", false)]
    fn payloads_are_parsed_only_when_json(#[case] payload: &str, #[case] parsed: bool) {
        let message = Message::new(payload);
        assert_eq!(ParsedMessage::new(&message).json().is_some(), parsed);
    }

    #[test]
    fn closures_act_as_extractors() {
        let upper = |name: &str, message: &Message| message.header(name).map(str::to_uppercase);
        let message = Message::new("").with_header("id", "abc");
        assert_eq!(upper.extract("id", &message).as_deref(), Some("ABC"));
    }
}
