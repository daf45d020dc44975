//! Event values emitted around runnables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named signal carrying a flat bag of properties.
///
/// `type_name` is the event type that was instantiated; `name` is what
/// listeners see as the event's identity and defaults to the type name.
/// Dynamically resolved events usually fall back to the generic type while
/// carrying a specific name such as `app::events::user::Creating`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    type_name: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity: Option<Value>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

impl Event {
    pub const GENERIC: &'static str = "cadence::events::Event";

    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: type_name.clone(),
            type_name,
            entity: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn generic() -> Self {
        Self::new(Self::GENERIC)
    }

    /// Build an event whose properties are the entries of `payload`.
    ///
    /// Null entries are not captured. A non-object payload is kept under
    /// `payload` unless it is null.
    pub fn with_payload(type_name: impl Into<String>, payload: Value) -> Self {
        let mut event = Self::new(type_name);
        match payload {
            Value::Object(map) => {
                for (key, value) in map {
                    event.set(key, value);
                }
            }
            Value::Null => {}
            other => {
                event.set("payload", other);
            }
        }
        event
    }

    /// Build an event from call attributes; the first one is the payload.
    pub fn from_attributes(type_name: impl Into<String>, attributes: &[Value]) -> Self {
        let payload = attributes.first().cloned().unwrap_or(Value::Null);
        Self::with_payload(type_name, payload)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_generic(&self) -> bool {
        self.type_name == Self::GENERIC
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    pub fn entity(&self) -> Option<&Value> {
        self.entity.as_ref()
    }

    pub fn with_entity(mut self, entity: impl Into<Value>) -> Self {
        let entity = entity.into();
        self.entity = (!entity.is_null()).then_some(entity);
        self
    }

    /// Set a property; null removes it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        match value.into() {
            Value::Null => {
                self.properties.remove(&key);
            }
            value => {
                self.properties.insert(key, value);
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Captured properties only.
    pub fn payload(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Captured properties plus `event` and, when set, `entity`.
    pub fn properties(&self) -> BTreeMap<String, Value> {
        let mut all = self.properties.clone();
        all.insert("event".to_string(), Value::String(self.name.clone()));
        if let Some(entity) = &self.entity {
            all.insert("entity".to_string(), entity.clone());
        }
        all
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.properties().into_iter().collect())
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::generic()
    }
}

/// A bare name becomes a generic event carrying that name, e.g. `"foo.bar"`.
impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Self::generic().named(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Self::generic().named(name)
    }
}

/// Signal that cache entries grouped under `tags` are stale.
///
/// Eviction is left to whoever listens for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidated {
    pub tags: Vec<String>,
}

impl Invalidated {
    pub const TYPE: &'static str = "cadence::events::Invalidated";

    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    pub fn into_event(self) -> Event {
        let mut event = Event::new(Self::TYPE);
        event.set("tags", self.tags);
        event
    }

    pub fn from_event(event: &Event) -> Option<Self> {
        if event.type_name() != Self::TYPE {
            return None;
        }
        let tags = match event.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Some(Self { tags })
    }
}

impl From<Invalidated> for Event {
    fn from(value: Invalidated) -> Self {
        value.into_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_entries_become_properties() {
        let event = Event::with_payload("app::events::Saved", json!({"id": 7, "note": null}));
        assert_eq!(event.get("id"), Some(&json!(7)));
        assert!(event.get("note").is_none());
        assert_eq!(event.name(), "app::events::Saved");
    }

    #[test]
    fn properties_include_event_name_and_entity() {
        let event = Event::generic()
            .named("app::events::user::Created")
            .with_entity(json!({"id": 1}));
        let props = event.properties();
        assert_eq!(props["event"], json!("app::events::user::Created"));
        assert_eq!(props["entity"], json!({"id": 1}));
        assert!(event.payload().is_empty());
    }

    #[test]
    fn scalar_payload_is_kept_under_payload() {
        let event = Event::from_attributes(Event::GENERIC, &[json!(true)]);
        assert_eq!(event.get("payload"), Some(&json!(true)));
    }

    #[test]
    fn invalidated_round_trips_through_event() {
        let event: Event = Invalidated::new(vec!["users".into(), "teams".into()]).into();
        assert_eq!(event.type_name(), Invalidated::TYPE);
        let back = Invalidated::from_event(&event).unwrap();
        assert_eq!(back.tags, vec!["users", "teams"]);
        assert!(Invalidated::from_event(&Event::generic()).is_none());
    }

    #[test]
    fn bare_names_are_generic_events() {
        let event = Event::from("foo.bar");
        assert!(event.is_generic());
        assert_eq!(event.name(), "foo.bar");
    }
}
