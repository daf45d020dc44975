//! Known event types.
//!
//! Dynamic event triggers compute a type name and then ask the registry
//! whether such a type exists. Types may carry a factory; otherwise the event
//! is built from the call attributes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::event::{Event, Invalidated};

pub type EventFactory = Arc<dyn Fn(&[Value]) -> Event + Send + Sync>;

pub struct EventRegistry {
    types: RwLock<HashMap<String, Option<EventFactory>>>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .types
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("EventRegistry").field("types", &names).finish()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        let registry = Self {
            types: RwLock::new(HashMap::new()),
        };
        registry.register(Event::GENERIC);
        registry.register(Invalidated::TYPE);
        registry
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, type_name: impl Into<String>) {
        if let Ok(mut types) = self.types.write() {
            types.entry(type_name.into()).or_insert(None);
        }
    }

    pub fn register_with<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&[Value]) -> Event + Send + Sync + 'static,
    {
        if let Ok(mut types) = self.types.write() {
            types.insert(type_name.into(), Some(Arc::new(factory)));
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types
            .read()
            .map(|t| t.contains_key(type_name))
            .unwrap_or(false)
    }

    /// Instantiate `type_name` with the given attributes.
    pub fn make(&self, type_name: &str, attributes: &[Value]) -> Event {
        let factory = self
            .types
            .read()
            .ok()
            .and_then(|t| t.get(type_name).cloned().flatten());
        match factory {
            Some(factory) => factory(attributes),
            None => Event::from_attributes(type_name, attributes),
        }
    }
}
