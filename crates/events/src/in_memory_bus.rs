//! In-memory event bus for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, mpsc};

use serde_json::Value;
use tracing::debug;

use crate::bus::{BusError, EventBus, Subscription};
use crate::event::Event;

/// Listener callback; the returned value is the listener's response.
pub type Listener = Arc<dyn Fn(&Event, &[Value]) -> Result<Value, String> + Send + Sync>;

/// Listen to everything.
pub const WILDCARD: &str = "*";

/// One recorded call to the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub event: Event,
    pub payload: Vec<Value>,
    /// True when dispatched in "until halted" mode.
    pub halt: bool,
}

impl Dispatch {
    pub fn name(&self) -> &str {
        self.event.name()
    }

    pub fn type_name(&self) -> &str {
        self.event.type_name()
    }
}

/// In-memory bus.
///
/// - No IO / no async
/// - Listeners keyed by event type, event name or [`WILDCARD`]
/// - Every dispatch is recorded and fanned out to channel subscribers
#[derive(Default)]
pub struct InMemoryEventBus {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    dispatched: Mutex<Vec<Dispatch>>,
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus").finish_non_exhaustive()
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a listener for an event type, an event name or [`WILDCARD`].
    pub fn listen<F>(&self, key: impl Into<String>, listener: F)
    where
        F: Fn(&Event, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.entry(key.into()).or_default().push(Arc::new(listener));
        }
    }

    /// Receive a copy of every event published from now on.
    pub fn subscribe(&self) -> Subscription<Event> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        Subscription::new(rx)
    }

    /// Every dispatch seen so far, oldest first.
    pub fn dispatched(&self) -> Vec<Dispatch> {
        self.dispatched.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Dispatches whose event type or name equals `key`.
    pub fn dispatched_named(&self, key: &str) -> Vec<Dispatch> {
        self.dispatched()
            .into_iter()
            .filter(|d| d.type_name() == key || d.name() == key)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut dispatched) = self.dispatched.lock() {
            dispatched.clear();
        }
    }

    fn matching(&self, event: &Event) -> Result<Vec<Listener>, BusError> {
        let listeners = self.listeners.read().map_err(|_| BusError::Poisoned)?;
        let mut keys = vec![event.type_name()];
        if event.name() != event.type_name() {
            keys.push(event.name());
        }
        keys.push(WILDCARD);

        Ok(keys
            .into_iter()
            .filter_map(|k| listeners.get(k))
            .flatten()
            .cloned()
            .collect())
    }

    fn record(&self, event: &Event, payload: &[Value], halt: bool) -> Result<(), BusError> {
        debug!(event = event.name(), event_type = event.type_name(), halt, "dispatching event");

        self.dispatched
            .lock()
            .map_err(|_| BusError::Poisoned)?
            .push(Dispatch {
                event: event.clone(),
                payload: payload.to_vec(),
                halt,
            });

        let mut subs = self.subscribers.lock().map_err(|_| BusError::Poisoned)?;
        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(event.clone()).is_ok());
        Ok(())
    }

    fn call(listener: &Listener, event: &Event, payload: &[Value]) -> Result<Value, BusError> {
        listener(event, payload).map_err(|message| BusError::Listener {
            event: event.name().to_string(),
            message,
        })
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, event: &Event, payload: &[Value]) -> Result<Vec<Value>, BusError> {
        self.record(event, payload, false)?;
        self.matching(event)?
            .iter()
            .map(|listener| Self::call(listener, event, payload))
            .collect()
    }

    fn publish_until_halted(&self, event: &Event, payload: &[Value]) -> Result<Vec<Value>, BusError> {
        self.record(event, payload, true)?;
        let mut responses = Vec::new();
        for listener in self.matching(event)? {
            let response = Self::call(&listener, event, payload)?;
            let halted = !response.is_null();
            responses.push(response);
            if halted {
                break;
            }
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_collects_every_response() {
        let bus = InMemoryEventBus::new();
        bus.listen("app::Saved", |_, _| Ok(json!(1)));
        bus.listen(WILDCARD, |_, _| Ok(Value::Null));

        let responses = bus.publish(&Event::new("app::Saved"), &[]).unwrap();
        assert_eq!(responses, vec![json!(1), Value::Null]);

        let recorded = bus.dispatched();
        assert_eq!(recorded.len(), 1);
        assert!(!recorded[0].halt);
    }

    #[test]
    fn until_halted_stops_at_first_non_null() {
        let bus = InMemoryEventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        bus.listen("app::Saving", move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let c = calls.clone();
        bus.listen("app::Saving", move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(json!(false))
        });
        let c = calls.clone();
        bus.listen("app::Saving", move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(json!("never"))
        });

        let responses = bus
            .publish_until_halted(&Event::new("app::Saving"), &[json!({"foo": "bar"})])
            .unwrap();
        assert_eq!(responses, vec![Value::Null, json!(false)]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let recorded = bus.dispatched();
        assert!(recorded[0].halt);
        assert_eq!(recorded[0].payload, vec![json!({"foo": "bar"})]);
    }

    #[test]
    fn listeners_match_on_event_name_too() {
        let bus = InMemoryEventBus::new();
        bus.listen("app::events::user::Created", |e, _| Ok(json!(e.type_name())));

        let event = Event::generic().named("app::events::user::Created");
        let responses = bus.publish(&event, &[]).unwrap();
        assert_eq!(responses, vec![json!(Event::GENERIC)]);
    }

    #[test]
    fn listener_errors_surface() {
        let bus = InMemoryEventBus::new();
        bus.listen(WILDCARD, |_, _| Err("boom".into()));
        let err = bus.publish(&Event::generic(), &[]).unwrap_err();
        assert!(matches!(err, BusError::Listener { ref message, .. } if message == "boom"));
    }

    #[test]
    fn subscribers_receive_published_events() {
        let bus = InMemoryEventBus::new();
        let sub = bus.subscribe();
        bus.publish(&Event::from("foo.bar"), &[]).unwrap();
        let received = sub.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].name(), "foo.bar");
    }
}
