//! Before/after events around a run.

use cadence_core::inflect::{past, progressive, simple_type_name};
use cadence_core::{RunError, RunResult};
use cadence_events::Event;
use cadence_infra::{PageRequest, Paginator, QueryBuilder};
use serde_json::Value;

use crate::dispatcher::Dispatcher;
use crate::runnable::{Capabilities, EventSpec, Fluent, Kind, Runnable, RunnableState, call_mixin};

/// Fires a "before" event (until halted) and, unless the base aborted, an
/// "after" event (fire all) around the wrapped run. Silenced runs fire
/// neither.
pub struct Evented {
    inner: Box<dyn Runnable>,
    dispatcher: Dispatcher,
}

impl Evented {
    pub fn new(inner: Box<dyn Runnable>, dispatcher: Dispatcher) -> Self {
        Self { inner, dispatcher }
    }

    pub fn resolve_progressive_tense(&self) -> String {
        progressive(simple_type_name(self.to_base().type_name()))
    }

    pub fn resolve_past_tense(&self) -> String {
        past(simple_type_name(self.to_base().type_name()))
    }

    fn before(&self) -> RunResult<()> {
        if self.silenced() {
            return Ok(());
        }
        let base = self.to_base();
        let arguments = base.arguments().to_value();

        match base.before_event() {
            Some(spec) => {
                let event = self.instantiate(spec, &arguments);
                self.dispatcher.until(event, &[])?;
            }
            None => {
                let method = self.resolve_progressive_tense();
                self.dispatcher.fire(&method, base.type_name(), &[arguments], true)?;
            }
        }
        Ok(())
    }

    fn after(&self, response: &Value) -> RunResult<()> {
        if self.silenced() {
            return Ok(());
        }
        let base = self.to_base();

        match base.after_event(response) {
            Some(spec) => {
                let event = self.instantiate(spec, response);
                self.dispatcher.event(event, &[])?;
            }
            None => {
                let method = self.resolve_past_tense();
                self.dispatcher
                    .fire(&method, base.type_name(), &[response.clone()], false)?;
            }
        }
        Ok(())
    }

    fn instantiate(&self, spec: EventSpec, attributes: &Value) -> Event {
        match spec {
            EventSpec::Event(event) => event,
            EventSpec::Named(name) => self
                .dispatcher
                .registry()
                .make(&name, std::slice::from_ref(attributes))
                .named(name),
        }
    }
}

impl Runnable for Evented {
    fn state(&self) -> &RunnableState {
        self.inner.state()
    }

    fn state_mut(&mut self) -> &mut RunnableState {
        self.inner.state_mut()
    }

    fn run(&mut self) -> RunResult<Value> {
        self.before()?;
        let response = self.inner.run()?;
        if !self.aborted() {
            self.after(&response)?;
        }
        Ok(response)
    }

    fn paginate(&mut self, request: &PageRequest) -> RunResult<Paginator> {
        self.inner.paginate(request)
    }

    fn kind(&self) -> Kind {
        self.inner.kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn to_base(&self) -> &dyn Runnable {
        self.inner.to_base()
    }

    fn to_base_mut(&mut self) -> &mut dyn Runnable {
        self.inner.to_base_mut()
    }

    fn wrapped(&self) -> Option<&dyn Runnable> {
        Some(self.inner.as_ref())
    }

    fn wrapped_mut(&mut self) -> Option<&mut dyn Runnable> {
        Some(self.inner.as_mut())
    }

    fn query_builder(&self) -> Option<Box<dyn QueryBuilder>> {
        self.inner.query_builder()
    }

    fn call(&mut self, method: &str, args: &[Value]) -> RunResult<Fluent> {
        match method {
            "resolve_progressive_tense" => Ok(Fluent::Value(Value::String(self.resolve_progressive_tense()))),
            "resolve_past_tense" => Ok(Fluent::Value(Value::String(self.resolve_past_tense()))),
            _ => match call_mixin(self, method, args) {
                Err(RunError::UnknownMethod { .. }) => self.inner.call(method, args),
                other => other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_events::InMemoryEventBus;
    use serde_json::json;
    use std::sync::Arc;

    mod app {
        pub mod commands {
            use crate::runnable::{Runnable, RunnableState};
            use cadence_core::RunResult;
            use serde_json::{Value, json};

            #[derive(Default)]
            pub struct Create {
                pub state: RunnableState,
                pub abort: bool,
            }

            impl Runnable for Create {
                fn state(&self) -> &RunnableState {
                    &self.state
                }

                fn state_mut(&mut self) -> &mut RunnableState {
                    &mut self.state
                }

                fn run(&mut self) -> RunResult<Value> {
                    if self.abort {
                        self.state.aborted = true;
                    }
                    Ok(json!({"id": 1}))
                }
            }

            #[derive(Default)]
            pub struct Backup {
                pub state: RunnableState,
            }

            impl Runnable for Backup {
                fn state(&self) -> &RunnableState {
                    &self.state
                }

                fn state_mut(&mut self) -> &mut RunnableState {
                    &mut self.state
                }

                fn run(&mut self) -> RunResult<Value> {
                    Ok(Value::Null)
                }
            }
        }
    }

    use app::commands::{Backup, Create};

    fn evented(base: impl Runnable + 'static) -> (Evented, Arc<InMemoryEventBus>) {
        let bus = InMemoryEventBus::arc();
        let dispatcher = Dispatcher::builder(bus.clone()).build();
        (Evented::new(Box::new(base), dispatcher), bus)
    }

    #[test]
    fn fires_before_until_and_after_publish() {
        let (mut evented, bus) = evented(Create::default());
        evented.state_mut().arguments.set("email", "a@b.c");
        assert_eq!(evented.run().unwrap(), json!({"id": 1}));

        let dispatched = bus.dispatched();
        assert_eq!(dispatched.len(), 2);
        assert!(dispatched[0].name().ends_with("::Creating"));
        assert!(dispatched[0].halt);
        assert_eq!(dispatched[0].payload, vec![json!({"email": "a@b.c"})]);
        assert!(dispatched[1].name().ends_with("::Created"));
        assert!(!dispatched[1].halt);
        assert_eq!(dispatched[1].payload, vec![json!({"id": 1})]);
    }

    #[test]
    fn silenced_runs_fire_nothing() {
        let (mut evented, bus) = evented(Create::default());
        assert_eq!(evented.silently().unwrap(), json!({"id": 1}));
        assert!(bus.dispatched().is_empty());
    }

    #[test]
    fn aborted_runs_skip_the_after_event() {
        let (mut evented, bus) = evented(Create {
            abort: true,
            ..Create::default()
        });
        evented.run().unwrap();
        let dispatched = bus.dispatched();
        assert_eq!(dispatched.len(), 1);
        assert!(dispatched[0].halt);
    }

    #[test]
    fn unmatched_names_fall_back_to_executing_and_executed() {
        let (evented, _) = evented(Backup::default());
        assert_eq!(evented.resolve_progressive_tense(), "executing");
        assert_eq!(evented.resolve_past_tense(), "executed");
    }
}
