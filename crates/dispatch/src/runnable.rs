//! The runnable contract.
//!
//! A [`Runnable`] is a unit of work: a command (writes), a query (reads) or
//! a bare runnable. Every runnable carries a [`RunnableState`] holding its
//! arguments and its silenced/aborted flags; decorators share the state of
//! the base they wrap, so a flag set anywhere in the chain is seen
//! everywhere.
//!
//! Optional behaviour is declared through [`Capabilities`] rather than
//! discovered at run time. The dispatcher reads them once, when it composes
//! the decorator chain.

use std::any::Any;

use cadence_core::inflect::simple_type_name;
use cadence_core::{Arguments, Fallback, RunError, RunResult, Validator};
use cadence_events::Event;
use cadence_infra::{PageRequest, Paginator, QueryBuilder, QueueSettings};
use serde_json::Value;

/// What kind of unit of work a runnable is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Runnable,
    Command,
    Query,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Runnable => "Runnable",
            Kind::Command => "Command",
            Kind::Query => "Query",
        }
    }
}

/// Optional behaviours a runnable opts into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Responses are cached (queries).
    pub cacheable: bool,
    /// Before/after events are fired.
    pub eventable: bool,
    /// Runs inside a database transaction (commands).
    pub transactional: bool,
    /// May be pushed onto the job queue.
    pub queueable: bool,
    /// Invalidates cache tags when run (commands).
    pub taggable: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        cacheable: false,
        eventable: false,
        transactional: false,
        queueable: false,
        taggable: false,
    };

    pub fn new() -> Self {
        Self::NONE
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    pub fn eventable(mut self) -> Self {
        self.eventable = true;
        self
    }

    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    pub fn queueable(mut self) -> Self {
        self.queueable = true;
        self
    }

    pub fn taggable(mut self) -> Self {
        self.taggable = true;
        self
    }
}

/// Cache overrides stored on the base runnable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSettings {
    /// Seconds; `None` falls back to the configured default.
    pub ttl: Option<u64>,
    pub forever: Option<bool>,
    pub key: Option<String>,
    pub subkey: Option<String>,
    pub tags: Vec<String>,
    /// Named cache driver; `None` uses the configured one.
    pub driver: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnableState {
    pub arguments: Arguments,
    pub silenced: bool,
    pub aborted: bool,
    pub cache: CacheSettings,
}

impl RunnableState {
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }
}

/// Result of a dynamic call: either the receiver itself (keep chaining on
/// whatever made the call) or a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Fluent {
    This,
    Value(Value),
}

impl Fluent {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Fluent::This => None,
            Fluent::Value(v) => Some(v),
        }
    }
}

impl From<Value> for Fluent {
    fn from(value: Value) -> Self {
        Fluent::Value(value)
    }
}

/// A custom before/after event: a registered event type name to
/// instantiate, or a ready-made event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventSpec {
    Named(String),
    Event(Event),
}

/// Object-safe upcasts, implemented for every sized runnable.
pub trait AsRunnable {
    fn as_runnable(&self) -> &dyn Runnable;
    fn as_runnable_mut(&mut self) -> &mut dyn Runnable;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Runnable + 'static> AsRunnable for T {
    fn as_runnable(&self) -> &dyn Runnable {
        self
    }

    fn as_runnable_mut(&mut self) -> &mut dyn Runnable {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub trait Runnable: AsRunnable + Send {
    fn state(&self) -> &RunnableState;

    fn state_mut(&mut self) -> &mut RunnableState;

    /// The unit of work itself.
    fn run(&mut self) -> RunResult<Value>;

    fn invoke(&mut self) -> RunResult<Value> {
        self.run()
    }

    fn kind(&self) -> Kind {
        Kind::Runnable
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Innermost runnable of a decorator chain; itself for a base.
    fn to_base(&self) -> &dyn Runnable {
        self.as_runnable()
    }

    fn to_base_mut(&mut self) -> &mut dyn Runnable {
        self.as_runnable_mut()
    }

    /// The next layer inward, for decorators.
    fn wrapped(&self) -> Option<&dyn Runnable> {
        None
    }

    fn wrapped_mut(&mut self) -> Option<&mut dyn Runnable> {
        None
    }

    fn arguments(&self) -> &Arguments {
        &self.state().arguments
    }

    fn set_arguments(&mut self, arguments: Arguments) {
        self.state_mut().arguments = arguments;
    }

    /// Required argument, see [`Arguments::argument`].
    fn argument(&self, name: &str) -> RunResult<Value> {
        let owner = simple_type_name(self.to_base().type_name());
        self.arguments().argument(name, owner)
    }

    fn argument_with(&self, name: &str, validator: &Validator) -> RunResult<Value> {
        let owner = simple_type_name(self.to_base().type_name());
        self.arguments().argument_with(name, owner, validator)
    }

    fn option(&self, name: &str, default: Value) -> Value {
        self.arguments().option(name, default)
    }

    fn option_with(&self, name: &str, default: Fallback, validator: Option<&Validator>) -> RunResult<Value> {
        self.arguments().option_with(name, default, validator)
    }

    fn silence(&mut self) {
        self.state_mut().silenced = true;
    }

    fn silenced(&self) -> bool {
        self.state().silenced
    }

    /// Silence, then invoke.
    fn silently(&mut self) -> RunResult<Value> {
        self.silence();
        self.invoke()
    }

    /// Cooperative cancellation: the run still returns normally.
    fn abort(&mut self) {
        self.state_mut().aborted = true;
    }

    fn aborted(&self) -> bool {
        self.state().aborted
    }

    /// Builder backing a query, if any.
    fn query_builder(&self) -> Option<Box<dyn QueryBuilder>> {
        None
    }

    fn get(&mut self) -> RunResult<Value> {
        self.run()
    }

    /// Builder-backed pagination (carrying every argument except the page
    /// parameter), or a page sliced out of `run()`.
    fn paginate(&mut self, request: &PageRequest) -> RunResult<Paginator> {
        if let Some(builder) = self.query_builder() {
            let appends = self.arguments().except(&[request.page_name.as_str()]);
            return Ok(builder.paginate(request)?.appends(appends));
        }
        let rows = match self.run()? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        Ok(Paginator::from_items(rows, request)?)
    }

    fn to_sql(&self) -> RunResult<String> {
        self.query_builder()
            .map(|builder| builder.to_sql())
            .ok_or_else(|| RunError::not_supported("to_sql", "query builder"))
    }

    /// Custom event fired before running, instead of the tense-derived one.
    fn before_event(&self) -> Option<EventSpec> {
        None
    }

    /// Custom event fired after running, instead of the tense-derived one.
    fn after_event(&self, _response: &Value) -> Option<EventSpec> {
        None
    }

    /// Annotation text carrying an `@tags` line, used when no explicit tags
    /// are set.
    fn tag_annotation(&self) -> Option<&'static str> {
        None
    }

    fn queue_settings(&self) -> QueueSettings {
        QueueSettings::default()
    }

    /// Dynamic method call. Types with methods of their own override this
    /// and fall back to [`call_mixin`].
    fn call(&mut self, method: &str, args: &[Value]) -> RunResult<Fluent> {
        call_mixin(self.as_runnable_mut(), method, args)
    }
}

/// Dynamic calls shared by every runnable: argument access, silencing,
/// aborting and execution.
pub fn call_mixin(this: &mut dyn Runnable, method: &str, args: &[Value]) -> RunResult<Fluent> {
    let first = args.first().cloned();
    match method {
        "arguments" => match first {
            None => Ok(Fluent::Value(this.arguments().to_value())),
            Some(value) => {
                this.set_arguments(Arguments::try_from(value)?);
                Ok(Fluent::This)
            }
        },
        "argument" => {
            let name = string_arg(method, first.as_ref())?;
            this.argument(&name).map(Fluent::Value)
        }
        "option" => {
            let name = string_arg(method, first.as_ref())?;
            let default = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(Fluent::Value(this.option(&name, default)))
        }
        "silence" => {
            this.silence();
            Ok(Fluent::This)
        }
        "silenced" => Ok(Fluent::Value(Value::Bool(this.silenced()))),
        "silently" => this.silently().map(Fluent::Value),
        "abort" => {
            this.abort();
            Ok(Fluent::This)
        }
        "aborted" => Ok(Fluent::Value(Value::Bool(this.aborted()))),
        "run" => this.run().map(Fluent::Value),
        "invoke" => this.invoke().map(Fluent::Value),
        "get" => this.get().map(Fluent::Value),
        "to_sql" | "toSql" => this.to_sql().map(|sql| Fluent::Value(Value::String(sql))),
        _ => Err(RunError::UnknownMethod {
            method: method.to_string(),
            type_name: this.to_base().type_name().to_string(),
        }),
    }
}

fn string_arg(method: &str, value: Option<&Value>) -> RunResult<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(RunError::invalid(method, "expects an argument name")),
    }
}

/// Find the first layer of type `T`, walking inward from `runnable`.
pub fn find_layer<T: Runnable + 'static>(runnable: &dyn Runnable) -> Option<&T> {
    if let Some(layer) = runnable.as_any().downcast_ref::<T>() {
        return Some(layer);
    }
    runnable.wrapped().and_then(find_layer::<T>)
}

pub fn find_layer_mut<T: Runnable + 'static>(runnable: &mut dyn Runnable) -> Option<&mut T> {
    if runnable.as_any().is::<T>() {
        return runnable.as_any_mut().downcast_mut::<T>();
    }
    runnable.wrapped_mut().and_then(find_layer_mut::<T>)
}

/// Simple names of every layer, outermost first.
pub fn layer_names(runnable: &dyn Runnable) -> Vec<&'static str> {
    let mut names = vec![simple_type_name(runnable.type_name())];
    let mut current = runnable.wrapped();
    while let Some(layer) = current {
        names.push(simple_type_name(layer.type_name()));
        current = layer.wrapped();
    }
    names
}
