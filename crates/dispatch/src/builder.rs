//! Fluent front end over a composed runnable.
//!
//! A [`Builder`] collects arguments and hands them to the base right before
//! it runs. Capability-gated operations check the chain first: query
//! operations need a query, cache operations need a [`Cached`] layer and
//! `queue` needs a queueable base.

use cadence_core::inflect::snake;
use cadence_core::{Arguments, RunError, RunResult};
use cadence_events::Event;
use cadence_infra::{HandlerRef, Job, PageRequest, Paginator, PendingDispatch, QueryBuilder};
use serde_json::Value;
use tracing::info;

use crate::cached::Cached;
use crate::dispatcher::Dispatcher;
use crate::macros::{self, Macro, Mixin};
use crate::runnable::{Fluent, Kind, Runnable, find_layer, find_layer_mut, layer_names};

pub struct Builder {
    runnable: Box<dyn Runnable>,
    arguments: Arguments,
    silenced: bool,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("layers", &self.layers())
            .field("arguments", &self.arguments)
            .field("silenced", &self.silenced)
            .finish()
    }
}

impl Builder {
    /// Arguments already set on the runnable are kept as the starting set.
    pub fn new(runnable: Box<dyn Runnable>, dispatcher: Dispatcher) -> Self {
        let arguments = runnable.arguments().clone();
        let silenced = runnable.silenced();
        Self {
            runnable,
            arguments,
            silenced,
            dispatcher,
        }
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Replace every argument.
    pub fn with_arguments<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.arguments = pairs.into_iter().collect();
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.arguments.set(name, value);
        self
    }

    /// Set the argument named after `method` (snake-cased) to the first
    /// call argument, or null.
    pub fn arg(&mut self, method: &str, args: &[Value]) -> &mut Self {
        let value = args.first().cloned().unwrap_or(Value::Null);
        self.arguments.set(snake(method), value);
        self
    }

    pub fn silence(&mut self) -> &mut Self {
        self.silenced = true;
        self
    }

    pub fn silenced(&self) -> bool {
        self.silenced
    }

    pub fn kind(&self) -> Kind {
        self.runnable.kind()
    }

    /// Names of every layer, outermost first.
    pub fn layers(&self) -> Vec<&'static str> {
        layer_names(self.runnable.as_ref())
    }

    /// The innermost runnable as it stands, without pushing arguments.
    pub fn base(&self) -> &dyn Runnable {
        self.runnable.to_base()
    }

    pub fn base_as<T: Runnable + 'static>(&self) -> Option<&T> {
        self.base().as_any().downcast_ref::<T>()
    }

    pub fn layer<T: Runnable + 'static>(&self) -> Option<&T> {
        find_layer::<T>(self.runnable.as_ref())
    }

    fn prepare(&mut self) {
        if self.silenced {
            self.runnable.silence();
        }
        self.runnable.set_arguments(self.arguments.clone());
    }

    /// Outermost layer, with the collected arguments applied.
    pub fn runnable(&mut self) -> &mut dyn Runnable {
        self.prepare();
        self.runnable.as_mut()
    }

    /// Innermost runnable, with the collected arguments applied.
    pub fn to_base(&mut self) -> &mut dyn Runnable {
        self.prepare();
        self.runnable.to_base_mut()
    }

    pub fn into_runnable(mut self) -> Box<dyn Runnable> {
        self.prepare();
        self.runnable
    }

    pub fn run(&mut self) -> RunResult<Value> {
        self.runnable().run()
    }

    pub fn invoke(&mut self) -> RunResult<Value> {
        self.runnable().invoke()
    }

    fn require_query(&self, method: &str) -> RunResult<()> {
        if self.kind() == Kind::Query {
            Ok(())
        } else {
            Err(RunError::not_supported(method, Kind::Query.as_str()))
        }
    }

    pub fn get(&mut self) -> RunResult<Value> {
        self.require_query("get")?;
        self.runnable().get()
    }

    pub fn paginate(&mut self, request: &PageRequest) -> RunResult<Paginator> {
        self.require_query("paginate")?;
        self.runnable().paginate(request)
    }

    pub fn query_builder(&mut self) -> RunResult<Box<dyn QueryBuilder>> {
        self.require_query("builder")?;
        self.runnable()
            .query_builder()
            .ok_or_else(|| RunError::not_supported("builder", "query builder"))
    }

    pub fn to_sql(&mut self) -> RunResult<String> {
        self.require_query("to_sql")?;
        self.runnable().to_sql()
    }

    fn cached_layer(&mut self, method: &str) -> RunResult<&mut Cached> {
        self.prepare();
        find_layer_mut::<Cached>(self.runnable.as_mut()).ok_or_else(|| RunError::not_supported(method, "Cached"))
    }

    pub fn cached(&mut self) -> RunResult<bool> {
        Ok(self.cached_layer("cached")?.cached())
    }

    pub fn cache(&mut self) -> RunResult<&mut Self> {
        self.cached_layer("cache")?.cache();
        Ok(self)
    }

    pub fn nocache(&mut self) -> RunResult<&mut Self> {
        self.cached_layer("nocache")?.nocache();
        Ok(self)
    }

    pub fn ttl(&mut self) -> RunResult<u64> {
        Ok(self.cached_layer("ttl")?.ttl())
    }

    pub fn set_ttl(&mut self, seconds: u64) -> RunResult<&mut Self> {
        self.cached_layer("ttl")?.set_ttl(seconds);
        Ok(self)
    }

    /// Run the whole chain without reading or writing the cache.
    pub fn fresh(&mut self) -> RunResult<Value> {
        self.cached_layer("fresh")?.nocache();
        self.invoke()
    }

    /// Bust the cache, then run the whole chain.
    pub fn refresh(&mut self) -> RunResult<Value> {
        self.cached_layer("refresh")?.bust()?;
        self.invoke()
    }

    pub fn invalidate(&mut self) -> RunResult<&mut Self> {
        self.cached_layer("invalidate")?.invalidate()?;
        Ok(self)
    }

    pub fn bust(&mut self) -> RunResult<&mut Self> {
        self.cached_layer("bust")?.bust()?;
        Ok(self)
    }

    /// Hand the base to the job queue with a generic event carrying the
    /// collected arguments. The job is enqueued when the returned handle is
    /// dispatched or dropped.
    pub fn queue(&mut self) -> RunResult<PendingDispatch> {
        if !self.runnable.capabilities().queueable {
            return Err(RunError::not_supported("queue", "Queueable"));
        }
        let jobs = self
            .dispatcher
            .jobs()
            .ok_or_else(|| RunError::missing_service("job queue"))?;

        let base = self.to_base();
        let handler = HandlerRef::Run(base.type_name().to_string());
        let settings = base.queue_settings();
        let event = Event::with_payload(Event::GENERIC, self.arguments.to_value());

        info!(handler = %handler.signature(), "queueing runnable");
        Ok(PendingDispatch::new(Job::new(event, handler).with_settings(&settings), jobs))
    }

    /// Dynamic call: known operations first, then registered macros, then
    /// argument assignment.
    pub fn call(&mut self, method: &str, args: &[Value]) -> RunResult<Fluent> {
        let first = args.first().filter(|v| !v.is_null()).cloned();
        match method {
            "run" => self.run().map(Fluent::Value),
            "invoke" => self.invoke().map(Fluent::Value),
            "get" => self.get().map(Fluent::Value),
            "paginate" => {
                let request = page_request(args);
                let page = self.paginate(&request)?;
                Ok(Fluent::Value(serde_json::to_value(page)?))
            }
            // The builder is not a value; its rendered SQL stands in for it.
            "builder" => {
                let sql = self.query_builder()?.to_sql();
                Ok(Fluent::Value(Value::String(sql)))
            }
            "to_sql" | "toSql" => self.to_sql().map(|sql| Fluent::Value(Value::String(sql))),
            "arguments" => match first {
                None => Ok(Fluent::Value(self.arguments.to_value())),
                Some(value) => {
                    self.arguments = Arguments::try_from(value)?;
                    Ok(Fluent::This)
                }
            },
            "silence" => {
                self.silence();
                Ok(Fluent::This)
            }
            "silenced" => Ok(Fluent::Value(Value::Bool(self.silenced))),
            "fresh" => self.fresh().map(Fluent::Value),
            "refresh" => self.refresh().map(Fluent::Value),
            "cached" | "cache" | "nocache" | "ttl" | "invalidate" | "bust" => {
                self.cached_layer(method)?.call(method, args)
            }
            "queue" => {
                let id = self.queue()?.dispatch()?;
                Ok(Fluent::Value(Value::String(id.to_string())))
            }
            _ => match macros::lookup(method) {
                Some(Macro::Bound(f)) => f(self, args),
                Some(Macro::Free(f)) => f(args).map(Fluent::Value),
                Some(Macro::Forward) => self.to_base().call(method, args),
                None => {
                    self.arg(method, args);
                    Ok(Fluent::This)
                }
            },
        }
    }

    pub fn macro_register(name: impl Into<String>, mac: Macro) {
        macros::register(name, mac);
    }

    pub fn has_macro(name: &str) -> bool {
        macros::has(name)
    }

    pub fn mixin(source: &dyn Mixin, replace: bool) {
        macros::mixin(source, replace);
    }
}

/// `[per_page, columns, page_name, page]`, each optional.
fn page_request(args: &[Value]) -> PageRequest {
    let mut request = PageRequest::default();
    if let Some(per_page) = args.first().and_then(Value::as_u64) {
        request.per_page = per_page as usize;
    }
    if let Some(Value::Array(columns)) = args.get(1) {
        request = request.with_columns(columns.iter().filter_map(Value::as_str));
    }
    if let Some(name) = args.get(2).and_then(Value::as_str) {
        request = request.with_page_name(name);
    }
    if let Some(page) = args.get(3).and_then(Value::as_u64) {
        request = request.with_page(page as usize);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::RunnableState;
    use cadence_events::InMemoryEventBus;
    use serde_json::json;

    #[derive(Default)]
    struct Echo {
        state: RunnableState,
    }

    impl Runnable for Echo {
        fn state(&self) -> &RunnableState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut RunnableState {
            &mut self.state
        }

        fn kind(&self) -> Kind {
            Kind::Command
        }

        fn run(&mut self) -> RunResult<Value> {
            Ok(self.arguments().to_value())
        }
    }

    fn builder() -> Builder {
        let dispatcher = Dispatcher::builder(InMemoryEventBus::arc()).build();
        Builder::new(Box::new(Echo::default()), dispatcher)
    }

    #[test]
    fn unknown_calls_accumulate_arguments() {
        let mut builder = builder();
        assert_eq!(builder.call("foo", &[json!("bar")]).unwrap(), Fluent::This);
        assert_eq!(builder.call("baz", &[]).unwrap(), Fluent::This);
        assert_eq!(builder.call("userId", &[json!(7)]).unwrap(), Fluent::This);
        assert_eq!(
            builder.arguments().to_value(),
            json!({"foo": "bar", "baz": null, "user_id": 7})
        );
    }

    #[test]
    fn run_pushes_arguments_onto_the_base() {
        let mut builder = builder();
        builder.set("name", "ada").silence();
        assert_eq!(builder.run().unwrap(), json!({"name": "ada"}));
        assert!(builder.base().silenced());
        assert_eq!(builder.base_as::<Echo>().unwrap().arguments().len(), 1);
    }

    #[test]
    fn capability_gated_operations_fail_on_commands() {
        let mut builder = builder();
        assert_eq!(
            builder.get().unwrap_err().to_string(),
            "only call get() on Query instances"
        );
        assert!(matches!(builder.nocache(), Err(RunError::NotSupported { .. })));
        assert!(matches!(builder.queue(), Err(RunError::NotSupported { .. })));
    }

    #[test]
    fn cache_settings_names_are_plain_arguments() {
        let mut builder = builder();
        for name in ["key", "subkey", "forever", "tags"] {
            assert_eq!(builder.call(name, &[json!("x")]).unwrap(), Fluent::This);
        }
        assert_eq!(
            builder.arguments().to_value(),
            json!({"key": "x", "subkey": "x", "forever": "x", "tags": "x"})
        );
    }

    #[test]
    fn dynamic_builder_needs_a_query() {
        let mut builder = builder();
        assert_eq!(
            builder.call("builder", &[]).unwrap_err().to_string(),
            "only call builder() on Query instances"
        );
        assert!(builder.arguments().is_empty());
    }

    #[test]
    fn page_request_reads_positional_arguments() {
        let request = page_request(&[json!(10), json!(["id"]), json!("p"), json!(3)]);
        assert_eq!(request.per_page, 10);
        assert_eq!(request.columns, vec!["id"]);
        assert_eq!(request.page_name, "p");
        assert_eq!(request.current_page(), 3);
    }
}
