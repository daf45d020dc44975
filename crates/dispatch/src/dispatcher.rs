//! Capability-driven dispatch of commands and queries.
//!
//! The dispatcher resolves a target into a runnable, reads its
//! [`Capabilities`](crate::runnable::Capabilities) once and composes the
//! decorator chain around it:
//!
//! ```text
//! command:  base → Cached (taggable) → Transaction (transactional) → Evented (eventable)
//! query:    base → Cached (cacheable) → Evented (eventable)
//! ```
//!
//! The outermost layer is handed back inside a [`Builder`], so events bracket
//! the whole transaction, commit or rollback included.
//!
//! ## Event names
//!
//! [`Dispatcher::trigger`] turns a method name such as `creating` and a
//! source type path such as `app::commands::CreateUser` into an event:
//!
//! - default: the source path up to its `commands`/`queries`/`models`
//!   segment, then `events::Creating` (`app::events::Creating`)
//! - normalized: the source path with that segment swapped for `events`,
//!   then `::Creating` (`app::events::CreateUser::Creating`)
//! - fallback: the normalized name without the source's simple name
//!   (`app::events::Creating`)
//!
//! Only interior segments that match exactly are swapped: neither the crate
//! root nor the type name itself, and `Commands` is not `commands`.
//!
//! The first of normalized, fallback and default registered in the
//! [`EventRegistry`] is instantiated, else the generic event. The event is
//! always named with the normalized name. Methods ending in `ing` publish
//! until halted; everything else publishes to every listener.
//!
//! This module does no IO itself; it composes the collaborator traits.

use std::sync::Arc;

use cadence_core::inflect::{simple_type_name, studly};
use cadence_core::{Arguments, RunError, RunResult};
use cadence_events::{Event, EventBus, EventRegistry};
use cadence_infra::{CacheManager, CacheStore, Connection, HandlerRef, Job, JobId, JobQueue};
use serde_json::Value;
use tracing::{debug, info};

use crate::builder::Builder;
use crate::cached::{Cached, side_index};
use crate::config::DispatcherConfig;
use crate::container::{Container, Resolver};
use crate::evented::Evented;
use crate::runnable::{Kind, Runnable, layer_names};
use crate::transaction::Transaction;

/// What to dispatch: a name the container resolves, or an instance.
pub enum Target {
    Name(String),
    Instance(Box<dyn Runnable>),
}

impl Target {
    pub fn boxed(runnable: Box<dyn Runnable>) -> Self {
        Target::Instance(runnable)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Name(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Name(name)
    }
}

impl<R: Runnable + 'static> From<R> for Target {
    fn from(runnable: R) -> Self {
        Target::Instance(Box::new(runnable))
    }
}

/// Result of [`Dispatcher::dispatch`].
pub enum Dispatched {
    Command(Builder),
    Query(Builder),
    /// Neither command nor query; returned undecorated.
    Bare(Box<dyn Runnable>),
}

impl Dispatched {
    /// Run whatever was dispatched with `arguments`.
    pub fn run_with(self, arguments: Arguments) -> RunResult<Value> {
        match self {
            Dispatched::Command(mut builder) | Dispatched::Query(mut builder) => {
                builder.with_arguments(arguments).run()
            }
            Dispatched::Bare(mut runnable) => {
                runnable.set_arguments(arguments);
                runnable.run()
            }
        }
    }
}

/// Result of [`Dispatcher::handle_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Queued(JobId),
    Ran(Value),
}

struct Services {
    events: Arc<dyn EventBus>,
    caches: CacheManager,
    connection: Option<Arc<dyn Connection>>,
    jobs: Option<Arc<dyn JobQueue>>,
    container: Arc<dyn Resolver>,
    registry: Arc<EventRegistry>,
    config: DispatcherConfig,
}

/// Cheap to clone; every clone shares the same services.
#[derive(Clone)]
pub struct Dispatcher {
    services: Arc<Services>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("caches", &self.services.caches)
            .field("connection", &self.services.connection.is_some())
            .field("jobs", &self.services.jobs.is_some())
            .field("config", &self.services.config)
            .finish_non_exhaustive()
    }
}

pub struct DispatcherBuilder {
    events: Arc<dyn EventBus>,
    caches: CacheManager,
    connection: Option<Arc<dyn Connection>>,
    jobs: Option<Arc<dyn JobQueue>>,
    container: Arc<dyn Resolver>,
    registry: Arc<EventRegistry>,
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    pub fn with_caches(mut self, caches: CacheManager) -> Self {
        self.caches = caches;
        self
    }

    pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_jobs(mut self, jobs: Arc<dyn JobQueue>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_container(mut self, container: Arc<dyn Resolver>) -> Self {
        self.container = container;
        self
    }

    pub fn with_registry(mut self, registry: Arc<EventRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            services: Arc::new(Services {
                events: self.events,
                caches: self.caches,
                connection: self.connection,
                jobs: self.jobs,
                container: self.container,
                registry: self.registry,
                config: self.config,
            }),
        }
    }
}

impl Dispatcher {
    /// Start wiring a dispatcher. Everything except the bus has a default:
    /// an in-memory cache driver, an empty container and registry, no
    /// connection and no job queue.
    pub fn builder(events: Arc<dyn EventBus>) -> DispatcherBuilder {
        DispatcherBuilder {
            events,
            caches: CacheManager::in_memory(),
            connection: None,
            jobs: None,
            container: Container::arc(),
            registry: Arc::new(EventRegistry::default()),
            config: DispatcherConfig::default(),
        }
    }

    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.services.events
    }

    pub fn caches(&self) -> &CacheManager {
        &self.services.caches
    }

    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.services.connection.clone()
    }

    pub fn jobs(&self) -> Option<Arc<dyn JobQueue>> {
        self.services.jobs.clone()
    }

    pub fn container(&self) -> &Arc<dyn Resolver> {
        &self.services.container
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.services.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.services.config
    }

    pub fn resolve(&self, target: impl Into<Target>) -> RunResult<Box<dyn Runnable>> {
        match target.into() {
            Target::Instance(runnable) => Ok(runnable),
            Target::Name(name) => self
                .services
                .container
                .resolve(&name)
                .ok_or(RunError::NotRunnable { target: name }),
        }
    }

    /// Route to [`Dispatcher::command`] or [`Dispatcher::query`] by kind;
    /// plain runnables come back bare.
    pub fn dispatch(&self, target: impl Into<Target>) -> RunResult<Dispatched> {
        let runnable = self.resolve(target)?;
        Ok(match runnable.kind() {
            Kind::Command => Dispatched::Command(self.compose_command(runnable)?),
            Kind::Query => Dispatched::Query(self.compose_query(runnable)),
            Kind::Runnable => Dispatched::Bare(runnable),
        })
    }

    pub fn command(&self, target: impl Into<Target>) -> RunResult<Builder> {
        let runnable = self.resolve(target)?;
        if runnable.kind() != Kind::Command {
            return Err(RunError::NotACommand {
                type_name: simple_type_name(runnable.type_name()).to_string(),
            });
        }
        self.compose_command(runnable)
    }

    pub fn query(&self, target: impl Into<Target>) -> RunResult<Builder> {
        let runnable = self.resolve(target)?;
        if runnable.kind() != Kind::Query {
            return Err(RunError::NotAQuery {
                type_name: simple_type_name(runnable.type_name()).to_string(),
            });
        }
        Ok(self.compose_query(runnable))
    }

    fn compose_command(&self, runnable: Box<dyn Runnable>) -> RunResult<Builder> {
        let capabilities = runnable.capabilities();
        let mut layered = runnable;

        if capabilities.taggable {
            layered = Box::new(Cached::new(layered, self.clone()));
        }
        if capabilities.transactional {
            let connection = self
                .connection()
                .ok_or_else(|| RunError::missing_service("database connection"))?;
            layered = Box::new(Transaction::new(layered, connection));
        }
        if capabilities.eventable {
            layered = Box::new(Evented::new(layered, self.clone()));
        }

        debug!(layers = ?layer_names(layered.as_ref()), "composed command");
        Ok(Builder::new(layered, self.clone()))
    }

    fn compose_query(&self, runnable: Box<dyn Runnable>) -> Builder {
        let capabilities = runnable.capabilities();
        let mut layered = runnable;

        if capabilities.cacheable {
            layered = Box::new(Cached::new(layered, self.clone()));
        }
        if capabilities.eventable {
            layered = Box::new(Evented::new(layered, self.clone()));
        }

        debug!(layers = ?layer_names(layered.as_ref()), "composed query");
        Builder::new(layered, self.clone())
    }

    /// Publish to every listener.
    pub fn event(&self, event: impl Into<Event>, payload: &[Value]) -> RunResult<Vec<Value>> {
        Ok(self.services.events.publish(&event.into(), payload)?)
    }

    /// Publish until a listener answers with a non-null value.
    pub fn until(&self, event: impl Into<Event>, payload: &[Value]) -> RunResult<Vec<Value>> {
        Ok(self.services.events.publish_until_halted(&event.into(), payload)?)
    }

    /// Fire the event named after `method` for `source`.
    pub fn trigger(&self, method: &str, source: &str, attributes: &[Value]) -> RunResult<Vec<Value>> {
        self.fire(method, source, attributes, method.ends_with("ing"))
    }

    pub(crate) fn fire(&self, method: &str, source: &str, attributes: &[Value], halt: bool) -> RunResult<Vec<Value>> {
        let normalized = self.normalize_event_name(method, source);
        let type_name = self.resolve_event_type(method, source);
        let event = self.registry().make(&type_name, attributes).named(normalized);

        debug!(event = event.name(), event_type = event.type_name(), halt, "triggering event");
        if halt {
            self.until(event, attributes)
        } else {
            self.event(event, attributes)
        }
    }

    /// `app::commands::CreateUser` + `creating` → `app::events::Creating`.
    pub fn default_event_name(&self, method: &str, source: &str) -> String {
        let config = self.config();
        let action = studly(method);
        let prefix = config
            .source_segments
            .iter()
            .find_map(|segment| segment_offset(source, segment))
            .map(|offset| &source[..offset])
            .unwrap_or("");
        format!("{prefix}{}::{action}", config.event_namespace)
    }

    /// `app::commands::CreateUser` + `creating` →
    /// `app::events::CreateUser::Creating`.
    pub fn normalize_event_name(&self, method: &str, source: &str) -> String {
        let config = self.config();
        let action = studly(method);

        let mut trimmed = source;
        for suffix in ["Model", "Command", "Query", "Event", action.as_str()] {
            if let Some(stripped) = trimmed.strip_suffix(suffix) {
                trimmed = stripped;
                break;
            }
        }
        let trimmed = trimmed.trim_end_matches(':');
        if trimmed.is_empty() {
            return format!("{}::{action}", config.event_namespace);
        }

        let segments: Vec<&str> = trimmed.split("::").collect();
        let last = segments.len() - 1;
        let path: Vec<&str> = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let swapped = i > 0 && i < last && config.source_segments.iter().any(|s| s.as_str() == *segment);
                if swapped { config.event_namespace.as_str() } else { segment }
            })
            .collect();
        format!("{}::{action}", path.join("::"))
    }

    /// Registered event type to instantiate for `method` on `source`.
    pub fn resolve_event_type(&self, method: &str, source: &str) -> String {
        let normalized = self.normalize_event_name(method, source);
        let fallback = normalized.replace(&format!("{}::", simple_type_name(source)), "");
        let default = self.default_event_name(method, source);

        [normalized, fallback, default]
            .into_iter()
            .find(|candidate| self.registry().contains(candidate))
            .unwrap_or_else(|| Event::GENERIC.to_string())
    }

    /// Handle `event` with `target`: queue it when the target is queueable,
    /// otherwise run the target as a command with the event's properties as
    /// arguments.
    pub fn handle_event(&self, target: impl Into<Target>, event: &Event) -> RunResult<Handled> {
        let target = target.into();
        let handler = match &target {
            Target::Name(name) => name.clone(),
            Target::Instance(runnable) => runnable.type_name().to_string(),
        };
        let runnable = self.resolve(target)?;

        if runnable.capabilities().queueable {
            let jobs = self.jobs().ok_or_else(|| RunError::missing_service("job queue"))?;
            let job = Job::new(event.clone(), HandlerRef::Run(handler)).with_settings(&runnable.queue_settings());
            let id = jobs.enqueue(job)?;
            info!(job_id = %id, event = event.name(), "queued event handler");
            return Ok(Handled::Queued(id));
        }

        let arguments: Arguments = event.properties().into_iter().collect();
        let response = self.command(Target::Instance(runnable))?.with_arguments(arguments).run()?;
        Ok(Handled::Ran(response))
    }

    /// Dispatch `target` and run it with `arguments`.
    pub fn call(&self, target: impl Into<Target>, arguments: Arguments) -> RunResult<Value> {
        self.dispatch(target)?.run_with(arguments)
    }

    /// Forget every response cached under `key` on `driver` (the configured
    /// driver when `None`). Returns how many entries were evicted.
    pub fn bust(&self, key: &str, driver: Option<&str>) -> RunResult<usize> {
        let driver = driver.unwrap_or(&self.config().default_cache_driver);
        let store = self.caches().driver(Some(driver))?;
        let recorded = side_index(store.get(key)?);
        for index in &recorded {
            store.forget(index)?;
        }
        store.forget(key)?;
        debug!(%key, evicted = recorded.len(), "cache key busted");
        Ok(recorded.len())
    }
}

/// Byte offset of the first interior path segment equal to `segment`.
fn segment_offset(path: &str, segment: &str) -> Option<usize> {
    let parts: Vec<&str> = path.split("::").collect();
    let last = parts.len().saturating_sub(1);
    let mut offset = 0;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 && i < last && *part == segment {
            return Some(offset);
        }
        offset += part.len() + 2;
    }
    None
}
