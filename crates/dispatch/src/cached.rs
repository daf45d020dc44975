//! Response caching and tag invalidation.
//!
//! For a cacheable base, responses are stored under `key:subkey` and every
//! index written for a key is remembered in a side index stored under the key
//! itself, so [`Cached::bust`] can evict them all. For a base that is not
//! cacheable (tagged commands) a successful run fires an
//! [`Invalidated`] event instead; evicting is left to whoever listens.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::inflect::simple_type_name;
use cadence_core::tags::{normalize_all, parse_annotation};
use cadence_core::{RunError, RunResult};
use cadence_events::Invalidated;
use cadence_infra::{CacheStore, PageRequest, Paginator, QueryBuilder};
use serde_json::Value;
use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::runnable::{Capabilities, Fluent, Kind, Runnable, RunnableState, call_mixin};

pub struct Cached {
    inner: Box<dyn Runnable>,
    dispatcher: Dispatcher,
    store: Option<Arc<dyn CacheStore>>,
    cached: bool,
}

impl Cached {
    pub fn new(inner: Box<dyn Runnable>, dispatcher: Dispatcher) -> Self {
        Self {
            inner,
            dispatcher,
            store: None,
            cached: true,
        }
    }

    /// Use `store` instead of resolving the driver through the cache manager.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn cache(&mut self) -> &mut Self {
        self.cached = true;
        self
    }

    pub fn nocache(&mut self) -> &mut Self {
        self.cached = false;
        self
    }

    /// Seconds, falling back to the configured default.
    pub fn ttl(&self) -> u64 {
        self.state()
            .cache
            .ttl
            .unwrap_or(self.dispatcher.config().default_ttl)
    }

    pub fn set_ttl(&mut self, seconds: u64) -> &mut Self {
        self.state_mut().cache.ttl = Some(seconds);
        self
    }

    pub fn forever(&self) -> bool {
        self.state().cache.forever.unwrap_or(false)
    }

    pub fn set_forever(&mut self, forever: bool) -> &mut Self {
        self.state_mut().cache.forever = Some(forever);
        self
    }

    /// Explicit key, else the base's type name.
    pub fn key(&self) -> String {
        self.state()
            .cache
            .key
            .clone()
            .unwrap_or_else(|| self.to_base().type_name().to_string())
    }

    pub fn set_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.state_mut().cache.key = Some(key.into());
        self
    }

    /// Explicit subkey, else the MD5 of the serialized arguments.
    pub fn subkey(&self) -> RunResult<String> {
        if let Some(subkey) = &self.state().cache.subkey {
            return Ok(subkey.clone());
        }
        Ok(digest(&serde_json::to_vec(self.arguments())?))
    }

    pub fn set_subkey(&mut self, subkey: impl Into<String>) -> &mut Self {
        self.state_mut().cache.subkey = Some(subkey.into());
        self
    }

    pub fn index(&self) -> RunResult<String> {
        Ok(format!("{}:{}", self.key(), self.subkey()?))
    }

    /// Explicit tags, else the base's `@tags` annotation; normalised and
    /// deduplicated.
    pub fn tags(&self) -> RunResult<Vec<String>> {
        let base = self.to_base();
        let explicit = &base.state().cache.tags;
        let raw = if explicit.is_empty() {
            base.tag_annotation().and_then(parse_annotation).unwrap_or_default()
        } else {
            explicit.clone()
        };
        let tags = normalize_all(raw);
        if tags.is_empty() {
            return Err(RunError::MissingTags {
                type_name: simple_type_name(base.type_name()).to_string(),
            });
        }
        Ok(tags)
    }

    /// Signal that everything tagged with [`Cached::tags`] is stale.
    pub fn invalidate(&mut self) -> RunResult<&mut Self> {
        let tags = self.tags()?;
        info!(tags = ?tags, "invalidating cache tags");
        self.dispatcher.event(Invalidated::new(tags), &[])?;
        Ok(self)
    }

    /// Forget every index recorded for the key, the current index and the
    /// side index itself.
    pub fn bust(&mut self) -> RunResult<&mut Self> {
        let store = self.store()?;
        let key = self.key();
        let index = self.index()?;

        let recorded = side_index(store.get(&key)?);
        for entry in &recorded {
            store.forget(entry)?;
        }
        store.forget(&index)?;
        store.forget(&key)?;

        debug!(%key, evicted = recorded.len(), "cache busted");
        Ok(self)
    }

    /// Bypass the cache for this and later runs.
    pub fn fresh(&mut self) -> RunResult<Value> {
        self.nocache();
        self.invoke()
    }

    /// Bust, then run (and store again).
    pub fn refresh(&mut self) -> RunResult<Value> {
        self.bust()?;
        self.invoke()
    }

    fn store(&mut self) -> RunResult<Arc<dyn CacheStore>> {
        if let Some(store) = &self.store {
            return Ok(Arc::clone(store));
        }
        let driver = self
            .state()
            .cache
            .driver
            .clone()
            .unwrap_or_else(|| self.dispatcher.config().default_cache_driver.clone());
        let store = self.dispatcher.caches().driver(Some(&driver))?;
        self.store = Some(Arc::clone(&store));
        Ok(store)
    }

    fn cacheable(&self) -> bool {
        self.to_base().capabilities().cacheable
    }

    fn wrap<F>(&mut self, index: String, operation: F) -> RunResult<Value>
    where
        F: FnOnce(&mut dyn Runnable) -> RunResult<Value>,
    {
        let storing = self.cached && self.cacheable();

        if storing {
            let store = self.store()?;
            if store.has(&index)? {
                debug!(%index, "cache hit");
                if let Some(value) = store.get(&index)? {
                    return Ok(value);
                }
            }
            debug!(%index, "cache miss");
        }

        let response = operation(self.inner.as_mut())?;

        if storing {
            self.remember(&index, &response)?;
        } else if self.cached {
            self.invalidate()?;
        }

        Ok(response)
    }

    fn remember(&mut self, index: &str, response: &Value) -> RunResult<()> {
        let store = self.store()?;
        let key = self.key();
        let ttl = (!self.forever()).then(|| Duration::from_secs(self.ttl()));

        match ttl {
            Some(_) => store.put(index, response.clone(), ttl)?,
            None => store.forever(index, response.clone())?,
        }

        let mut recorded = side_index(store.get(&key)?);
        if !recorded.iter().any(|entry| entry == index) {
            recorded.push(index.to_string());
        }
        store.put(&key, Value::from(recorded), ttl)?;

        debug!(%index, ttl = ?ttl.map(|d| d.as_secs()), "cached response");
        Ok(())
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub(crate) fn side_index(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| entry.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

impl Runnable for Cached {
    fn state(&self) -> &RunnableState {
        self.inner.state()
    }

    fn state_mut(&mut self) -> &mut RunnableState {
        self.inner.state_mut()
    }

    fn run(&mut self) -> RunResult<Value> {
        let index = self.index()?;
        self.wrap(index, |inner| inner.run())
    }

    fn get(&mut self) -> RunResult<Value> {
        self.run()
    }

    /// Pages are cached apart from the full result: the page request is
    /// folded into the subkey unless one is set explicitly.
    fn paginate(&mut self, request: &PageRequest) -> RunResult<Paginator> {
        let index = match &self.state().cache.subkey {
            Some(_) => self.index()?,
            None => {
                let page = serde_json::to_vec(&(self.arguments(), request))?;
                format!("{}:{}", self.key(), digest(&page))
            }
        };
        let request = request.clone();
        let value = self.wrap(index, move |inner| {
            let page = inner.paginate(&request)?;
            Ok(serde_json::to_value(page)?)
        })?;
        Ok(serde_json::from_value(value)?)
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
        let first = args.first().filter(|v| !v.is_null());
        match (method, first) {
            ("cached", None) => Ok(Fluent::Value(Value::Bool(self.cached()))),
            ("cached", Some(flag)) => {
                self.cached = flag.as_bool().unwrap_or(true);
                Ok(Fluent::This)
            }
            ("cache", _) => {
                self.cache();
                Ok(Fluent::This)
            }
            ("nocache", _) => {
                self.nocache();
                Ok(Fluent::This)
            }
            ("ttl", None) => Ok(Fluent::Value(Value::from(self.ttl()))),
            ("ttl", Some(ttl)) => {
                let seconds = ttl.as_u64().ok_or_else(|| RunError::invalid("ttl", "expects seconds"))?;
                self.set_ttl(seconds);
                Ok(Fluent::This)
            }
            ("forever", None) => Ok(Fluent::Value(Value::Bool(self.forever()))),
            ("forever", Some(flag)) => {
                self.set_forever(flag.as_bool().unwrap_or(true));
                Ok(Fluent::This)
            }
            ("key", None) => Ok(Fluent::Value(Value::String(self.key()))),
            ("key", Some(key)) => {
                self.set_key(value_string(key));
                Ok(Fluent::This)
            }
            ("subkey", None) => Ok(Fluent::Value(Value::String(self.subkey()?))),
            ("subkey", Some(subkey)) => {
                self.set_subkey(value_string(subkey));
                Ok(Fluent::This)
            }
            ("tags", _) => Ok(Fluent::Value(Value::from(self.tags()?))),
            ("invalidate", _) => self.invalidate().map(|_| Fluent::This),
            ("bust", _) => self.bust().map(|_| Fluent::This),
            ("fresh", _) => self.fresh().map(Fluent::Value),
            ("refresh", _) => self.refresh().map(Fluent::Value),
            _ => match call_mixin(self, method, args) {
                Err(RunError::UnknownMethod { .. }) => self.inner.call(method, args),
                other => other,
            },
        }
    }
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_events::{Event, InMemoryEventBus};
    use cadence_infra::{CacheManager, InMemoryCacheStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        state: RunnableState,
        runs: Arc<AtomicUsize>,
        capabilities: Capabilities,
    }

    impl Runnable for Counting {
        fn state(&self) -> &RunnableState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut RunnableState {
            &mut self.state
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        fn tag_annotation(&self) -> Option<&'static str> {
            Some("Touches accounts.\n@tags Accounts, billing")
        }

        fn run(&mut self) -> RunResult<Value> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "run": n }))
        }
    }

    fn setup(capabilities: Capabilities) -> (Cached, Arc<AtomicUsize>, Arc<InMemoryCacheStore>, Arc<InMemoryEventBus>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let store = InMemoryCacheStore::arc();
        let bus = InMemoryEventBus::arc();
        let dispatcher = Dispatcher::builder(bus.clone())
            .with_caches(CacheManager::new("memory").with_driver("memory", store.clone()))
            .build();
        let base = Counting {
            state: RunnableState::default(),
            runs: runs.clone(),
            capabilities,
        };
        (Cached::new(Box::new(base), dispatcher), runs, store, bus)
    }

    #[test]
    fn second_run_is_served_from_the_store() {
        let (mut cached, runs, store, _) = setup(Capabilities::new().cacheable());
        cached.set_ttl(30);

        let first = cached.run().unwrap();
        let second = cached.run().unwrap();

        assert_eq!(first, second);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let index = cached.index().unwrap();
        assert_eq!(store.ttl_of(&index).map(|d| d.as_secs() <= 30), Some(true));
        assert_eq!(store.get(&cached.key()).unwrap(), Some(json!([index])));
    }

    #[test]
    fn forever_entries_never_expire() {
        let (mut cached, runs, store, _) = setup(Capabilities::new().cacheable());
        cached.set_ttl(30).set_forever(true);

        let first = cached.run().unwrap();
        assert_eq!(cached.run().unwrap(), first);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let index = cached.index().unwrap();
        assert!(store.has(&index).unwrap());
        assert_eq!(store.ttl_of(&index), None);
        assert_eq!(store.ttl_of(&cached.key()), None);
        assert_eq!(store.get(&cached.key()).unwrap(), Some(json!([index])));
    }

    #[test]
    fn subkey_hashes_the_arguments() {
        let (mut cached, ..) = setup(Capabilities::new().cacheable());
        let empty = cached.subkey().unwrap();
        assert_eq!(empty, "99914b932bd37a50b983c5e7c90ae93b");
        cached.state_mut().arguments.set("id", 1);
        assert_ne!(cached.subkey().unwrap(), empty);
        cached.set_subkey("fixed");
        assert_eq!(cached.index().unwrap(), format!("{}:fixed", cached.key()));
    }

    #[test]
    fn nocache_runs_every_time_without_side_effects() {
        let (mut cached, runs, store, bus) = setup(Capabilities::new().cacheable());
        cached.nocache();
        cached.run().unwrap();
        cached.run().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(store.keys().is_empty());
        assert!(bus.dispatched().is_empty());
    }

    #[test]
    fn bust_forgets_every_recorded_index() {
        let (mut cached, runs, store, _) = setup(Capabilities::new().cacheable());
        cached.run().unwrap();
        cached.state_mut().arguments.set("page", 2);
        cached.run().unwrap();
        assert_eq!(store.keys().len(), 3);

        cached.bust().unwrap();
        assert!(store.keys().is_empty());
        assert_eq!(cached.refresh().unwrap(), json!({ "run": 3 }));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_cacheable_runs_invalidate_their_tags() {
        let (mut cached, runs, store, bus) = setup(Capabilities::new().taggable());
        cached.run().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(store.keys().is_empty());
        let dispatched = bus.dispatched();
        assert_eq!(dispatched.len(), 1);
        let event: &Event = &dispatched[0].event;
        assert_eq!(
            Invalidated::from_event(event).map(|i| i.tags),
            Some(vec!["accounts".to_string(), "billing".to_string()])
        );
    }

    #[test]
    fn explicit_tags_win_over_the_annotation() {
        let (mut cached, ..) = setup(Capabilities::new().taggable());
        cached.state_mut().cache.tags = vec!["Team Members".into(), "team-members".into()];
        assert_eq!(cached.tags().unwrap(), vec!["team_members"]);
    }

    #[test]
    fn call_returns_this_for_fluent_operations() {
        let (mut cached, ..) = setup(Capabilities::new().cacheable());
        assert_eq!(cached.call("ttl", &[json!(5)]).unwrap(), Fluent::This);
        assert_eq!(cached.call("ttl", &[]).unwrap(), Fluent::Value(json!(5)));
        assert_eq!(cached.call("nocache", &[]).unwrap(), Fluent::This);
        assert_eq!(cached.call("cached", &[]).unwrap(), Fluent::Value(json!(false)));
        assert_eq!(cached.call("silence", &[]).unwrap(), Fluent::This);
        assert!(cached.to_base().silenced());
    }
}
