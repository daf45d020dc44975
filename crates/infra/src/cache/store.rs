//! Key-value cache contract and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use cadence_core::RunError;
use serde_json::Value;
use tracing::debug;

/// Cache store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache state is poisoned")]
    Poisoned,
    #[error("cache driver {0} is not configured")]
    UnknownDriver(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<CacheError> for RunError {
    fn from(value: CacheError) -> Self {
        RunError::Cache(value.to_string())
    }
}

/// Key-value store used for response caching.
pub trait CacheStore: Send + Sync {
    fn has(&self, index: &str) -> Result<bool, CacheError>;

    fn get(&self, index: &str) -> Result<Option<Value>, CacheError>;

    /// Store for `ttl`; `None` keeps the entry until forgotten.
    fn put(&self, index: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    fn forever(&self, index: &str, value: Value) -> Result<(), CacheError> {
        self.put(index, value, None)
    }

    /// Returns whether an entry was removed.
    fn forget(&self, index: &str) -> Result<bool, CacheError>;
}

impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    fn has(&self, index: &str) -> Result<bool, CacheError> {
        (**self).has(index)
    }

    fn get(&self, index: &str) -> Result<Option<Value>, CacheError> {
        (**self).get(index)
    }

    fn put(&self, index: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        (**self).put(index, value, ttl)
    }

    fn forever(&self, index: &str, value: Value) -> Result<(), CacheError> {
        (**self).forever(index, value)
    }

    fn forget(&self, index: &str) -> Result<bool, CacheError> {
        (**self).forget(index)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
    pub forgets: usize,
}

/// In-memory cache store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    stats: Mutex<CacheStats>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|e| {
                e.iter()
                    .filter(|(_, entry)| entry.is_live(now))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Time left before `index` expires; `None` for permanent or missing entries.
    pub fn ttl_of(&self, index: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().ok()?;
        let at = entries.get(index)?.expires_at?;
        Some(at.saturating_duration_since(now))
    }

    fn bump(&self, f: impl FnOnce(&mut CacheStats)) -> Result<(), CacheError> {
        let mut stats = self.stats.lock().map_err(|_| CacheError::Poisoned)?;
        f(&mut stats);
        Ok(())
    }

    fn live(&self, index: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries
            .get(index)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }
}

impl CacheStore for InMemoryCacheStore {
    fn has(&self, index: &str) -> Result<bool, CacheError> {
        Ok(self.live(index)?.is_some())
    }

    fn get(&self, index: &str) -> Result<Option<Value>, CacheError> {
        let value = self.live(index)?;
        self.bump(|s| {
            if value.is_some() {
                s.hits += 1;
            } else {
                s.misses += 1;
            }
        })?;
        Ok(value)
    }

    fn put(&self, index: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        debug!(index, ttl_secs = ttl.map(|t| t.as_secs()), "cache put");
        let entry = Entry {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries
            .write()
            .map_err(|_| CacheError::Poisoned)?
            .insert(index.to_string(), entry);
        self.bump(|s| s.writes += 1)
    }

    fn forget(&self, index: &str) -> Result<bool, CacheError> {
        let removed = self
            .entries
            .write()
            .map_err(|_| CacheError::Poisoned)?
            .remove(index)
            .is_some();
        self.bump(|s| s.forgets += 1)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_forget() {
        let store = InMemoryCacheStore::new();
        assert!(!store.has("a").unwrap());

        store.put("a", json!(1), Some(Duration::from_secs(30))).unwrap();
        assert!(store.has("a").unwrap());
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        assert!(store.ttl_of("a").unwrap() <= Duration::from_secs(30));

        assert!(store.forget("a").unwrap());
        assert!(!store.forget("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);

        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes, stats.forgets), (1, 1, 1, 2));
    }

    #[test]
    fn expired_entries_are_misses() {
        let store = InMemoryCacheStore::new();
        store.put("gone", json!(true), Some(Duration::ZERO)).unwrap();
        assert!(!store.has("gone").unwrap());
        assert!(store.keys().is_empty());
    }

    #[test]
    fn forever_entries_have_no_ttl() {
        let store = InMemoryCacheStore::new();
        store.forever("kept", json!("v")).unwrap();
        assert!(store.has("kept").unwrap());
        assert_eq!(store.ttl_of("kept"), None);
    }
}
