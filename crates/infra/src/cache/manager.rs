//! Named cache drivers.

use std::collections::HashMap;
use std::sync::Arc;

use super::store::{CacheError, CacheStore, InMemoryCacheStore};

pub const DEFAULT_DRIVER: &str = "memory";

/// Resolves cache stores by driver name, falling back to a default driver.
#[derive(Clone)]
pub struct CacheManager {
    default: String,
    drivers: HashMap<String, Arc<dyn CacheStore>>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.drivers.keys().collect();
        names.sort();
        f.debug_struct("CacheManager")
            .field("default", &self.default)
            .field("drivers", &names)
            .finish()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CacheManager {
    /// Manager with no drivers; `default` must be registered before use.
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            drivers: HashMap::new(),
        }
    }

    /// A single in-memory driver registered as the default.
    pub fn in_memory() -> Self {
        Self::new(DEFAULT_DRIVER).with_driver(DEFAULT_DRIVER, InMemoryCacheStore::arc())
    }

    pub fn with_driver(mut self, name: impl Into<String>, store: Arc<dyn CacheStore>) -> Self {
        self.drivers.insert(name.into(), store);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = name.into();
        self
    }

    pub fn default_driver(&self) -> &str {
        &self.default
    }

    /// Store registered under `name`, or the default store for `None`.
    pub fn driver(&self, name: Option<&str>) -> Result<Arc<dyn CacheStore>, CacheError> {
        let name = name.unwrap_or(&self.default);
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownDriver(name.to_string()))
    }
}
