//! Name → runnable resolution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::runnable::Runnable;

/// Resolves a type name to a fresh runnable instance.
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Box<dyn Runnable>>;
}

impl<R> Resolver for Arc<R>
where
    R: Resolver + ?Sized,
{
    fn resolve(&self, name: &str) -> Option<Box<dyn Runnable>> {
        (**self).resolve(name)
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn Runnable> + Send + Sync>;

/// Named-factory resolver.
#[derive(Default)]
pub struct Container {
    factories: RwLock<HashMap<String, Factory>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.names();
        f.debug_struct("Container").field("factories", &names).finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Runnable> + Send + Sync + 'static,
    {
        let name = name.into();
        match self.factories.write() {
            Ok(mut factories) => {
                factories.insert(name, Arc::new(factory));
            }
            Err(_) => warn!(%name, "container lock poisoned; factory not registered"),
        }
    }

    /// Register `T::default` under `T`'s full type name.
    pub fn register_default<T>(&self)
    where
        T: Runnable + Default + 'static,
    {
        self.register(std::any::type_name::<T>(), || Box::new(T::default()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .map(|factories| factories.contains_key(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .map(|factories| factories.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Resolver for Container {
    fn resolve(&self, name: &str) -> Option<Box<dyn Runnable>> {
        // Clone the factory out so it runs without holding the lock.
        let factory = self.factories.read().ok()?.get(name).cloned()?;
        Some(factory())
    }
}
