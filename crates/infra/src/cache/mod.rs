//! Response cache collaborators.

pub mod manager;
pub mod store;

pub use manager::{CacheManager, DEFAULT_DRIVER};
pub use store::{CacheError, CacheStats, CacheStore, InMemoryCacheStore};
