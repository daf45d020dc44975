//! Infrastructure collaborators consumed by the dispatch layer.
//!
//! Each module defines a narrow contract plus an in-memory adapter used for
//! tests and local development.

pub mod cache;
pub mod db;
pub mod jobs;
pub mod query;

pub use cache::{CacheError, CacheManager, CacheStore, InMemoryCacheStore};
pub use db::{Connection, InMemoryConnection, TransactionError};
pub use jobs::{Chain, HandlerRef, InMemoryJobQueue, Job, JobId, JobQueue, PendingDispatch, QueueError, QueueSettings};
pub use query::{PageRequest, Paginator, QueryBuilder, QueryError, TableQuery};
