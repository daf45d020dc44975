//! Background jobs for queueable runnables.
//!
//! ## Components
//!
//! - `Job`: an event plus a handler reference, with queue settings and a chain
//! - `JobQueue`: where jobs are handed off (in-memory or durable)
//! - `PendingDispatch`: fluent handle that enqueues when dispatched or dropped
//! - `Chain`: a head handler followed by jobs to run after it

pub mod pending;
pub mod queue;
pub mod types;

pub use pending::{Chain, PendingDispatch};
pub use queue::{InMemoryJobQueue, JobQueue, QueueError};
pub use types::{HandlerRef, Job, JobId, QueueSettings};
