//! Capability-driven command and query dispatch.
//!
//! A [`Runnable`] declares what it is ([`Kind`]) and what it opts into
//! ([`Capabilities`]). The [`Dispatcher`] composes the matching decorators
//! ([`Cached`], [`Transaction`], [`Evented`]) around it and returns a
//! [`Builder`] for collecting arguments and running it.

pub mod builder;
pub mod cached;
pub mod config;
pub mod container;
pub mod dispatcher;
pub mod evented;
pub mod macros;
pub mod runnable;
pub mod transaction;
pub mod worker;

pub use builder::Builder;
pub use cached::Cached;
pub use config::DispatcherConfig;
pub use container::{Container, Resolver};
pub use dispatcher::{Dispatched, Dispatcher, DispatcherBuilder, Handled, Target};
pub use evented::Evented;
pub use macros::{Macro, Mixin};
pub use runnable::{
    AsRunnable, CacheSettings, Capabilities, EventSpec, Fluent, Kind, Runnable, RunnableState, call_mixin,
    find_layer, find_layer_mut, layer_names,
};
pub use transaction::Transaction;
pub use worker::{JobOutcome, JobWorker, WorkerStats};
