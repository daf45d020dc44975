//! Events emitted by the dispatch layer and the bus that carries them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod registry;

pub use bus::{BusError, EventBus, Subscription};
pub use event::{Event, Invalidated};
pub use in_memory_bus::{Dispatch, InMemoryEventBus, Listener, WILDCARD};
pub use registry::{EventFactory, EventRegistry};
