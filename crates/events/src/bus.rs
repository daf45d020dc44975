//! Event publishing abstraction (mechanics only).
//!
//! The bus is the only way the dispatch layer talks to listeners. It makes
//! two promises:
//!
//! - `publish` calls every matching listener and hands back all responses,
//!   nulls included.
//! - `publish_until_halted` stops at the first listener that answers with a
//!   non-null value. That answer is the last element of the result.
//!
//! Delivery to remote subscribers, ordering across threads and persistence
//! are all left to the implementation.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use cadence_core::RunError;
use serde_json::Value;
use thiserror::Error;

use crate::event::Event;

#[derive(Debug, Error)]
pub enum BusError {
    /// Internal lock poisoning.
    #[error("event bus state is poisoned")]
    Poisoned,

    #[error("listener for {event} failed: {message}")]
    Listener { event: String, message: String },
}

impl From<BusError> for RunError {
    fn from(value: BusError) -> Self {
        RunError::Events(value.to_string())
    }
}

/// A channel receiving every event published on a bus.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything received so far, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Event bus consumed by the dispatcher and the evented/cached decorators.
///
/// The trait requires `Send + Sync` so one bus can be shared by every
/// dispatcher clone.
pub trait EventBus: Send + Sync {
    /// Fire and collect every listener response.
    fn publish(&self, event: &Event, payload: &[Value]) -> Result<Vec<Value>, BusError>;

    /// Fire until a listener answers with a non-null value.
    fn publish_until_halted(&self, event: &Event, payload: &[Value]) -> Result<Vec<Value>, BusError>;
}

impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    fn publish(&self, event: &Event, payload: &[Value]) -> Result<Vec<Value>, BusError> {
        (**self).publish(event, payload)
    }

    fn publish_until_halted(&self, event: &Event, payload: &[Value]) -> Result<Vec<Value>, BusError> {
        (**self).publish_until_halted(event, payload)
    }
}
