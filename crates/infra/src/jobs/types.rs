//! Core job types.

use std::time::Duration;

use cadence_events::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which code handles a job.
///
/// Parsed from `"Type"` (run the type as a command) or `"Type@method"`
/// (call `method` on the resolved type with the event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum HandlerRef {
    Run(String),
    Call { target: String, method: String },
}

impl HandlerRef {
    pub fn parse(signature: &str) -> Self {
        match signature.split_once('@') {
            Some((target, "run")) => HandlerRef::Run(target.to_string()),
            Some((target, method)) => HandlerRef::Call {
                target: target.to_string(),
                method: method.to_string(),
            },
            None => HandlerRef::Run(signature.to_string()),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            HandlerRef::Run(target) | HandlerRef::Call { target, .. } => target,
        }
    }

    /// `Type` or `Type@method`.
    pub fn signature(&self) -> String {
        match self {
            HandlerRef::Run(target) => target.clone(),
            HandlerRef::Call { target, method } => format!("{target}@{method}"),
        }
    }
}

impl From<HandlerRef> for String {
    fn from(value: HandlerRef) -> Self {
        value.signature()
    }
}

impl TryFrom<String> for HandlerRef {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self::parse(&value))
    }
}

impl From<&str> for HandlerRef {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Where and when a handler wants its jobs to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub connection: Option<String>,
    pub queue: Option<String>,
    pub delay: Option<Duration>,
}

impl QueueSettings {
    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A queued unit of work: an event plus the handler that should receive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub event: Event,
    pub handler: HandlerRef,
    pub connection: Option<String>,
    pub queue: Option<String>,
    pub delay: Option<Duration>,
    /// Jobs enqueued, in order, once this one completes.
    pub chain: Vec<Job>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(event: Event, handler: impl Into<HandlerRef>) -> Self {
        Self {
            id: JobId::new(),
            event,
            handler: handler.into(),
            connection: None,
            queue: None,
            delay: None,
            chain: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Copy whatever queue settings the handler declares.
    pub fn with_settings(mut self, settings: &QueueSettings) -> Self {
        if let Some(queue) = &settings.queue {
            self.queue = Some(queue.clone());
        }
        if let Some(connection) = &settings.connection {
            self.connection = Some(connection.clone());
        }
        if let Some(delay) = settings.delay {
            self.delay = Some(delay);
        }
        self
    }

    pub fn available_at(&self) -> DateTime<Utc> {
        let delay = self
            .delay
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(chrono::Duration::zero);
        self.created_at + delay
    }

    pub fn is_ready(&self) -> bool {
        self.available_at() <= Utc::now()
    }
}
