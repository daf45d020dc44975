//! Pending dispatch handles and job chains.

use std::sync::Arc;
use std::time::Duration;

use cadence_events::Event;
use tracing::error;

use super::queue::{JobQueue, QueueError};
use super::types::{HandlerRef, Job, JobId};

/// A job that has been built but not yet handed to the queue.
///
/// Configure it fluently, then call [`PendingDispatch::dispatch`]. A handle
/// dropped without an explicit dispatch enqueues its job on drop; failures
/// there can only be logged.
#[must_use = "the job is enqueued when the handle is dispatched or dropped"]
pub struct PendingDispatch {
    job: Option<Job>,
    queue: Arc<dyn JobQueue>,
}

impl std::fmt::Debug for PendingDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDispatch").field("job", &self.job).finish_non_exhaustive()
    }
}

impl PendingDispatch {
    pub fn new(job: Job, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            job: Some(job),
            queue,
        }
    }

    fn update(mut self, f: impl FnOnce(&mut Job)) -> Self {
        if let Some(job) = self.job.as_mut() {
            f(job);
        }
        self
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn on_connection(self, connection: impl Into<String>) -> Self {
        let connection = connection.into();
        self.update(|job| job.connection = Some(connection))
    }

    pub fn on_queue(self, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        self.update(|job| job.queue = Some(queue))
    }

    /// Connection for this job and every chained job.
    pub fn all_on_connection(self, connection: impl Into<String>) -> Self {
        let connection = connection.into();
        self.update(|job| {
            job.connection = Some(connection.clone());
            for chained in &mut job.chain {
                chained.connection = Some(connection.clone());
            }
        })
    }

    /// Queue for this job and every chained job.
    pub fn all_on_queue(self, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        self.update(|job| {
            job.queue = Some(queue.clone());
            for chained in &mut job.chain {
                chained.queue = Some(queue.clone());
            }
        })
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.update(|job| job.delay = Some(delay))
    }

    /// Jobs to run after this one, in order.
    pub fn chain(self, chain: Vec<Job>) -> Self {
        self.update(|job| job.chain = chain)
    }

    /// Enqueue now.
    pub fn dispatch(mut self) -> Result<JobId, QueueError> {
        match self.job.take() {
            Some(job) => self.queue.enqueue(job),
            None => Err(QueueError::Backend("job already dispatched".into())),
        }
    }
}

impl Drop for PendingDispatch {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            let handler = job.handler.signature();
            if let Err(err) = self.queue.enqueue(job) {
                error!(handler = %handler, error = %err, "failed to enqueue dropped pending job");
            }
        }
    }
}

/// A handler plus the jobs to chain after it.
#[derive(Debug, Clone)]
pub struct Chain {
    pub handler: HandlerRef,
    pub chain: Vec<Job>,
}

impl Chain {
    pub fn new(handler: impl Into<HandlerRef>, chain: Vec<Job>) -> Self {
        Self {
            handler: handler.into(),
            chain,
        }
    }

    /// Pending dispatch of the head job for `event`, carrying the chain.
    pub fn dispatch(self, event: Event, queue: Arc<dyn JobQueue>) -> PendingDispatch {
        PendingDispatch::new(Job::new(event, self.handler), queue).chain(self.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryJobQueue;

    #[test]
    fn configured_job_is_enqueued_on_dispatch() {
        let queue = InMemoryJobQueue::arc();
        let id = PendingDispatch::new(Job::new(Event::generic(), "app::Handler"), queue.clone())
            .on_connection("redis")
            .on_queue("high")
            .delay(Duration::from_secs(5))
            .dispatch()
            .unwrap();

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].connection.as_deref(), Some("redis"));
        assert_eq!(jobs[0].queue.as_deref(), Some("high"));
        assert_eq!(jobs[0].delay, Some(Duration::from_secs(5)));
    }

    #[test]
    fn dropping_the_handle_enqueues() {
        let queue = InMemoryJobQueue::arc();
        {
            let _pending = PendingDispatch::new(Job::new(Event::generic(), "app::Handler"), queue.clone());
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn chain_settings_apply_to_every_job() {
        let queue = InMemoryJobQueue::arc();
        let next = vec![
            Job::new(Event::generic(), "app::Second"),
            Job::new(Event::generic(), "app::Third"),
        ];
        Chain::new("app::First", next)
            .dispatch(Event::from("orders.placed"), queue.clone())
            .all_on_queue("orders")
            .all_on_connection("sync")
            .dispatch()
            .unwrap();

        let head = &queue.jobs()[0];
        assert_eq!(head.handler.target(), "app::First");
        assert_eq!(head.chain.len(), 2);
        assert!(head.chain.iter().all(|j| j.queue.as_deref() == Some("orders")));
        assert!(head.chain.iter().all(|j| j.connection.as_deref() == Some("sync")));
    }
}
