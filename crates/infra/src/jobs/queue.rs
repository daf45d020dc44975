//! Job queue contract and an in-memory queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cadence_core::RunError;
use tracing::debug;

use super::types::{Job, JobId};

/// Job queue error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("queue state is poisoned")]
    Poisoned,
    #[error("job already queued: {0}")]
    AlreadyQueued(JobId),
    #[error("queue backend error: {0}")]
    Backend(String),
}

impl From<QueueError> for RunError {
    fn from(value: QueueError) -> Self {
        RunError::Queue(value.to_string())
    }
}

/// Accepts jobs for later execution by a worker.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, QueueError>;
}

impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        (**self).enqueue(job)
    }
}

/// FIFO queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Take the oldest job that is ready to run.
    pub fn pop_ready(&self) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs.lock().map_err(|_| QueueError::Poisoned)?;
        let position = jobs.iter().position(Job::is_ready);
        Ok(position.and_then(|p| jobs.remove(p)))
    }

    /// Snapshot of queued jobs, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .map(|jobs| jobs.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let mut jobs = self.jobs.lock().map_err(|_| QueueError::Poisoned)?;
        if jobs.iter().any(|queued| queued.id == job.id) {
            return Err(QueueError::AlreadyQueued(job.id));
        }
        debug!(
            job_id = %job.id,
            handler = %job.handler.signature(),
            queue = job.queue.as_deref().unwrap_or("default"),
            "job enqueued"
        );
        let id = job.id;
        jobs.push_back(job);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_events::Event;
    use std::time::Duration;

    #[test]
    fn enqueue_rejects_duplicates() {
        let queue = InMemoryJobQueue::new();
        let job = Job::new(Event::generic(), "app::Handler");
        queue.enqueue(job.clone()).unwrap();
        assert!(matches!(queue.enqueue(job), Err(QueueError::AlreadyQueued(_))));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn delayed_jobs_are_skipped_until_ready() {
        let queue = InMemoryJobQueue::new();
        let mut delayed = Job::new(Event::generic(), "app::Later");
        delayed.delay = Some(Duration::from_secs(3600));
        queue.enqueue(delayed).unwrap();
        queue.enqueue(Job::new(Event::generic(), "app::Now")).unwrap();

        let job = queue.pop_ready().unwrap().unwrap();
        assert_eq!(job.handler.target(), "app::Now");
        assert!(queue.pop_ready().unwrap().is_none());
        assert_eq!(queue.len(), 1);
    }
}
