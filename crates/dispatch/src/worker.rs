//! Synchronous job worker.
//!
//! Handles jobs produced by [`Builder::queue`](crate::Builder::queue),
//! [`Dispatcher::handle_event`] and job chains:
//!
//! - `Type` handlers run `Type` as a command with the event's properties as
//!   arguments.
//! - `Type@method` handlers resolve `Type` and `call(method, [event])` on it.
//!
//! Failures are logged, never raised. Failures no retry can fix (bad
//! arguments, capability mismatches) delete the job; anything else fails it.
//! A completed job enqueues its chain: the first chained job, carrying the
//! rest.

use std::sync::Arc;

use cadence_core::{Arguments, RunError, RunResult};
use cadence_infra::{HandlerRef, InMemoryJobQueue, Job, JobQueue, QueueError};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::runnable::Fluent;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    /// Permanent failure; the job is dropped.
    Deleted(String),
    /// Transient failure; the job may be retried.
    Failed(String),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub completed: u64,
    pub deleted: u64,
    pub failed: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &JobOutcome) {
        self.processed += 1;
        match outcome {
            JobOutcome::Completed(_) => self.completed += 1,
            JobOutcome::Deleted(_) => self.deleted += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobWorker {
    dispatcher: Dispatcher,
}

impl JobWorker {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn handle(&self, job: &Job) -> JobOutcome {
        let signature = job.handler.signature();
        debug!(job_id = %job.id, handler = %signature, "handling job");

        let outcome = match self.execute(job) {
            Ok(value) => match self.enqueue_chain(job) {
                Ok(()) => JobOutcome::Completed(value),
                Err(err) => {
                    error!(job_id = %job.id, handler = %signature, error = %err, "failed to enqueue job chain");
                    JobOutcome::Failed(format!("{signature}: {err}"))
                }
            },
            Err(err) => {
                error!(job_id = %job.id, handler = %signature, error = %err, "job failed");
                let message = format!("{signature}: {err}");
                if err.is_permanent() {
                    JobOutcome::Deleted(message)
                } else {
                    JobOutcome::Failed(message)
                }
            }
        };
        info!(job_id = %job.id, handler = %signature, completed = outcome.is_completed(), "job handled");
        outcome
    }

    fn execute(&self, job: &Job) -> RunResult<Value> {
        match &job.handler {
            HandlerRef::Run(target) => {
                let arguments: Arguments = job.event.properties().into_iter().collect();
                self.dispatcher
                    .command(target.as_str())?
                    .with_arguments(arguments)
                    .run()
            }
            HandlerRef::Call { target, method } => {
                let mut runnable = self.dispatcher.resolve(target.as_str())?;
                match runnable.call(method, &[job.event.to_json()])? {
                    Fluent::This => Ok(Value::Null),
                    Fluent::Value(value) => Ok(value),
                }
            }
        }
    }

    fn enqueue_chain(&self, job: &Job) -> Result<(), RunError> {
        let Some((next, rest)) = job.chain.split_first() else {
            return Ok(());
        };
        let queue: Arc<dyn JobQueue> = self
            .dispatcher
            .jobs()
            .ok_or_else(|| RunError::missing_service("job queue"))?;

        let mut next = next.clone();
        next.chain.extend(rest.iter().cloned());
        let id = queue.enqueue(next)?;
        debug!(job_id = %id, remaining = rest.len(), "enqueued chained job");
        Ok(())
    }

    /// Handle every ready job until the queue has none left.
    pub fn drain(&self, queue: &InMemoryJobQueue) -> Result<WorkerStats, QueueError> {
        let mut stats = WorkerStats::default();
        while let Some(job) = queue.pop_ready()? {
            let outcome = self.handle(&job);
            stats.record(&outcome);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::runnable::{Kind, Runnable, RunnableState};
    use cadence_events::{Event, InMemoryEventBus};
    use serde_json::json;

    #[derive(Default)]
    struct Notify {
        state: RunnableState,
    }

    impl Runnable for Notify {
        fn state(&self) -> &RunnableState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut RunnableState {
            &mut self.state
        }

        fn kind(&self) -> Kind {
            Kind::Command
        }

        fn run(&mut self) -> RunResult<Value> {
            self.argument("email")
        }

        fn call(&mut self, method: &str, args: &[Value]) -> RunResult<Fluent> {
            match method {
                "echo" => Ok(Fluent::Value(args.first().cloned().unwrap_or(Value::Null))),
                _ => crate::runnable::call_mixin(self, method, args),
            }
        }
    }

    fn worker() -> (JobWorker, Arc<InMemoryJobQueue>) {
        let container = Container::arc();
        container.register("notify", || Box::new(Notify::default()));
        let queue = InMemoryJobQueue::arc();
        let dispatcher = Dispatcher::builder(InMemoryEventBus::arc())
            .with_container(container)
            .with_jobs(queue.clone())
            .build();
        (JobWorker::new(dispatcher), queue)
    }

    #[test]
    fn run_handlers_receive_event_properties() {
        let (worker, _) = worker();
        let event = Event::with_payload(Event::GENERIC, json!({"email": "a@b.c"}));
        let outcome = worker.handle(&Job::new(event, "notify"));
        assert_eq!(outcome, JobOutcome::Completed(json!("a@b.c")));
    }

    #[test]
    fn call_handlers_receive_the_event() {
        let (worker, _) = worker();
        let event = Event::from("users.created");
        match worker.handle(&Job::new(event.clone(), "notify@echo")) {
            JobOutcome::Completed(value) => assert_eq!(value, event.to_json()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn argument_errors_delete_the_job() {
        let (worker, _) = worker();
        let outcome = worker.handle(&Job::new(Event::generic(), "notify"));
        assert!(matches!(outcome, JobOutcome::Deleted(ref m) if m.contains("email")));
    }

    #[test]
    fn completed_jobs_enqueue_their_chain() {
        let (worker, queue) = worker();
        let event = Event::with_payload(Event::GENERIC, json!({"email": "a@b.c"}));
        let mut head = Job::new(event.clone(), "notify");
        head.chain = vec![Job::new(event.clone(), "notify"), Job::new(event, "notify@echo")];
        queue.enqueue(head).unwrap();

        let stats = worker.drain(&queue).unwrap();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.completed, 3);
        assert!(queue.is_empty());
    }
}
