//! Runs the wrapped runnable inside a database transaction.

use std::sync::Arc;

use cadence_core::{RunError, RunResult};
use cadence_infra::{Connection, QueryBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::runnable::{Capabilities, Fluent, Kind, Runnable, RunnableState, call_mixin};

pub struct Transaction {
    inner: Box<dyn Runnable>,
    connection: Arc<dyn Connection>,
}

impl Transaction {
    pub fn new(inner: Box<dyn Runnable>, connection: Arc<dyn Connection>) -> Self {
        Self { inner, connection }
    }
}

impl Runnable for Transaction {
    fn state(&self) -> &RunnableState {
        self.inner.state()
    }

    fn state_mut(&mut self) -> &mut RunnableState {
        self.inner.state_mut()
    }

    /// Errors roll back and propagate unchanged. An aborted run also rolls
    /// back but still returns its response.
    fn run(&mut self) -> RunResult<Value> {
        self.connection.begin()?;

        let response = match self.inner.run() {
            Ok(response) => response,
            Err(err) => {
                if let Err(rollback) = self.connection.rollback() {
                    warn!(error = %rollback, "rollback after failed run also failed");
                }
                debug!(error = %err, "transaction rolled back");
                return Err(err);
            }
        };

        if self.aborted() {
            self.connection.rollback()?;
            debug!("transaction rolled back after abort");
        } else {
            self.connection.commit()?;
        }
        Ok(response)
    }

    fn kind(&self) -> Kind {
        self.inner.kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn to_base(&self) -> &dyn Runnable {
        self.inner.to_base()
    }

    fn to_base_mut(&mut self) -> &mut dyn Runnable {
        self.inner.to_base_mut()
    }

    fn wrapped(&self) -> Option<&dyn Runnable> {
        Some(self.inner.as_ref())
    }

    fn wrapped_mut(&mut self) -> Option<&mut dyn Runnable> {
        Some(self.inner.as_mut())
    }

    fn query_builder(&self) -> Option<Box<dyn QueryBuilder>> {
        self.inner.query_builder()
    }

    fn call(&mut self, method: &str, args: &[Value]) -> RunResult<Fluent> {
        match call_mixin(self, method, args) {
            Err(RunError::UnknownMethod { .. }) => self.inner.call(method, args),
            other => other,
        }
    }
}
