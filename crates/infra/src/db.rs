//! Transactional connection contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cadence_core::RunError;
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransactionError {
    #[error("no transaction is open")]
    NotStarted,
    #[error("database error: {0}")]
    Backend(String),
}

impl From<TransactionError> for RunError {
    fn from(value: TransactionError) -> Self {
        RunError::Transaction(value.to_string())
    }
}

/// Connection able to open, commit and roll back a transaction.
pub trait Connection: Send + Sync {
    fn begin(&self) -> Result<(), TransactionError>;

    fn commit(&self) -> Result<(), TransactionError>;

    fn rollback(&self) -> Result<(), TransactionError>;
}

impl<C> Connection for Arc<C>
where
    C: Connection + ?Sized,
{
    fn begin(&self) -> Result<(), TransactionError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), TransactionError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        (**self).rollback()
    }
}

/// Counting connection for tests/dev. Nested `begin` calls are tracked as
/// levels; commit and rollback close the innermost one.
#[derive(Debug, Default)]
pub struct InMemoryConnection {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    level: AtomicUsize,
}

impl InMemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    /// Currently open transactions.
    pub fn level(&self) -> usize {
        self.level.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<(), TransactionError> {
        self.level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |l| l.checked_sub(1))
            .map(|_| ())
            .map_err(|_| TransactionError::NotStarted)
    }
}

impl Connection for InMemoryConnection {
    fn begin(&self) -> Result<(), TransactionError> {
        let level = self.level.fetch_add(1, Ordering::SeqCst) + 1;
        self.begun.fetch_add(1, Ordering::SeqCst);
        debug!(level, "transaction begun");
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        self.close()?;
        self.committed.fetch_add(1, Ordering::SeqCst);
        debug!("transaction committed");
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        self.close()?;
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        debug!("transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_levels() {
        let conn = InMemoryConnection::new();
        conn.begin().unwrap();
        conn.begin().unwrap();
        assert_eq!(conn.level(), 2);
        conn.rollback().unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.level(), 0);
        assert_eq!((conn.begun(), conn.committed(), conn.rolled_back()), (2, 1, 1));
    }

    #[test]
    fn closing_without_begin_fails() {
        let conn = InMemoryConnection::new();
        assert!(matches!(conn.commit(), Err(TransactionError::NotStarted)));
        assert_eq!(conn.committed(), 0);
    }
}
