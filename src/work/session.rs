//! # Session seams and the transactional scope.
//!
//! The worker loop never talks to a database directly. It goes through three
//! object-safe traits:
//!
//! ```text
//! Connector::connect(database) ──► Session::begin() ──► Transaction
//!                                                        ├─ execute(op) ──► ResultSet
//!                                                        ├─ commit()
//!                                                        └─ rollback()
//! ```
//!
//! [`TransactionScope`] owns one open [`Transaction`] for exactly one cycle.
//! It is released on every exit path: [`TransactionScope::commit`] on success,
//! rollback in `Drop` otherwise (including the fatal path and panics).

use async_trait::async_trait;

use crate::error::SessionError;
use crate::work::{Operation, ResultSet};

/// Opens sessions against a named target database.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establishes a session bound to `database` for the life of one worker instance.
    async fn connect(&self, database: &str) -> Result<Box<dyn Session>, SessionError>;
}

/// A live session owned by a single worker instance.
#[async_trait]
pub trait Session: Send + Sync {
    /// Starts a new transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, SessionError>;
}

/// One open transaction.
///
/// After `commit` or `rollback` the transaction is finished; further calls
/// must be no-ops or return an error.
#[async_trait]
pub trait Transaction: Send {
    /// Runs one operation inside the transaction.
    async fn execute(&mut self, op: &Operation) -> Result<ResultSet, SessionError>;

    /// Commits the transaction.
    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Abandons the transaction. Must not block and must not fail.
    fn rollback(&mut self);
}

/// Scoped transaction for one cycle.
///
/// Dropping an uncommitted scope rolls the transaction back.
pub struct TransactionScope {
    tx: Option<Box<dyn Transaction>>,
}

impl TransactionScope {
    /// Begins a transaction on `session`.
    pub async fn open(session: &dyn Session) -> Result<Self, SessionError> {
        let tx = session.begin().await?;
        Ok(Self { tx: Some(tx) })
    }

    /// Runs `op` in the open transaction.
    pub async fn execute(&mut self, op: &Operation) -> Result<ResultSet, SessionError> {
        match self.tx.as_mut() {
            Some(tx) => tx.execute(op).await,
            None => Err(SessionError::Transaction {
                error: "transaction already finished".into(),
            }),
        }
    }

    /// Commits and closes the scope.
    ///
    /// A failed commit still releases the transaction.
    pub async fn commit(mut self) -> Result<(), SessionError> {
        let Some(mut tx) = self.tx.take() else {
            return Ok(());
        };
        let res = tx.commit().await;
        if res.is_err() {
            tx.rollback();
        }
        res
    }

    /// Returns `true` while the transaction is still open.
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if let Some(mut tx) = self.tx.take() {
            tx.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counts {
        committed: AtomicUsize,
        rolled_back: AtomicUsize,
    }

    struct Tx(Arc<Counts>);

    #[async_trait]
    impl Transaction for Tx {
        async fn execute(&mut self, _op: &Operation) -> Result<ResultSet, SessionError> {
            Ok(ResultSet::scalar("count", 1))
        }
        async fn commit(&mut self) -> Result<(), SessionError> {
            self.0.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn rollback(&mut self) {
            self.0.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Sess(Arc<Counts>);

    #[async_trait]
    impl Session for Sess {
        async fn begin(&self) -> Result<Box<dyn Transaction>, SessionError> {
            Ok(Box::new(Tx(self.0.clone())))
        }
    }

    #[tokio::test]
    async fn commit_does_not_roll_back() {
        let counts = Arc::new(Counts::default());
        let sess = Sess(counts.clone());
        let mut scope = TransactionScope::open(&sess).await.unwrap();
        scope.execute(&Operation::new("SELECT 1;")).await.unwrap();
        scope.commit().await.unwrap();
        assert_eq!(counts.committed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.rolled_back.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn drop_rolls_back() {
        let counts = Arc::new(Counts::default());
        let sess = Sess(counts.clone());
        {
            let scope = TransactionScope::open(&sess).await.unwrap();
            assert!(scope.is_open());
        }
        assert_eq!(counts.committed.load(Ordering::SeqCst), 0);
        assert_eq!(counts.rolled_back.load(Ordering::SeqCst), 1);
    }
}
