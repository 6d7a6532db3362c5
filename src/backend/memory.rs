//! # In-memory connector.
//!
//! [`MemoryConnector`] answers every operation from a scripted responder and
//! counts what happened to its transactions. Demos and tests run the full
//! worker loop against it without a database server.
//!
//! ## Example
//! ```
//! use bgvisor::backend::MemoryConnector;
//! use bgvisor::{ResultSet, Value};
//!
//! // Always five roles.
//! let conn = MemoryConnector::scalar(Value::Int(5));
//!
//! // First cycle sees no rows, every later one sees 3.
//! let scripted = MemoryConnector::script(vec![
//!     Ok(ResultSet::empty(vec!["count".into()])),
//!     Ok(ResultSet::scalar("count", 3)),
//! ]);
//! assert_eq!(scripted.stats().executed, 0);
//! # let _ = conn;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::work::{Connector, Operation, ResultSet, Session, Transaction, Value};

type Responder = dyn Fn(&Operation, u64) -> Result<ResultSet, SessionError> + Send + Sync;

/// Counters observed by a [`MemoryConnector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Sessions opened.
    pub connects: u64,
    /// Transactions started.
    pub begun: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions rolled back.
    pub rolled_back: u64,
    /// Operations executed.
    pub executed: u64,
}

#[derive(Default)]
struct Counters {
    connects: AtomicU64,
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    executed: AtomicU64,
}

struct Shared {
    responder: Box<Responder>,
    counters: Counters,
    databases: Mutex<Vec<String>>,
    refuse_connect: AtomicBool,
    fail_commit: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

/// Scripted connector. Cheap to clone; clones share counters.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Creates a connector answering with `responder(op, call_index)`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Operation, u64) -> Result<ResultSet, SessionError> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                responder: Box::new(responder),
                counters: Counters::default(),
                databases: Mutex::new(Vec::new()),
                refuse_connect: AtomicBool::new(false),
                fail_commit: AtomicBool::new(false),
                latency: Mutex::new(None),
            }),
        }
    }

    /// Answers every operation with a single `count` cell.
    pub fn scalar(value: Value) -> Self {
        Self::new(move |_, _| Ok(ResultSet::scalar("count", value.clone())))
    }

    /// Answers with the scripted results in order; the last one repeats.
    ///
    /// An empty script answers with zero rows.
    pub fn script(results: Vec<Result<ResultSet, SessionError>>) -> Self {
        Self::new(move |_, call| {
            let idx = usize::try_from(call).unwrap_or(usize::MAX);
            match results.get(idx).or_else(|| results.last()) {
                Some(r) => r.clone(),
                None => Ok(ResultSet::empty(vec!["count".into()])),
            }
        })
    }

    /// Makes every later `connect` fail.
    pub fn refuse_connections(self) -> Self {
        self.shared.refuse_connect.store(true, Ordering::SeqCst);
        self
    }

    /// Makes every later `commit` fail.
    pub fn fail_commits(self) -> Self {
        self.shared.fail_commit.store(true, Ordering::SeqCst);
        self
    }

    /// Delays each `execute` by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.shared.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
        self
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MemoryStats {
        let c = &self.shared.counters;
        MemoryStats {
            connects: c.connects.load(Ordering::SeqCst),
            begun: c.begun.load(Ordering::SeqCst),
            committed: c.committed.load(Ordering::SeqCst),
            rolled_back: c.rolled_back.load(Ordering::SeqCst),
            executed: c.executed.load(Ordering::SeqCst),
        }
    }

    /// Databases sessions were opened against, in order.
    pub fn databases(&self) -> Vec<String> {
        self.shared
            .databases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, database: &str) -> Result<Box<dyn Session>, SessionError> {
        if self.shared.refuse_connect.load(Ordering::SeqCst) {
            return Err(SessionError::Connect {
                database: database.to_string(),
                error: "connection refused".into(),
            });
        }
        self.shared.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.shared
            .databases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(database.to_string());
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemorySession {
    shared: Arc<Shared>,
}

#[async_trait]
impl Session for MemorySession {
    async fn begin(&self) -> Result<Box<dyn Transaction>, SessionError> {
        self.shared.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            open: true,
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    open: bool,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn execute(&mut self, op: &Operation) -> Result<ResultSet, SessionError> {
        if !self.open {
            return Err(SessionError::Transaction {
                error: "transaction is closed".into(),
            });
        }
        let latency = *self.shared.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        let call = self.shared.counters.executed.fetch_add(1, Ordering::SeqCst);
        (self.shared.responder)(op, call)
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        if !self.open {
            return Err(SessionError::Transaction {
                error: "transaction is closed".into(),
            });
        }
        if self.shared.fail_commit.load(Ordering::SeqCst) {
            return Err(SessionError::Transaction {
                error: "could not serialize access".into(),
            });
        }
        self.open = false;
        self.shared.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) {
        if std::mem::take(&mut self.open) {
            self.shared.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::TransactionScope;

    #[tokio::test]
    async fn script_repeats_last_entry() {
        let conn = MemoryConnector::script(vec![
            Ok(ResultSet::empty(vec!["count".into()])),
            Ok(ResultSet::scalar("count", 3)),
        ]);
        let sess = conn.connect("postgres").await.unwrap();
        let op = Operation::new("SELECT count(*) FROM pg_roles;");

        let mut seen = Vec::new();
        for _ in 0..3 {
            let mut scope = TransactionScope::open(sess.as_ref()).await.unwrap();
            seen.push(scope.execute(&op).await.unwrap().processed());
            scope.commit().await.unwrap();
        }
        assert_eq!(seen, vec![0, 1, 1]);
        assert_eq!(
            conn.stats(),
            MemoryStats {
                connects: 1,
                begun: 3,
                committed: 3,
                rolled_back: 0,
                executed: 3,
            }
        );
        assert_eq!(conn.databases(), vec!["postgres".to_string()]);
    }

    #[tokio::test]
    async fn failed_commit_is_rolled_back() {
        let conn = MemoryConnector::scalar(Value::Int(1)).fail_commits();
        let sess = conn.connect("postgres").await.unwrap();
        let scope = TransactionScope::open(sess.as_ref()).await.unwrap();
        assert!(scope.commit().await.is_err());
        assert_eq!(conn.stats().rolled_back, 1);
        assert_eq!(conn.stats().committed, 0);
    }

    #[tokio::test]
    async fn refused_connection_names_database() {
        let conn = MemoryConnector::scalar(Value::Int(1)).refuse_connections();
        let err = conn.connect("analytics").await.err().unwrap();
        assert_eq!(err.as_label(), "session_connect");
        assert!(err.to_string().contains("analytics"));
    }
}
