//! # PostgreSQL connector (`sqlx`).
//!
//! [`PgConnector`] keeps the server options from a connection URL and opens one
//! single-connection pool per worker instance, bound to the database named in
//! the worker's configuration. Each cycle runs in a `sqlx` transaction; a
//! transaction dropped without commit is rolled back by `sqlx`.
//!
//! The statement is prepared first: one without result columns runs as a
//! command and comes back as [`ResultSet::Command`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, Executor as _, Pool, Postgres, Row, Statement as _, TypeInfo};
use tracing::{debug, instrument};

use crate::error::SessionError;
use crate::work::{Connector, Operation, ResultSet, Session, Transaction, Value};

/// Opens `sqlx` sessions against a PostgreSQL server.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    acquire_timeout: Duration,
}

impl PgConnector {
    /// Parses a `postgres://` URL. The database part of the URL is replaced by
    /// the worker's configured database on connect.
    pub fn new(url: &str) -> Result<Self, SessionError> {
        let options = PgConnectOptions::from_str(url).map_err(|e| SessionError::Connect {
            database: String::new(),
            error: e.to_string(),
        })?;
        Ok(Self {
            options,
            acquire_timeout: Duration::from_secs(5),
        })
    }

    /// Sets how long `connect` waits for the server.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for PgConnector {
    #[instrument(skip(self), err)]
    async fn connect(&self, database: &str) -> Result<Box<dyn Session>, SessionError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(self.options.clone().database(database))
            .await
            .map_err(|e| SessionError::Connect {
                database: database.to_string(),
                error: e.to_string(),
            })?;
        Ok(Box::new(PgSession { pool }))
    }
}

struct PgSession {
    pool: Pool<Postgres>,
}

#[async_trait]
impl Session for PgSession {
    async fn begin(&self) -> Result<Box<dyn Transaction>, SessionError> {
        let tx = self.pool.begin().await.map_err(|e| SessionError::Transaction {
            error: e.to_string(),
        })?;
        Ok(Box::new(PgTransaction { tx: Some(tx) }))
    }
}

struct PgTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

fn closed() -> SessionError {
    SessionError::Transaction {
        error: "transaction is closed".into(),
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn execute(&mut self, op: &Operation) -> Result<ResultSet, SessionError> {
        let tx = self.tx.as_mut().ok_or_else(closed)?;
        let exec_err = |e: sqlx::Error| SessionError::Execute {
            error: e.to_string(),
        };

        // A statement without result columns is a command, not a query.
        let returns_rows = !(&mut **tx)
            .prepare(op.text())
            .await
            .map_err(exec_err)?
            .columns()
            .is_empty();
        if !returns_rows {
            let done = sqlx::query(op.text())
                .execute(&mut **tx)
                .await
                .map_err(exec_err)?;
            debug!(rows_affected = done.rows_affected(), "command executed");
            return Ok(ResultSet::command(command_tag(op.text()), done.rows_affected()));
        }

        let rows: Vec<PgRow> = sqlx::query(op.text())
            .fetch_all(&mut **tx)
            .await
            .map_err(exec_err)?;
        debug!(rows = rows.len(), "operation executed");

        let Some(first) = rows.first() else {
            return Ok(ResultSet::empty(Vec::new()));
        };
        let columns = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>();
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| decode(row, i)).collect())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResultSet::Rows { columns, rows })
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        let tx = self.tx.take().ok_or_else(closed)?;
        tx.commit().await.map_err(|e| SessionError::Transaction {
            error: e.to_string(),
        })
    }

    fn rollback(&mut self) {
        // sqlx queues the ROLLBACK when an open transaction is dropped.
        self.tx.take();
    }
}

/// Leading keyword of a statement, upper-cased (`"UPDATE"`, `"CREATE"`).
fn command_tag(sql: &str) -> String {
    sql.split(|c: char| c.is_whitespace() || c == ';' || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or("")
        .to_ascii_uppercase()
}

fn decode(row: &PgRow, idx: usize) -> Result<Value, SessionError> {
    let ty = row.column(idx).type_info().name().to_ascii_uppercase();
    let err = |e: sqlx::Error| SessionError::Execute {
        error: format!("column {idx} ({ty}): {e}"),
    };
    let value = match ty.as_str() {
        "INT8" => row.try_get::<Option<i64>, _>(idx).map_err(err)?.map(Value::Int),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(err)?
            .map(|v| Value::Int(i64::from(v))),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map_err(err)?
            .map(|v| Value::Int(i64::from(v))),
        "BOOL" => row.try_get::<Option<bool>, _>(idx).map_err(err)?.map(Value::Bool),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx).map_err(err)?.map(Value::Float),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map_err(err)?
            .map(|v| Value::Float(f64::from(v))),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .map_err(err)?
            .map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::command_tag;
    use crate::work::{Executor, ResultSet};

    #[test]
    fn command_tag_is_leading_keyword() {
        assert_eq!(command_tag("update t set x = 1"), "UPDATE");
        assert_eq!(command_tag("  \n CREATE TABLE t (x int);"), "CREATE");
        assert_eq!(command_tag("VACUUM;"), "VACUUM");
        assert_eq!(command_tag(""), "");
    }

    #[test]
    fn command_results_take_the_fatal_path() {
        let res = ResultSet::command(command_tag("UPDATE t SET x = 1"), 3);
        let out = Executor::interpret(Ok(res));
        assert!(!out.succeeded);
        assert!(out.error.unwrap().contains("unexpected result kind"));
    }
}
