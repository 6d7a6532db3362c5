//! # Unit-of-work executor.
//!
//! Runs one [`Operation`] inside a scope the caller already opened and turns
//! the returned [`ResultSet`] into a [`CycleResult`]. It never opens, commits
//! or rolls back the scope, and keeps no state between calls.
//!
//! ## Shape rules
//! ```text
//! Command { .. }            → failed  "unexpected result kind"
//! Rows, zero rows           → ok, value = None
//! Rows, first row empty     → failed  "result row has no columns"
//! Rows, first cell NULL     → ok, value = None
//! Rows, otherwise           → ok, value = first cell of first row
//! Err(SessionError)         → failed  with the error text
//! ```

use crate::error::SessionError;
use crate::work::{CycleResult, Operation, ResultSet, TransactionScope};

/// Stateless executor of one operation per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Executes `op` inside `scope` and classifies the result.
    pub async fn execute(&self, scope: &mut TransactionScope, op: &Operation) -> CycleResult {
        Self::interpret(scope.execute(op).await)
    }

    /// Classifies a raw execution result.
    pub fn interpret(res: Result<ResultSet, SessionError>) -> CycleResult {
        match res {
            Err(e) => CycleResult::failed(e.to_string()),
            Ok(ResultSet::Command { tag, .. }) => {
                CycleResult::failed(format!("unexpected result kind: command \"{tag}\""))
            }
            Ok(ResultSet::Rows { rows, .. }) => match rows.first() {
                None => CycleResult::empty(),
                Some(row) => match row.first() {
                    None => CycleResult::failed("result row has no columns"),
                    Some(v) if v.is_null() => CycleResult::empty(),
                    Some(v) => CycleResult::value(v.clone()),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Value;

    #[test]
    fn scalar_is_taken_from_first_cell() {
        let rs = ResultSet::Rows {
            columns: vec!["count".into(), "extra".into()],
            rows: vec![vec![Value::Int(5), Value::Int(9)], vec![Value::Int(7), Value::Null]],
        };
        let r = Executor::interpret(Ok(rs));
        assert!(r.succeeded);
        assert_eq!(r.value, Some(Value::Int(5)));
    }

    #[test]
    fn zero_rows_is_not_an_error() {
        let r = Executor::interpret(Ok(ResultSet::empty(vec!["count".into()])));
        assert!(r.succeeded);
        assert_eq!(r.value, None);
        assert_eq!(r.error, None);
    }

    #[test]
    fn null_scalar_is_empty() {
        let r = Executor::interpret(Ok(ResultSet::scalar("count", Value::Null)));
        assert!(r.succeeded);
        assert!(r.value.is_none());
    }

    #[test]
    fn command_result_is_malformed() {
        let r = Executor::interpret(Ok(ResultSet::command("UPDATE", 3)));
        assert!(!r.succeeded);
        assert!(r.error.unwrap().contains("unexpected result kind"));
    }

    #[test]
    fn malformed_regardless_of_row_count() {
        let rs = ResultSet::Rows {
            columns: vec![],
            rows: vec![vec![], vec![], vec![]],
        };
        let r = Executor::interpret(Ok(rs));
        assert!(!r.succeeded);
    }

    #[test]
    fn session_error_fails_the_cycle() {
        let r = Executor::interpret(Err(SessionError::Execute {
            error: "relation does not exist".into(),
        }));
        assert!(!r.succeeded);
        assert_eq!(
            r.error.as_deref(),
            Some("execution failed: relation does not exist")
        );
    }
}
