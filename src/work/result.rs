//! # Result shapes.
//!
//! - [`Value`] one scalar cell.
//! - [`ResultSet`] what a transaction returns for one operation: rows, or a
//!   command completion without rows.
//! - [`CycleResult`] what the executor hands back to the worker loop, once per cycle.

use std::fmt;

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL / absent.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer width.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer, if this is one.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// A row of cells.
pub type Row = Vec<Value>;

/// Outcome of one executed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    /// A row-returning statement.
    Rows {
        /// Column names, in order.
        columns: Vec<String>,
        /// Returned rows.
        rows: Vec<Row>,
    },
    /// A statement that completed without returning rows.
    Command {
        /// Completion tag (`UPDATE`, `CREATE TABLE`, ...).
        tag: String,
        /// Rows affected.
        rows_affected: u64,
    },
}

impl ResultSet {
    /// A one-row, one-column result.
    pub fn scalar(column: impl Into<String>, value: impl Into<Value>) -> Self {
        ResultSet::Rows {
            columns: vec![column.into()],
            rows: vec![vec![value.into()]],
        }
    }

    /// A row-returning result with no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        ResultSet::Rows {
            columns,
            rows: Vec::new(),
        }
    }

    /// A command completion.
    pub fn command(tag: impl Into<String>, rows_affected: u64) -> Self {
        ResultSet::Command {
            tag: tag.into(),
            rows_affected,
        }
    }

    /// Number of rows returned (zero for commands).
    pub fn processed(&self) -> usize {
        match self {
            ResultSet::Rows { rows, .. } => rows.len(),
            ResultSet::Command { .. } => 0,
        }
    }
}

/// Result of one cycle's unit of work.
///
/// Exactly one exists per cycle; it is consumed by the loop for logging and
/// status reporting and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleResult {
    /// `false` only for conditions the loop must treat as fatal.
    pub succeeded: bool,
    /// Scalar produced by the cycle, `None` for an empty result.
    pub value: Option<Value>,
    /// Diagnostic for a failed cycle.
    pub error: Option<String>,
}

impl CycleResult {
    /// Successful cycle with a scalar.
    pub fn value(value: Value) -> Self {
        Self {
            succeeded: true,
            value: Some(value),
            error: None,
        }
    }

    /// Successful cycle without a scalar.
    pub fn empty() -> Self {
        Self {
            succeeded: true,
            value: None,
            error: None,
        }
    }

    /// Failed cycle.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            value: None,
            error: Some(detail.into()),
        }
    }
}
