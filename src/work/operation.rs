//! # Operation descriptor.
//!
//! An [`Operation`] is the opaque unit-of-work payload: the text handed to the
//! transaction (a query in the database case), plus the noun used when a cycle
//! logs its scalar ("Currently 5 roles in database cluster").

use std::fmt;
use std::sync::Arc;

/// Opaque description of the work executed once per cycle.
///
/// Cheap to clone.
///
/// ## Example
/// ```
/// use bgvisor::Operation;
///
/// let op = Operation::new("SELECT count(*) FROM pg_roles;")
///     .with_subject("roles in database cluster");
/// assert_eq!(op.text(), "SELECT count(*) FROM pg_roles;");
/// assert_eq!(op.subject(), "roles in database cluster");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    text: Arc<str>,
    subject: Arc<str>,
}

impl Operation {
    /// Creates an operation from its text. The subject defaults to `"rows"`.
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            subject: Arc::from("rows"),
        }
    }

    /// Sets the noun logged after the scalar.
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Operation text; also reported as the running activity.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Noun logged after the scalar.
    #[inline]
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
