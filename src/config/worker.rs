//! # Per-instance worker configuration.
//!
//! [`WorkerConfig`] is an immutable snapshot: how long a worker sleeps between
//! cycles and which database it operates against. A snapshot is built once at
//! registration time and handed to the worker loop by value; a reload produces
//! a new snapshot instead of mutating the old one.
//!
//! ## Defaults
//! - `check_duration = 10s`
//! - `database = "postgres"`
//!
//! ## Bounds
//! - `check_duration > 0`; when given in whole seconds, `1..=i32::MAX`.
//! - `database` is non-empty.

use std::time::Duration;

use crate::error::ConfigError;

/// Default interval between two cycles.
pub const DEFAULT_CHECK_DURATION: Duration = Duration::from_secs(10);

/// Default database identity.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Largest accepted interval, in seconds.
pub const MAX_CHECK_SECS: u64 = i32::MAX as u64;

/// Immutable per-instance worker configuration.
///
/// ## Example
/// ```
/// use std::time::Duration;
/// use bgvisor::WorkerConfig;
///
/// let cfg = WorkerConfig::default();
/// assert_eq!(cfg.check_duration(), Duration::from_secs(10));
/// assert_eq!(cfg.database(), "postgres");
///
/// let cfg = WorkerConfig::from_secs(30, "app").unwrap();
/// assert_eq!(cfg.check_duration(), Duration::from_secs(30));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    check_duration: Duration,
    database: String,
}

impl WorkerConfig {
    /// Creates a validated configuration.
    pub fn new(check_duration: Duration, database: impl Into<String>) -> Result<Self, ConfigError> {
        if check_duration.is_zero() {
            return Err(ConfigError::Invalid {
                key: "check_duration",
                reason: "must be greater than zero".into(),
            });
        }
        let database = database.into();
        if database.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database",
                reason: "must not be empty".into(),
            });
        }
        Ok(Self {
            check_duration,
            database,
        })
    }

    /// Creates a configuration from a whole number of seconds, as exposed by
    /// the configuration surface.
    pub fn from_secs(secs: u64, database: impl Into<String>) -> Result<Self, ConfigError> {
        if !(1..=MAX_CHECK_SECS).contains(&secs) {
            return Err(ConfigError::Invalid {
                key: "check_duration",
                reason: format!("{secs} is outside the valid range 1..={MAX_CHECK_SECS}"),
            });
        }
        Self::new(Duration::from_secs(secs), database)
    }

    /// Interval the worker sleeps between two cycles.
    #[inline]
    pub fn check_duration(&self) -> Duration {
        self.check_duration
    }

    /// Database the worker connects to.
    #[inline]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns a copy with a different interval.
    ///
    /// Zero is rejected the same way as in [`WorkerConfig::new`].
    pub fn with_check_duration(&self, check_duration: Duration) -> Result<Self, ConfigError> {
        Self::new(check_duration, self.database.clone())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            check_duration: DEFAULT_CHECK_DURATION,
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}
