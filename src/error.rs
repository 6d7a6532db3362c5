//! Error types used by the bgvisor host, its workers and the launch protocol.
//!
//! This module defines the error enums of the crate:
//!
//! - [`WorkerError`] why a worker instance ended abnormally (exit code 1).
//! - [`LaunchError`] the three classified failures of a dynamic launch.
//! - [`SessionError`] failures reported by a database session/transaction.
//! - [`ConfigError`] invalid or unreadable worker configuration.
//! - [`RuntimeError`] failures of the host runtime itself (shutdown grace).
//!
//! Every type provides `as_label` (stable snake_case, for logs/metrics) and
//! `as_message` (human-readable detail).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the host runtime.
///
/// These represent failures in the supervision layer itself,
/// such as a shutdown sequence exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some workers were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Worker instances that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use bgvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck workers={stuck:?}")
            }
        }
    }
}

/// # Errors reported by a database session.
///
/// Produced by [`Connector`](crate::Connector), [`Session`](crate::Session) and
/// [`Transaction`](crate::Transaction) implementations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Could not establish a session against the target database.
    #[error("could not connect to database \"{database}\": {error}")]
    Connect {
        /// Target database identity.
        database: String,
        /// Underlying error message.
        error: String,
    },

    /// Executing an operation failed inside the open transaction.
    #[error("execution failed: {error}")]
    Execute {
        /// Underlying error message.
        error: String,
    },

    /// Beginning or committing the transaction failed.
    #[error("transaction failed: {error}")]
    Transaction {
        /// Underlying error message.
        error: String,
    },
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::Connect { .. } => "session_connect",
            SessionError::Execute { .. } => "session_execute",
            SessionError::Transaction { .. } => "session_transaction",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced while loading worker configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its allowed range.
    #[error("invalid value for \"{key}\": {reason}")]
    Invalid {
        /// Configuration key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("could not read configuration file \"{path}\": {error}")]
    Read {
        /// File path.
        path: String,
        /// Underlying I/O error message.
        error: String,
    },

    /// The configuration file is not valid TOML or has unknown shapes.
    #[error("could not parse configuration: {error}")]
    Parse {
        /// Underlying parser message.
        error: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse { .. } => "config_parse",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Reasons a worker instance ended abnormally.
///
/// Returned from a worker entry point; the host maps any `Err` to exit code 1
/// and applies the registration's [`RestartPolicy`](crate::RestartPolicy).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Contract violation inside a cycle (malformed result, broken session).
    ///
    /// Never retried by the worker itself.
    #[error("fatal error in worker \"{worker}\": {detail}")]
    Fatal {
        /// Worker instance name.
        worker: String,
        /// Diagnostic detail.
        detail: String,
    },

    /// The session could not be established.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The configuration could not be loaded at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The supervising host went away while the worker was waiting.
    #[error("host is no longer available")]
    HostUnavailable,
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use bgvisor::WorkerError;
    ///
    /// let err = WorkerError::Fatal { worker: "count roles".into(), detail: "boom".into() };
    /// assert_eq!(err.as_label(), "worker_fatal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Fatal { .. } => "worker_fatal",
            WorkerError::Session(_) => "worker_session",
            WorkerError::Config(_) => "worker_config",
            WorkerError::HostUnavailable => "worker_host_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            WorkerError::Fatal { worker, detail } => format!("fatal: {worker}: {detail}"),
            WorkerError::Session(e) => e.as_message(),
            WorkerError::Config(e) => e.as_message(),
            WorkerError::HostUnavailable => "host unavailable".to_string(),
        }
    }
}

/// # Classified failures of a dynamic launch.
///
/// The three variants are mutually exclusive. None of them is retried by
/// the crate; whether to retry or escalate belongs to the caller.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The host refused the registration (no free slot, or not accepting).
    ///
    /// No handle exists; nothing was started.
    #[error("could not register background process \"{worker}\": {reason}")]
    RegistrationRejected {
        /// Requested worker name.
        worker: String,
        /// Why the host refused.
        reason: String,
    },

    /// The instance stopped before it ever started.
    #[error("could not start background process \"{worker}\": {reason}")]
    StartFailed {
        /// Requested worker name.
        worker: String,
        /// Why it did not start.
        reason: String,
    },

    /// The host itself became unavailable while waiting for the start.
    #[error("cannot start background process \"{worker}\" without host")]
    HostUnavailable {
        /// Requested worker name.
        worker: String,
    },
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use bgvisor::LaunchError;
    ///
    /// let err = LaunchError::HostUnavailable { worker: "count roles".into() };
    /// assert_eq!(err.as_label(), "launch_host_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::RegistrationRejected { .. } => "launch_registration_rejected",
            LaunchError::StartFailed { .. } => "launch_start_failed",
            LaunchError::HostUnavailable { .. } => "launch_host_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Operator hint accompanying the error.
    pub fn hint(&self) -> &'static str {
        match self {
            LaunchError::RegistrationRejected { .. } => {
                "Consider increasing the host's max_workers setting."
            }
            LaunchError::StartFailed { .. } => "More details may be available in the server log.",
            LaunchError::HostUnavailable { .. } => {
                "Stop all remaining worker instances and restart the host."
            }
        }
    }

    /// Launch failures are never retryable without operator intervention.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
