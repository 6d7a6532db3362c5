//! # Worker registrations and their policies.
//!
//! A [`WorkerRegistration`] declares a worker to the host: its name, its entry
//! point, when it may start ([`StartPolicy`]) and what happens after it
//! crashed ([`RestartPolicy`]).
//!
//! ```text
//! StartPolicy::HostStart          → start as soon as the host is up
//! StartPolicy::RecoveryFinished   → start once the host finished recovery (default)
//!
//! RestartPolicy::Never            → one run, slot freed on exit (default)
//! RestartPolicy::After(delay)     → crashed (exit code 1) instances start again after `delay`
//! ```
//!
//! A clean exit (exit code 0) or an explicit terminate always frees the slot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigSource;
use crate::worker::EntryRef;

/// Host phase a worker waits for before it starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartPolicy {
    /// As soon as the host has started.
    HostStart,
    /// Once the host has finished recovery (default).
    #[default]
    RecoveryFinished,
}

/// Policy applied when an instance crashed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart (default).
    #[default]
    Never,
    /// Restart a crashed instance after the given delay.
    After(Duration),
}

impl RestartPolicy {
    /// Delay before the next start, if an instance that exited with
    /// `exit_code` must be started again.
    pub fn restart_delay(&self, exit_code: i32) -> Option<Duration> {
        match self {
            RestartPolicy::After(delay) if exit_code != 0 => Some(*delay),
            _ => None,
        }
    }
}

/// Declaration of a worker to the host.
#[derive(Clone)]
pub struct WorkerRegistration {
    name: Arc<str>,
    entry: EntryRef,
    start: StartPolicy,
    restart: RestartPolicy,
    config_source: Option<Arc<dyn ConfigSource>>,
}

impl WorkerRegistration {
    /// Creates a registration with the default policies.
    pub fn new(name: impl Into<Arc<str>>, entry: EntryRef) -> Self {
        Self {
            name: name.into(),
            entry,
            start: StartPolicy::default(),
            restart: RestartPolicy::default(),
            config_source: None,
        }
    }

    pub fn with_start(mut self, start: StartPolicy) -> Self {
        self.start = start;
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Overrides the host's configuration source for this worker.
    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn entry(&self) -> &EntryRef {
        &self.entry
    }

    pub fn start_policy(&self) -> StartPolicy {
        self.start
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart
    }

    pub fn config_source(&self) -> Option<&Arc<dyn ConfigSource>> {
        self.config_source.as_ref()
    }
}

impl fmt::Debug for WorkerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistration")
            .field("name", &self.name)
            .field("entry", &self.entry.name())
            .field("start", &self.start)
            .field("restart", &self.restart)
            .finish()
    }
}
