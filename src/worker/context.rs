//! # Worker context.
//!
//! [`WorkerContext`] is everything one worker instance receives from whoever
//! started it: its identity, the immutable [`WorkerConfig`] it was started
//! with, the [`ConfigSource`] to re-read on reload, its own [`ControlState`],
//! the event [`Bus`], the host liveness token and the [`Connector`].
//!
//! The host builds one per instance start. Standalone callers and tests build
//! one with [`WorkerContext::new`] and replace parts with the `with_*` methods.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{ConfigSource, StaticSource, WorkerConfig};
use crate::control::ControlState;
use crate::error::{ConfigError, SessionError};
use crate::events::{Bus, Event, EventKind};
use crate::host::Pid;
use crate::work::{Connector, Session};

/// Name and pid of one worker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    name: Arc<str>,
    pid: Option<Pid>,
}

impl WorkerIdentity {
    pub fn new(name: impl Into<Arc<str>>, pid: Option<Pid>) -> Self {
        Self {
            name: name.into(),
            pid,
        }
    }

    /// Worker name, e.g. `"count roles"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pid assigned by the host; `None` when running standalone.
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

/// Per-instance runtime context handed to a worker entry point.
#[derive(Clone)]
pub struct WorkerContext {
    identity: WorkerIdentity,
    config: WorkerConfig,
    source: Arc<dyn ConfigSource>,
    control: Arc<ControlState>,
    bus: Bus,
    host: CancellationToken,
    connector: Arc<dyn Connector>,
}

impl WorkerContext {
    /// Creates a standalone context: static config source, fresh control
    /// state, private bus, host token that is never cancelled.
    pub fn new(name: impl Into<Arc<str>>, config: WorkerConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            identity: WorkerIdentity::new(name, None),
            source: Arc::new(StaticSource::new(config.clone())),
            config,
            control: Arc::new(ControlState::new()),
            bus: Bus::default(),
            host: CancellationToken::new(),
            connector,
        }
    }

    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.identity.pid = Some(pid);
        self
    }

    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_control(mut self, control: Arc<ControlState>) -> Self {
        self.control = control;
        self
    }

    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Sets the token whose cancellation means the host is gone.
    pub fn with_host_token(mut self, host: CancellationToken) -> Self {
        self.host = host;
        self
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Configuration the instance was started with.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn control(&self) -> &Arc<ControlState> {
        &self.control
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn host_token(&self) -> &CancellationToken {
        &self.host
    }

    /// Returns `true` once the host is gone.
    pub fn host_gone(&self) -> bool {
        self.host.is_cancelled()
    }

    /// Opens the instance's session against the configured database.
    pub async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        self.connector.connect(self.config.database()).await
    }

    /// Re-reads the configuration source.
    pub fn reload_config(&self) -> Result<WorkerConfig, ConfigError> {
        self.source.load()
    }

    /// Creates an event pre-filled with this instance's name and pid.
    pub fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_worker(self.identity.name_arc())
            .with_pid_opt(self.identity.pid)
    }

    /// Reports that the instance is executing `activity`.
    pub fn report_running(&self, activity: &str) {
        self.bus
            .publish(self.event(EventKind::ActivityRunning).with_activity(activity));
    }

    /// Reports that the instance is idle.
    pub fn report_idle(&self) {
        self.bus.publish(self.event(EventKind::ActivityIdle));
    }
}
