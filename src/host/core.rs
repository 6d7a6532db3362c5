//! # Host: registration table, running capacity and shutdown.
//!
//! The [`Host`] owns the event bus, a [`SubscriberSet`], the slot table of
//! registered workers, a semaphore bounding running instances and the two
//! liveness tokens every instance and launcher watches.
//!
//! ## Architecture
//! ```text
//! register(reg) / register_dynamic(reg)
//!     └─► admit: free slot? host not closing?
//!            ├─ no  → LaunchError::RegistrationRejected
//!            └─ yes → slot + Instance::run(core) on the TaskTracker
//!
//! Phases (watch channel):
//!   Init ──start_in_recovery()──► Started ──finish_recovery()──► RecoveryFinished
//!                                   └──────────── shutdown() ──► Stopping ──► Dead
//!   shutdown_immediate(): any phase ──► Dead
//!
//! Event flow:
//!   drivers, worker loops ── publish ──► Bus ──► listener ──► SubscriberSet::emit
//!
//! Shutdown path (fast):
//!   closing.cancel() → terminate every slot → wait_all_with_grace(cfg.grace)
//!       ├─ all joined  → AllStoppedWithin
//!       └─ timed out   → GraceExceeded (stuck list from ActivityTracker)
//!   dead.cancel() → HostDied
//! ```
//!
//! ## Tokens
//! - `closing` is cancelled when shutdown begins; launchers waiting on a
//!   pending start see the host as unavailable from then on.
//! - `dead` is cancelled when the host is gone; running worker loops exit at
//!   their next wait. `closing` is a child of `dead`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::{ConfigSource, HostConfig, StaticSource, WorkerConfig};
use crate::error::{LaunchError, RuntimeError, SessionError};
use crate::events::{Bus, Event, EventKind};
use crate::host::handle::{HandleStatus, InstanceShared};
use crate::host::instance::Instance;
use crate::host::{Pid, StartPolicy, WorkerHandle, WorkerRegistration};
use crate::subscribers::{ActivityTracker, Subscribe, SubscriberSet};
use crate::work::{Connector, Session};

/// First pid handed out by a host.
pub const FIRST_PID: u32 = 1000;

/// Lifecycle phase of a [`Host`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostPhase {
    /// Built, accepting static registrations.
    Init,
    /// Started; [`StartPolicy::HostStart`] workers may run.
    Started,
    /// Recovery finished; every worker may run.
    RecoveryFinished,
    /// Fast shutdown in progress.
    Stopping,
    /// Gone.
    Dead,
}

impl HostPhase {
    /// Returns `true` when workers with `policy` may start in this phase.
    pub fn allows(self, policy: StartPolicy) -> bool {
        match policy {
            StartPolicy::HostStart => {
                matches!(self, HostPhase::Started | HostPhase::RecoveryFinished)
            }
            StartPolicy::RecoveryFinished => self == HostPhase::RecoveryFinished,
        }
    }

    /// Returns `true` while shutting down or dead.
    pub fn is_closing(self) -> bool {
        matches!(self, HostPhase::Stopping | HostPhase::Dead)
    }
}

struct SlotEntry {
    name: Arc<str>,
    shared: Arc<InstanceShared>,
}

/// State shared by the host and every instance driver.
pub(crate) struct HostCore {
    pub(crate) cfg: HostConfig,
    pub(crate) bus: Bus,
    pub(crate) phase: watch::Sender<HostPhase>,
    pub(crate) closing: CancellationToken,
    pub(crate) dead: CancellationToken,
    pub(crate) running: Arc<Semaphore>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) config_source: Arc<dyn ConfigSource>,
    next_pid: AtomicU32,
    next_slot: AtomicU64,
    slots: Mutex<HashMap<u64, SlotEntry>>,
    tracker: TaskTracker,
}

impl HostCore {
    pub(crate) fn next_pid(&self) -> Pid {
        Pid::new(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Frees a slot once its driver finished.
    pub(crate) fn release(&self, slot: u64) {
        let removed = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&slot);
        if let Some(entry) = removed {
            self.bus
                .publish(Event::new(EventKind::WorkerUnregistered).with_worker(entry.name));
        }
    }

    fn for_each_slot(&self, f: impl Fn(&InstanceShared)) {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for entry in slots.values() {
            f(&entry.shared);
        }
    }
}

/// Connector used when the builder was given none.
struct NoConnector;

#[async_trait]
impl Connector for NoConnector {
    async fn connect(&self, database: &str) -> Result<Box<dyn Session>, SessionError> {
        Err(SessionError::Connect {
            database: database.to_string(),
            error: "no connector configured".into(),
        })
    }
}

/// Builder for a [`Host`].
pub struct HostBuilder {
    cfg: HostConfig,
    connector: Option<Arc<dyn Connector>>,
    config_source: Option<Arc<dyn ConfigSource>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl HostBuilder {
    pub fn new(cfg: HostConfig) -> Self {
        Self {
            cfg,
            connector: None,
            config_source: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets the connector every instance opens its session with.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the default configuration source (defaults to [`WorkerConfig::default`]).
    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Sets event subscribers. An [`ActivityTracker`] is always added.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the host. Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Host> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let activity = Arc::new(ActivityTracker::new());

        let mut subscribers = self.subscribers;
        subscribers.push(activity.clone());
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        subscriber_listener(&bus, Arc::clone(&subs));

        let dead = CancellationToken::new();
        let closing = dead.child_token();
        let (phase, _) = watch::channel(HostPhase::Init);

        let core = Arc::new(HostCore {
            running: Arc::new(Semaphore::new(self.cfg.max_running_clamped())),
            connector: self.connector.unwrap_or_else(|| Arc::new(NoConnector)),
            config_source: self
                .config_source
                .unwrap_or_else(|| Arc::new(StaticSource::new(WorkerConfig::default()))),
            cfg: self.cfg,
            bus,
            phase,
            closing,
            dead,
            next_pid: AtomicU32::new(FIRST_PID),
            next_slot: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
        });
        Arc::new(Host {
            core,
            subs,
            activity,
        })
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
fn subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber listener lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// In-process host supervising worker instances.
pub struct Host {
    core: Arc<HostCore>,
    subs: Arc<SubscriberSet>,
    activity: Arc<ActivityTracker>,
}

impl Host {
    pub fn builder(cfg: HostConfig) -> HostBuilder {
        HostBuilder::new(cfg)
    }

    pub fn config(&self) -> &HostConfig {
        &self.core.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.core.bus
    }

    pub fn phase(&self) -> HostPhase {
        *self.core.phase.borrow()
    }

    /// Returns `false` once the host is dead.
    pub fn is_alive(&self) -> bool {
        !self.core.dead.is_cancelled()
    }

    /// Activity table of running instances.
    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    /// Number of subscribers, the built-in activity tracker included.
    pub fn subscriber_count(&self) -> usize {
        self.subs.len()
    }

    /// Names of the occupied slots, sorted.
    pub fn registered(&self) -> Vec<String> {
        let slots = self.core.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = slots.values().map(|e| e.name.to_string()).collect();
        names.sort_unstable();
        names
    }

    /// Registers a statically started worker. Only possible before the host starts.
    pub fn register(&self, reg: WorkerRegistration) -> Result<(), LaunchError> {
        if self.phase() != HostPhase::Init {
            return Err(self.reject(&reg, "static registration is only possible before the host starts"));
        }
        self.admit(reg).map(|_| ())
    }

    /// Registers a worker on demand and returns its handle.
    ///
    /// Rejected when every slot is taken or the host is shutting down.
    pub fn register_dynamic(&self, reg: WorkerRegistration) -> Result<WorkerHandle, LaunchError> {
        let name = reg.name_arc();
        let (status, shared) = self.admit(reg)?;
        Ok(WorkerHandle::new(name, status, shared, self.core.closing.clone()))
    }

    fn admit(
        &self,
        reg: WorkerRegistration,
    ) -> Result<(watch::Receiver<HandleStatus>, Arc<InstanceShared>), LaunchError> {
        let core = &self.core;
        let (status_tx, status_rx) = watch::channel(HandleStatus::NotYetStarted);
        let shared = Arc::new(InstanceShared::default());
        let slot = core.next_slot.fetch_add(1, Ordering::Relaxed);
        {
            let mut slots = core.slots.lock().unwrap_or_else(|e| e.into_inner());
            if core.is_closing() {
                drop(slots);
                return Err(self.reject(&reg, "host is shutting down"));
            }
            if slots.len() >= core.cfg.max_workers {
                drop(slots);
                return Err(self.reject(&reg, "no free worker slot"));
            }
            slots.insert(
                slot,
                SlotEntry {
                    name: reg.name_arc(),
                    shared: Arc::clone(&shared),
                },
            );
        }
        core.bus
            .publish(Event::new(EventKind::WorkerRegistered).with_worker(reg.name_arc()));

        let instance = Instance {
            slot,
            reg,
            shared: Arc::clone(&shared),
            status: status_tx,
        };
        core.tracker.spawn(instance.run(Arc::clone(core)));
        Ok((status_rx, shared))
    }

    fn reject(&self, reg: &WorkerRegistration, reason: &str) -> LaunchError {
        self.core.bus.publish(
            Event::new(EventKind::RegistrationRejected)
                .with_worker(reg.name_arc())
                .with_reason(reason),
        );
        LaunchError::RegistrationRejected {
            worker: reg.name().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Starts the host and finishes recovery at once.
    pub fn start(&self) {
        self.start_in_recovery();
        self.finish_recovery();
    }

    /// Starts the host; only [`StartPolicy::HostStart`] workers may run yet.
    pub fn start_in_recovery(&self) {
        let moved = self.core.phase.send_if_modified(|p| {
            if *p == HostPhase::Init {
                *p = HostPhase::Started;
                true
            } else {
                false
            }
        });
        if moved {
            info!("host started");
            self.core.bus.publish(Event::new(EventKind::HostStarted));
        }
    }

    /// Lets [`StartPolicy::RecoveryFinished`] workers run.
    pub fn finish_recovery(&self) {
        self.core.phase.send_if_modified(|p| {
            if *p == HostPhase::Started {
                *p = HostPhase::RecoveryFinished;
                true
            } else {
                false
            }
        });
    }

    /// Forwards a configuration reload to every running instance.
    pub fn reload(&self) {
        self.core.bus.publish(Event::new(EventKind::ReloadRequested));
        self.core.for_each_slot(InstanceShared::reload);
    }

    /// Fast shutdown: terminate every instance, wait up to `grace`, then die.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] when instances were still
    /// running after the grace period; the host is dead either way.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let core = &self.core;
        let first = core.phase.send_if_modified(|p| {
            if p.is_closing() {
                false
            } else {
                *p = HostPhase::Stopping;
                true
            }
        });
        if !first {
            return Ok(());
        }

        core.closing.cancel();
        core.bus.publish(Event::new(EventKind::ShutdownRequested));
        core.for_each_slot(InstanceShared::terminate);

        let res = self.wait_all_with_grace().await;
        self.die();
        res
    }

    /// Immediate shutdown: the host is gone at once.
    ///
    /// Running instances notice at their next wait; pending launchers see
    /// the host as unavailable.
    pub fn shutdown_immediate(&self) {
        self.die();
    }

    fn die(&self) {
        let core = &self.core;
        let changed = core.phase.send_if_modified(|p| {
            if *p == HostPhase::Dead {
                false
            } else {
                *p = HostPhase::Dead;
                true
            }
        });
        core.dead.cancel();
        if changed {
            warn!("host died");
            core.bus.publish(Event::new(EventKind::HostDied));
        }
    }

    async fn wait_all_with_grace(&self) -> Result<(), RuntimeError> {
        let core = &self.core;
        let grace = core.cfg.grace;
        core.tracker.close();

        match tokio::time::timeout(grace, core.tracker.wait()).await {
            Ok(()) => {
                core.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let mut stuck = self.activity.running();
                if stuck.is_empty() {
                    stuck = self.registered();
                }
                core.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}
