//! # Instance driver: runs one registration under the host.
//!
//! One driver task per occupied slot. It starts the worker, reports its
//! status to the notify target and applies the restart policy.
//!
//! ## Flow
//! ```text
//! loop {
//!   ├─► wait for the start phase      (terminate / host closing → not started)
//!   ├─► load WorkerConfig             (error → stopped before start)
//!   ├─► try to take a running permit  (none → stopped before start)
//!   ├─► allocate pid, Started(pid), publish WorkerStarted
//!   ├─► entry.spawn(ctx) with panic isolation
//!   ├─► publish WorkerExited{exit_code}
//!   └─► RestartPolicy::restart_delay(exit_code)
//!         ├─► None       → Stopped, break
//!         └─► Some(d)    → publish RestartScheduled, sleep(d), continue
//! }
//! release slot → WorkerUnregistered
//! ```
//!
//! ## Rules
//! - A start aborted because the host is closing never reports `Stopped`;
//!   the launcher observes the host going away instead.
//! - Each run gets a fresh [`ControlState`]; a terminate is one-way per run
//!   and cancels every later restart.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tracing::{debug, warn};

use crate::config::{ConfigSource, WorkerConfig};
use crate::control::ControlState;
use crate::error::WorkerError;
use crate::events::{Event, EventKind};
use crate::host::core::HostCore;
use crate::host::handle::{HandleStatus, InstanceShared};
use crate::host::WorkerRegistration;
use crate::subscribers::panic_message;
use crate::worker::WorkerContext;

/// Why an instance did not start.
enum NotStarted {
    /// Terminated through its handle before it started.
    Terminated,
    /// The host is shutting down or dead.
    HostClosing,
    /// Configuration could not be loaded.
    Config(String),
    /// No free running capacity.
    NoCapacity,
}

impl NotStarted {
    fn reason(&self) -> String {
        match self {
            NotStarted::Terminated => "terminated before start".into(),
            NotStarted::HostClosing => "host is shutting down".into(),
            NotStarted::Config(e) => format!("invalid configuration: {e}"),
            NotStarted::NoCapacity => "no free running capacity".into(),
        }
    }
}

/// Everything a driver owns for its slot.
pub(crate) struct Instance {
    pub(crate) slot: u64,
    pub(crate) reg: WorkerRegistration,
    pub(crate) shared: Arc<InstanceShared>,
    pub(crate) status: watch::Sender<HandleStatus>,
}

impl Instance {
    /// Drives the instance until it is done, then releases its slot.
    pub(crate) async fn run(self, core: Arc<HostCore>) {
        let name = self.reg.name_arc();

        loop {
            let (permit, config) = match self.prepare(&core).await {
                Ok(ready) => ready,
                Err(why) => {
                    core.bus.publish(
                        Event::new(EventKind::WorkerStartFailed)
                            .with_worker(Arc::clone(&name))
                            .with_reason(why.reason()),
                    );
                    if !matches!(why, NotStarted::HostClosing) {
                        self.status.send_replace(HandleStatus::Stopped);
                    }
                    break;
                }
            };

            let exit_code = self.run_once(&core, permit, config).await;

            let delay = self.reg.restart_policy().restart_delay(exit_code);
            let Some(delay) = delay.filter(|_| !self.shared.is_terminated() && !core.is_closing())
            else {
                self.status.send_replace(HandleStatus::Stopped);
                break;
            };

            self.status.send_replace(HandleStatus::NotYetStarted);
            core.bus.publish(
                Event::new(EventKind::RestartScheduled)
                    .with_worker(Arc::clone(&name))
                    .with_delay(delay),
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shared.cancel_token().cancelled() => {}
                _ = core.closing.cancelled() => {}
            }
        }

        core.release(self.slot);
    }

    /// Waits for the start phase and acquires what a run needs.
    async fn prepare(
        &self,
        core: &HostCore,
    ) -> Result<(OwnedSemaphorePermit, WorkerConfig), NotStarted> {
        let policy = self.reg.start_policy();
        let mut phase = core.phase.subscribe();

        let reached = tokio::select! {
            biased;
            _ = self.shared.cancel_token().cancelled() => return Err(NotStarted::Terminated),
            _ = core.closing.cancelled() => return Err(NotStarted::HostClosing),
            ok = async {
                phase
                    .wait_for(|p| p.allows(policy) || p.is_closing())
                    .await
                    .map(|p| !p.is_closing())
                    .unwrap_or(false)
            } => ok,
        };
        if !reached {
            return Err(NotStarted::HostClosing);
        }
        if self.shared.is_terminated() {
            return Err(NotStarted::Terminated);
        }

        let config = self
            .config_source(core)
            .load()
            .map_err(|e| NotStarted::Config(e.as_message()))?;

        let permit = Arc::clone(&core.running)
            .try_acquire_owned()
            .map_err(|_| NotStarted::NoCapacity)?;
        Ok((permit, config))
    }

    fn config_source(&self, core: &HostCore) -> Arc<dyn ConfigSource> {
        self.reg
            .config_source()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&core.config_source))
    }

    /// Runs the entry point once and returns its exit code.
    async fn run_once(
        &self,
        core: &Arc<HostCore>,
        permit: OwnedSemaphorePermit,
        config: WorkerConfig,
    ) -> i32 {
        let name = self.reg.name_arc();
        let pid = core.next_pid();
        let control = Arc::new(ControlState::new());
        self.shared.attach(Arc::clone(&control));

        let ctx = WorkerContext::new(Arc::clone(&name), config, Arc::clone(&core.connector))
            .with_pid(pid)
            .with_config_source(self.config_source(core))
            .with_control(control)
            .with_bus(core.bus.clone())
            .with_host_token(core.dead.clone());

        self.status.send_replace(HandleStatus::Started(pid));
        core.bus.publish(
            Event::new(EventKind::WorkerStarted)
                .with_worker(Arc::clone(&name))
                .with_pid(pid),
        );
        debug!(worker = %name, %pid, entry = self.reg.entry().name(), "instance started");

        let fut = self.reg.entry().spawn(ctx);
        let res = std::panic::AssertUnwindSafe(fut).catch_unwind().await;
        self.shared.detach();
        drop(permit);

        let exited = Event::new(EventKind::WorkerExited)
            .with_worker(Arc::clone(&name))
            .with_pid(pid);
        let (code, exited) = match res {
            Ok(Ok(())) => (0, exited.with_exit_code(0)),
            Ok(Err(e)) => {
                if !matches!(e, WorkerError::HostUnavailable) {
                    warn!(worker = %name, %pid, label = e.as_label(), "instance crashed");
                }
                (1, exited.with_exit_code(1).with_reason(e.as_message()))
            }
            Err(panic) => {
                let info = panic_message(panic.as_ref());
                (1, exited.with_exit_code(1).with_reason(format!("panic: {info}")))
            }
        };
        core.bus.publish(exited);
        code
    }
}
