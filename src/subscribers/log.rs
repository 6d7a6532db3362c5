//! # LogWriter: events to `tracing`
//!
//! A subscriber that turns runtime events into structured `tracing` records.
//! Cycle values are logged by the worker loop itself; this writer covers the
//! host and instance lifecycle.
//!
//! ## Example output
//! ```text
//! INFO  worker registered worker="count roles"
//! INFO  worker started worker="count roles" pid=1000
//! WARN  worker could not start worker="count roles" reason="no free running capacity"
//! ERROR worker exited worker="count roles" pid=1000 exit_code=1 reason="fatal: ..."
//! INFO  restart scheduled worker="count roles" delay_ms=5000
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let pid = e.pid.map(|p| p.get());

        match e.kind {
            EventKind::HostStarted => info!("host started"),
            EventKind::ReloadRequested => info!("reload requested"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all workers stopped within grace"),
            EventKind::GraceExceeded => warn!(stuck = reason, "shutdown grace exceeded"),
            EventKind::HostDied => warn!("host died"),
            EventKind::WorkerRegistered => info!(worker, "worker registered"),
            EventKind::RegistrationRejected => {
                warn!(worker, reason, "worker registration rejected")
            }
            EventKind::WorkerStartFailed => warn!(worker, reason, "worker could not start"),
            EventKind::WorkerStarted => info!(worker, pid, "worker started"),
            EventKind::WorkerExited => match e.exit_code {
                Some(0) => info!(worker, pid, exit_code = 0, "worker exited"),
                code => error!(worker, pid, exit_code = code, reason, "worker exited"),
            },
            EventKind::RestartScheduled => {
                info!(worker, delay_ms = e.delay_ms, "restart scheduled")
            }
            EventKind::WorkerUnregistered => debug!(worker, "worker unregistered"),
            EventKind::ActivityRunning => {
                debug!(worker, pid, activity = e.activity.as_deref(), "running")
            }
            EventKind::ActivityIdle => debug!(worker, pid, "idle"),
            EventKind::CycleCompleted | EventKind::CycleEmpty => {}
            EventKind::ConfigReloaded => {
                info!(worker, pid, check_ms = e.delay_ms, "configuration reloaded")
            }
            EventKind::WorkerFatal => error!(worker, pid, reason, "worker hit a fatal error"),
            EventKind::WorkerStopped => info!(worker, pid, stats = ?e.stats, "worker stopped"),
            EventKind::SubscriberOverflow => warn!(subscriber = worker, reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => {
                error!(subscriber = worker, info = reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }

    fn wants(&self, kind: EventKind) -> bool {
        !matches!(kind, EventKind::CycleCompleted | EventKind::CycleEmpty)
    }
}
