//! # Runtime events emitted by the host, worker instances and worker loops.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Host events**: start, reload, shutdown and grace outcome
//! - **Instance events**: registration, start, start failure, exit, restart
//! - **Cycle events**: activity changes and per-cycle results of a worker loop
//! - **Subscriber events**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, worker
//! name, pid, scalar value and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use bgvisor::{Event, EventKind, Pid};
//!
//! let ev = Event::new(EventKind::WorkerStarted)
//!     .with_worker("count roles")
//!     .with_pid(Pid::new(1000));
//!
//! assert_eq!(ev.kind, EventKind::WorkerStarted);
//! assert_eq!(ev.worker.as_deref(), Some("count roles"));
//! assert_eq!(ev.pid, Some(Pid::new(1000)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::host::Pid;
use crate::work::Value;
use crate::worker::WorkerStats;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Host events ===
    /// Host reached the phase where registered workers may start.
    HostStarted,

    /// Reload forwarded to every running instance.
    ReloadRequested,

    /// Fast shutdown requested.
    ShutdownRequested,

    /// All instances stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some instances did not stop in time.
    ///
    /// Sets:
    /// - `reason`: stuck instances
    GraceExceeded,

    /// Host is gone; no further start is possible.
    HostDied,

    // === Instance events ===
    /// Registration accepted into a slot.
    ///
    /// Sets:
    /// - `worker`: worker name
    WorkerRegistered,

    /// Registration refused.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `reason`: why
    RegistrationRejected,

    /// Instance stopped before it could start.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `reason`: why
    WorkerStartFailed,

    /// Instance started.
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `pid`: allocated process identifier
    WorkerStarted,

    /// Instance exited.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `exit_code`: `0` after a clean termination, `1` otherwise
    /// - `reason`: error message for non-zero exits
    WorkerExited,

    /// Crashed instance will be started again.
    ///
    /// Sets:
    /// - `worker`
    /// - `delay_ms`: restart delay
    RestartScheduled,

    /// Slot released; the registration is gone.
    ///
    /// Sets:
    /// - `worker`
    WorkerUnregistered,

    // === Cycle events ===
    /// Instance reports that it is executing an operation.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `activity`: operation description
    ActivityRunning,

    /// Instance reports that it is idle.
    ///
    /// Sets:
    /// - `worker`, `pid`
    ActivityIdle,

    /// A cycle produced a scalar.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `value`: the scalar
    CycleCompleted,

    /// A cycle produced no rows (or a NULL scalar).
    ///
    /// Sets:
    /// - `worker`, `pid`
    CycleEmpty,

    /// The loop re-read its configuration.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `delay_ms`: new interval
    ConfigReloaded,

    /// The loop hit a contract violation and is about to exit.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `reason`: diagnostic
    WorkerFatal,

    /// The loop terminated on request.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `stats`: final statistics
    WorkerStopped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the worker (or subscriber), if applicable.
    pub worker: Option<Arc<str>>,
    /// Instance process identifier.
    pub pid: Option<Pid>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Description of the running operation.
    pub activity: Option<Arc<str>>,
    /// Scalar produced by a cycle.
    pub value: Option<Value>,
    /// Delay or interval in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Instance exit code.
    pub exit_code: Option<i32>,
    /// Final loop statistics.
    pub stats: Option<WorkerStats>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            pid: None,
            reason: None,
            activity: None,
            value: None,
            delay_ms: None,
            exit_code: None,
            stats: None,
        }
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a pid.
    #[inline]
    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an optional pid.
    #[inline]
    pub fn with_pid_opt(mut self, pid: Option<Pid>) -> Self {
        self.pid = pid;
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an activity description.
    #[inline]
    pub fn with_activity(mut self, activity: impl Into<Arc<str>>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    /// Attaches a cycle scalar.
    #[inline]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches final statistics.
    #[inline]
    pub fn with_stats(mut self, stats: WorkerStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_worker(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_worker(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::HostStarted);
        let b = Event::new(EventKind::HostStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_is_clamped_to_u32() {
        let ev = Event::new(EventKind::RestartScheduled).with_delay(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
