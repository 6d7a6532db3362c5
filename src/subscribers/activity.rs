//! # ActivityTracker – externally visible status of every running instance.
//!
//! Maintains a table of running instances and what each of them is doing,
//! fed by the status events the worker loops publish. It is the crate's
//! equivalent of an activity view: one row per instance, `starting`, `running:
//! <operation>` or `idle`.
//!
//! ## Internal scheme
//! ```text
//! on_event(ev):
//!   ├─ WorkerStarted   → insert (worker, pid) = Starting
//!   ├─ ActivityRunning → (worker, pid) = Running(activity)
//!   ├─ ActivityIdle    → (worker, pid) = Idle
//!   ├─ WorkerExited    → remove (worker, pid)
//!   └─ otherwise: ignore
//! ```
//!
//! ## Rules
//! - Events with `seq <= last_seq` for the same instance are **rejected** (stale).
//! - Reads are **eventually consistent**: events reach the tracker through its queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::events::{Event, EventKind};
use crate::host::Pid;
use crate::subscribers::Subscribe;

/// What an instance is currently doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    /// Started, no status reported yet.
    Starting,
    /// Executing the described operation.
    Running(String),
    /// Waiting for the next wake.
    Idle,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Starting => f.write_str("starting"),
            Activity::Running(what) => write!(f, "running: {what}"),
            Activity::Idle => f.write_str("idle"),
        }
    }
}

/// One row of the activity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRow {
    /// Worker name.
    pub worker: String,
    /// Instance pid.
    pub pid: Pid,
    /// Current activity.
    pub activity: Activity,
}

#[derive(Debug)]
struct Entry {
    last_seq: u64,
    activity: Activity,
}

/// Tracks the activity of running instances.
pub struct ActivityTracker {
    inner: RwLock<HashMap<(String, Pid), Entry>>,
    capacity: usize,
}

impl ActivityTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            capacity: 2048,
        }
    }

    /// Configure the queue capacity for this subscriber.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Returns the table sorted by pid.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActivityRow> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<ActivityRow> = g
            .iter()
            .map(|((worker, pid), e)| ActivityRow {
                worker: worker.clone(),
                pid: *pid,
                activity: e.activity.clone(),
            })
            .collect();
        rows.sort_unstable_by_key(|r| r.pid);
        rows
    }

    /// Returns `"<worker>[<pid>]"` for every tracked instance.
    #[must_use]
    pub fn running(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .map(|r| format!("{}[{}]", r.worker, r.pid))
            .collect()
    }

    /// Returns the activity of one instance, if tracked.
    #[must_use]
    pub fn activity_of(&self, pid: Pid) -> Option<Activity> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        g.iter()
            .find(|((_, p), _)| *p == pid)
            .map(|(_, e)| e.activity.clone())
    }

    fn update(&self, ev: &Event, activity: Option<Activity>) {
        let (Some(worker), Some(pid)) = (ev.worker.as_deref(), ev.pid) else {
            return;
        };
        let key = (worker.to_owned(), pid);
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if let Some(prev) = g.get(&key) {
            if ev.seq <= prev.last_seq {
                debug!(worker, %pid, seq = ev.seq, "stale activity event ignored");
                return;
            }
        }
        match activity {
            Some(activity) => {
                g.insert(
                    key,
                    Entry {
                        last_seq: ev.seq,
                        activity,
                    },
                );
            }
            None => {
                g.remove(&key);
            }
        }
    }
}

#[async_trait]
impl Subscribe for ActivityTracker {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::WorkerStarted => self.update(ev, Some(Activity::Starting)),
            EventKind::ActivityRunning => {
                let what = ev.activity.as_deref().unwrap_or_default().to_string();
                self.update(ev, Some(Activity::Running(what)));
            }
            EventKind::ActivityIdle => self.update(ev, Some(Activity::Idle)),
            EventKind::WorkerExited => self.update(ev, None),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "ActivityTracker"
    }

    fn queue_capacity(&self) -> usize {
        self.capacity
    }

    fn wants(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::WorkerStarted
                | EventKind::ActivityRunning
                | EventKind::ActivityIdle
                | EventKind::WorkerExited
        )
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind, pid: u32) -> Event {
        Event::new(kind).with_worker("count roles").with_pid(Pid::new(pid))
    }

    #[tokio::test]
    async fn follows_instance_lifecycle() {
        let t = ActivityTracker::new();
        t.on_event(&ev(EventKind::WorkerStarted, 1000)).await;
        assert_eq!(t.activity_of(Pid::new(1000)), Some(Activity::Starting));

        t.on_event(&ev(EventKind::ActivityRunning, 1000).with_activity("SELECT 1;"))
            .await;
        assert_eq!(
            t.activity_of(Pid::new(1000)),
            Some(Activity::Running("SELECT 1;".into()))
        );

        t.on_event(&ev(EventKind::ActivityIdle, 1000)).await;
        assert_eq!(t.snapshot()[0].activity.to_string(), "idle");
        assert_eq!(t.running(), vec!["count roles[1000]".to_string()]);

        t.on_event(&ev(EventKind::WorkerExited, 1000)).await;
        assert!(t.snapshot().is_empty());
    }

    #[tokio::test]
    async fn stale_events_are_rejected() {
        let t = ActivityTracker::new();
        let old = ev(EventKind::ActivityRunning, 7).with_activity("old");
        let new = ev(EventKind::ActivityIdle, 7);
        t.on_event(&new).await;
        t.on_event(&old).await;
        assert_eq!(t.activity_of(Pid::new(7)), Some(Activity::Idle));
    }
}
