//! # Handles to registered instances.
//!
//! [`WorkerHandle`] is what a dynamic registration returns. It holds the
//! receiving end of the instance's status channel, the notify target the
//! instance driver reports to, so the launcher can block until the instance
//! started, stopped, or the host went away.
//!
//! ```text
//! driver:  NotYetStarted ──► Started(pid) ──► Stopped
//!                 └───────────────────────────► Stopped      (no capacity, terminated)
//!                 └── sender dropped while host closing ──► HostUnavailable
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::control::ControlState;
use crate::launch::LaunchOutcome;

/// Process identifier assigned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u32);

impl Pid {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a registered instance as seen through its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleStatus {
    /// Registered, not started (or waiting for a restart).
    NotYetStarted,
    /// Running with the given pid.
    Started(Pid),
    /// Finished, or stopped before it ever started.
    Stopped,
}

/// State shared between an instance driver and its handles.
#[derive(Debug, Default)]
pub(crate) struct InstanceShared {
    cancel: CancellationToken,
    control: Mutex<Option<Arc<ControlState>>>,
}

impl InstanceShared {
    /// Cancels a pending start and terminates a running instance.
    pub(crate) fn terminate(&self) {
        self.cancel.cancel();
        if let Some(control) = self.control.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            control.on_terminate();
        }
    }

    /// Forwards a reload to the running instance, if any.
    pub(crate) fn reload(&self) {
        if let Some(control) = self.control.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            control.on_reload();
        }
    }

    /// Installs the control state of a starting run.
    ///
    /// A terminate that raced with the start is delivered to the new state.
    pub(crate) fn attach(&self, control: Arc<ControlState>) {
        let mut slot = self.control.lock().unwrap_or_else(|e| e.into_inner());
        if self.cancel.is_cancelled() {
            control.on_terminate();
        }
        *slot = Some(control);
    }

    pub(crate) fn detach(&self) {
        self.control.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Handle to a dynamically registered instance.
pub struct WorkerHandle {
    name: Arc<str>,
    status: watch::Receiver<HandleStatus>,
    shared: Arc<InstanceShared>,
    host_gone: CancellationToken,
}

impl WorkerHandle {
    pub(crate) fn new(
        name: Arc<str>,
        status: watch::Receiver<HandleStatus>,
        shared: Arc<InstanceShared>,
        host_gone: CancellationToken,
    ) -> Self {
        Self {
            name,
            status,
            shared,
            host_gone,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status without waiting.
    pub fn status(&self) -> HandleStatus {
        *self.status.borrow()
    }

    /// Cancels a pending start, or asks a running instance to terminate.
    ///
    /// A terminated instance is never restarted.
    pub fn terminate(&self) {
        self.shared.terminate();
    }

    /// Blocks until the instance started, stopped, or the host went away.
    ///
    /// If nothing happens within `timeout` the pending instance is terminated
    /// and [`LaunchOutcome::Stopped`] is returned.
    pub async fn wait_for_startup(&mut self, timeout: Duration) -> LaunchOutcome {
        // A timeout past the clock's range means no deadline.
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            match *self.status.borrow_and_update() {
                HandleStatus::Started(pid) => return LaunchOutcome::Started(pid),
                HandleStatus::Stopped => return LaunchOutcome::Stopped,
                HandleStatus::NotYetStarted => {}
            }
            tokio::select! {
                biased;
                _ = self.host_gone.cancelled() => return LaunchOutcome::HostUnavailable,
                changed = self.status.changed() => {
                    if changed.is_err() {
                        return self.final_outcome();
                    }
                }
                _ = sleep_until_opt(deadline) => {
                    self.terminate();
                    return LaunchOutcome::Stopped;
                }
            }
        }
    }

    /// Blocks until the instance stopped or the host went away.
    pub async fn wait_for_shutdown(&mut self) -> LaunchOutcome {
        loop {
            if *self.status.borrow_and_update() == HandleStatus::Stopped {
                return LaunchOutcome::Stopped;
            }
            tokio::select! {
                biased;
                _ = self.host_gone.cancelled() => return LaunchOutcome::HostUnavailable,
                changed = self.status.changed() => {
                    if changed.is_err() {
                        return self.final_outcome();
                    }
                }
            }
        }
    }

    /// Outcome once the driver dropped the status channel.
    fn final_outcome(&self) -> LaunchOutcome {
        match *self.status.borrow() {
            HandleStatus::Started(pid) => LaunchOutcome::Started(pid),
            HandleStatus::Stopped => LaunchOutcome::Stopped,
            HandleStatus::NotYetStarted if self.host_gone.is_cancelled() => {
                LaunchOutcome::HostUnavailable
            }
            HandleStatus::NotYetStarted => LaunchOutcome::Stopped,
        }
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (watch::Sender<HandleStatus>, WorkerHandle, CancellationToken) {
        let (tx, rx) = watch::channel(HandleStatus::NotYetStarted);
        let gone = CancellationToken::new();
        let h = WorkerHandle::new(
            Arc::from("count roles"),
            rx,
            Arc::new(InstanceShared::default()),
            gone.clone(),
        );
        (tx, h, gone)
    }

    #[tokio::test(start_paused = true)]
    async fn started_status_yields_pid() {
        let (tx, mut h, _gone) = handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send_replace(HandleStatus::Started(Pid::new(1000)));
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let out = h.wait_for_startup(Duration::from_secs(5)).await;
        assert_eq!(out, LaunchOutcome::Started(Pid::new(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_does_not_overflow() {
        let (tx, mut h, _gone) = handle();
        tx.send_replace(HandleStatus::Started(Pid::new(1000)));
        assert_eq!(
            h.wait_for_startup(Duration::MAX).await,
            LaunchOutcome::Started(Pid::new(1000))
        );

        let (tx, mut h, _gone) = handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            tx.send_replace(HandleStatus::Stopped);
        });
        assert_eq!(h.wait_for_startup(Duration::MAX).await, LaunchOutcome::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_before_start_is_reported() {
        let (tx, mut h, _gone) = handle();
        tx.send_replace(HandleStatus::Stopped);
        assert_eq!(h.wait_for_startup(Duration::from_secs(5)).await, LaunchOutcome::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn host_death_wins_over_pending_start() {
        let (_tx, mut h, gone) = handle();
        gone.cancel();
        assert_eq!(
            h.wait_for_startup(Duration::from_secs(5)).await,
            LaunchOutcome::HostUnavailable
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_terminates_pending_instance() {
        let (_tx, mut h, _gone) = handle();
        let started = tokio::time::Instant::now();
        let out = h.wait_for_startup(Duration::from_secs(2)).await;
        assert_eq!(out, LaunchOutcome::Stopped);
        assert!(started.elapsed() <= Duration::from_millis(2010));
        assert!(h.shared.is_terminated());
    }

    #[test]
    fn terminate_reaches_an_attached_run() {
        let shared = InstanceShared::default();
        let control = Arc::new(ControlState::new());
        shared.attach(control.clone());
        shared.terminate();
        assert!(control.shutdown_requested());

        let late = Arc::new(ControlState::new());
        shared.attach(late.clone());
        assert!(late.shutdown_requested());
    }
}
