//! # Latch: the wake primitive of a worker loop.
//!
//! A [`Latch`] combines an explicit wake (`set`) with a timer and the host
//! liveness token. The worker loop suspends only inside [`Latch::wait`].
//!
//! ## Rules
//! - `set()` never blocks and may be called from any task or thread.
//! - Setting a latch nobody waits on stores one permit: the next `wait`
//!   returns immediately. A set racing with a waiter that is about to sleep is
//!   therefore never lost.
//! - Repeated sets before a wait coalesce into a single wake.
//! - Host death wins over a pending set; a pending set wins over the timer.

use std::time::Duration;

use tokio::{sync::Notify, time};
use tokio_util::sync::CancellationToken;

/// Why [`Latch::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The latch was set (terminate, reload or an explicit wake).
    LatchSet,
    /// The interval elapsed.
    Timeout,
    /// The supervising host is gone.
    HostGone,
}

/// Single-waiter wake primitive backed by [`Notify`].
#[derive(Debug, Default)]
pub struct Latch {
    notify: Notify,
}

impl Latch {
    /// Creates an unset latch.
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Sets the latch, waking the waiter or arming the next wait.
    #[inline]
    pub fn set(&self) {
        self.notify.notify_one();
    }

    /// Waits until the latch is set, `timeout` elapses or `host` is cancelled.
    ///
    /// Returning consumes the stored wake, so a following wait sleeps again.
    pub async fn wait(&self, timeout: Duration, host: &CancellationToken) -> WakeReason {
        tokio::select! {
            biased;
            _ = host.cancelled() => WakeReason::HostGone,
            _ = self.notify.notified() => WakeReason::LatchSet,
            _ = time::sleep(timeout) => WakeReason::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_before_wait_returns_immediately() {
        let latch = Latch::new();
        let host = CancellationToken::new();
        latch.set();

        let started = time::Instant::now();
        let reason = latch.wait(Duration::from_secs(10), &host).await;
        assert_eq!(reason, WakeReason::LatchSet);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_sets_coalesce() {
        let latch = Latch::new();
        let host = CancellationToken::new();
        latch.set();
        latch.set();

        assert_eq!(latch.wait(Duration::from_secs(1), &host).await, WakeReason::LatchSet);
        assert_eq!(latch.wait(Duration::from_secs(1), &host).await, WakeReason::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_never_exceeds_interval() {
        let latch = Latch::new();
        let host = CancellationToken::new();

        let started = time::Instant::now();
        let reason = latch.wait(Duration::from_millis(1500), &host).await;
        assert_eq!(reason, WakeReason::Timeout);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1500));
        assert!(waited < Duration::from_millis(1510));
    }

    #[tokio::test(start_paused = true)]
    async fn host_death_wins() {
        let latch = Latch::new();
        let host = CancellationToken::new();
        latch.set();
        host.cancel();

        assert_eq!(latch.wait(Duration::from_secs(1), &host).await, WakeReason::HostGone);
    }

    #[tokio::test(start_paused = true)]
    async fn set_from_another_task_wakes_waiter() {
        let latch = std::sync::Arc::new(Latch::new());
        let host = CancellationToken::new();

        let l = latch.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(200)).await;
            l.set();
        });

        let started = time::Instant::now();
        assert_eq!(latch.wait(Duration::from_secs(60), &host).await, WakeReason::LatchSet);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
