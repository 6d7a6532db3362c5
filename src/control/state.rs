//! # ControlState: flags shared between the signal path and the worker loop.
//!
//! Each worker instance owns one [`ControlState`]. The signal path writes it
//! through [`on_terminate`](ControlState::on_terminate) and
//! [`on_reload`](ControlState::on_reload); the worker loop reads it through
//! [`shutdown_requested`](ControlState::shutdown_requested) and
//! [`take_reload`](ControlState::take_reload).
//!
//! ## Rules
//! - Handlers perform one atomic store and one [`Latch::set`]; no locks, no
//!   allocation, no fallible calls.
//! - `shutdown` is a one-way latch: once true it stays true.
//! - `reload` is cleared by the loop when observed (check-and-clear).
//! - Handlers may be called any number of times, concurrently with the loop.
//!
//! ```text
//! signal path                         worker loop
//!   on_terminate() ─► shutdown=true ─┐
//!                                     ├─► latch.set() ─► wait() returns
//!   on_reload()    ─► reload=true  ──┘                    ├─ take_reload()
//!                                                         └─ shutdown_requested()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use super::latch::Latch;

/// Interrupt-safe control flags plus the latch that wakes the loop.
#[derive(Debug, Default)]
pub struct ControlState {
    shutdown: AtomicBool,
    reload: AtomicBool,
    latch: Latch,
}

impl ControlState {
    /// Creates a state with both flags cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests termination and wakes the loop.
    #[inline]
    pub fn on_terminate(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.latch.set();
    }

    /// Marks a configuration reload as pending and wakes the loop.
    #[inline]
    pub fn on_reload(&self) {
        self.reload.store(true, Ordering::Release);
        self.latch.set();
    }

    /// Wakes the loop without touching any flag.
    #[inline]
    pub fn wake(&self) {
        self.latch.set();
    }

    /// Returns `true` once termination has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Returns whether a reload was pending, clearing it.
    #[inline]
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::AcqRel)
    }

    /// The latch the loop sleeps on.
    #[inline]
    pub fn latch(&self) -> &Latch {
        &self.latch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::control::WakeReason;

    #[test]
    fn terminate_is_one_way() {
        let st = ControlState::new();
        assert!(!st.shutdown_requested());
        st.on_terminate();
        assert!(st.shutdown_requested());
        st.on_reload();
        let _ = st.take_reload();
        assert!(st.shutdown_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_twice_equals_once() {
        let host = CancellationToken::new();

        let once = ControlState::new();
        once.on_terminate();
        let twice = ControlState::new();
        twice.on_terminate();
        twice.on_terminate();

        for st in [&once, &twice] {
            assert!(st.shutdown_requested());
            assert_eq!(st.latch().wait(Duration::from_secs(1), &host).await, WakeReason::LatchSet);
            assert_eq!(st.latch().wait(Duration::from_secs(1), &host).await, WakeReason::Timeout);
        }
    }

    #[test]
    fn reload_is_cleared_after_observation() {
        let st = ControlState::new();
        assert!(!st.take_reload());
        st.on_reload();
        st.on_reload();
        assert!(st.take_reload());
        assert!(!st.take_reload());
        assert!(!st.shutdown_requested());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_terminate_is_observed() {
        let st = Arc::new(ControlState::new());
        let host = CancellationToken::new();

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let st = st.clone();
                tokio::spawn(async move { st.on_terminate() })
            })
            .collect();
        for w in writers {
            w.await.unwrap();
        }

        assert!(st.shutdown_requested());
        assert_eq!(st.latch().wait(Duration::from_secs(5), &host).await, WakeReason::LatchSet);
    }
}
