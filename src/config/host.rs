//! # Host runtime configuration.
//!
//! Provides [`HostConfig`], the centralized settings of the in-process host.
//!
//! ## Sentinel values
//! - `grace = 0s` → do not wait for workers at shutdown, mark the host dead at once
//! - `bus_capacity` is clamped to a minimum of 1
//! - `max_running` is clamped to `Semaphore::MAX_PERMITS`

use std::time::Duration;

/// Configuration of the in-process host.
///
/// ## Field semantics
/// - `grace`: Maximum wait for workers to stop during a fast shutdown
/// - `max_workers`: Size of the registration table (static + dynamic)
/// - `max_running`: Number of instances allowed to run at the same time
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
///
/// A full registration table rejects registrations outright. A host with a
/// free slot but no running capacity accepts the registration and the
/// instance then stops before it starts.
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Maximum time to wait for graceful shutdown before giving up.
    ///
    /// When a fast shutdown is requested:
    /// - Every instance receives a terminate request
    /// - The host waits up to `grace` for all of them to exit
    /// - If the timeout is exceeded, `RuntimeError::GraceExceeded` is returned
    pub grace: Duration,

    /// Number of registration slots.
    pub max_workers: usize,

    /// Number of instances that may run concurrently.
    pub max_running: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl HostConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the running capacity clamped to what a semaphore can hold.
    #[inline]
    pub fn max_running_clamped(&self) -> usize {
        self.max_running.min(tokio::sync::Semaphore::MAX_PERMITS)
    }
}

impl Default for HostConfig {
    /// Default configuration:
    ///
    /// - `grace = 60s`
    /// - `max_workers = 8`
    /// - `max_running = 8`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            max_workers: 8,
            max_running: 8,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_running_capacity_is_clamped() {
        let cfg = HostConfig {
            max_running: usize::MAX,
            ..HostConfig::default()
        };
        assert_eq!(cfg.max_running_clamped(), tokio::sync::Semaphore::MAX_PERMITS);
        assert_eq!(HostConfig::default().max_running_clamped(), 8);
    }
}
