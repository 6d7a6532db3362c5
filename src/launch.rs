//! # Dynamic launch.
//!
//! [`launch`] asks the host for a new instance and blocks until the host
//! reports how the start went. The instance keeps running on its own
//! afterwards.
//!
//! ```text
//! launch(host, request, timeout)
//!   ├─► host.register_dynamic(reg)
//!   │     └─ rejected ─────────────────────────► Err(RegistrationRejected)
//!   └─► handle.wait_for_startup(timeout)
//!         ├─ Started(pid) ─────────────────────► Ok(pid)
//!         ├─ Stopped (no capacity, timeout) ───► Err(StartFailed)
//!         └─ HostUnavailable ──────────────────► Err(HostUnavailable)
//! ```
//!
//! The three failures are mutually exclusive and none is retried here.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ConfigSource;
use crate::error::LaunchError;
use crate::host::{Host, Pid, RestartPolicy, StartPolicy, WorkerRegistration};
use crate::worker::EntryRef;

/// What a launcher observes while waiting on its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The instance started with this pid.
    Started(Pid),
    /// The instance stopped before it started.
    Stopped,
    /// The host went away during the wait.
    HostUnavailable,
}

impl LaunchOutcome {
    /// Maps the outcome to the launcher's result.
    pub fn into_result(self, worker: &str) -> Result<Pid, LaunchError> {
        match self {
            LaunchOutcome::Started(pid) => Ok(pid),
            LaunchOutcome::Stopped => Err(LaunchError::StartFailed {
                worker: worker.to_string(),
                reason: "instance stopped before it started".into(),
            }),
            LaunchOutcome::HostUnavailable => Err(LaunchError::HostUnavailable {
                worker: worker.to_string(),
            }),
        }
    }
}

/// Immutable description of the instance to launch.
///
/// The notify target is created by the host on registration; it is the
/// handle [`launch`] waits on.
#[derive(Clone, Debug)]
pub struct LaunchRequest {
    registration: WorkerRegistration,
}

impl LaunchRequest {
    /// Request for a never-restarted instance that starts once recovery finished.
    pub fn new(name: impl Into<Arc<str>>, entry: EntryRef) -> Self {
        Self {
            registration: WorkerRegistration::new(name, entry)
                .with_start(StartPolicy::RecoveryFinished)
                .with_restart(RestartPolicy::Never),
        }
    }

    pub fn with_start(mut self, start: StartPolicy) -> Self {
        self.registration = self.registration.with_start(start);
        self
    }

    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.registration = self.registration.with_config_source(source);
        self
    }

    pub fn name(&self) -> &str {
        self.registration.name()
    }

    pub fn registration(&self) -> &WorkerRegistration {
        &self.registration
    }
}

/// Launches an instance and waits up to `timeout` for it to start.
pub async fn launch(
    host: &Host,
    request: LaunchRequest,
    timeout: Duration,
) -> Result<Pid, LaunchError> {
    let name = request.name().to_string();
    let res = match host.register_dynamic(request.registration) {
        Ok(mut handle) => handle.wait_for_startup(timeout).await.into_result(&name),
        Err(e) => Err(e),
    };
    match &res {
        Ok(pid) => info!(worker = %name, %pid, "background process started"),
        Err(e) => warn!(
            worker = %name,
            label = e.as_label(),
            hint = e.hint(),
            "{}",
            e.as_message()
        ),
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryConnector;
    use crate::config::HostConfig;
    use crate::error::WorkerError;
    use crate::events::EventKind;
    use crate::roles;
    use crate::work::Value;
    use crate::worker::{WorkerContext, WorkerFn};

    fn host(max_workers: usize, max_running: usize) -> Arc<Host> {
        let cfg = HostConfig {
            max_workers,
            max_running,
            ..HostConfig::default()
        };
        Host::builder(cfg)
            .with_connector(Arc::new(MemoryConnector::scalar(Value::Int(5))))
            .build()
    }

    fn request() -> LaunchRequest {
        LaunchRequest::new(roles::WORKER_NAME, roles::entry())
    }

    #[tokio::test(start_paused = true)]
    async fn started_instance_yields_pid() {
        let host = host(4, 4);
        host.start();
        let pid = launch(&host, request(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(pid, Pid::new(crate::host::FIRST_PID));

        let next = launch(&host, request(), Duration::from_secs(5)).await.unwrap();
        assert!(next > pid);
        host.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_capacity_and_timeout_are_accepted() {
        let host = host(4, usize::MAX);
        host.start();
        let pid = launch(&host, request(), Duration::MAX).await.unwrap();
        assert_eq!(pid.get(), crate::host::FIRST_PID);
        host.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_host_fails_to_start() {
        let host = host(4, 1);
        host.start();
        launch(&host, request(), Duration::from_secs(5)).await.unwrap();

        let err = launch(&host, request(), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, LaunchError::StartFailed { .. }));
        assert!(!err.is_retryable());
        host.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn full_slot_table_rejects_registration() {
        let host = host(1, 4);
        host.start();
        launch(&host, request(), Duration::from_secs(5)).await.unwrap();

        let err = launch(&host, request(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.as_label(), "launch_registration_rejected");
        host.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn host_death_during_wait_is_unavailable() {
        let host = host(4, 4);
        let waiter = tokio::spawn({
            let host = Arc::clone(&host);
            async move { launch(&host, request(), Duration::from_secs(30)).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        host.shutdown_immediate();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            LaunchError::HostUnavailable {
                worker: roles::WORKER_NAME.to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_before_started_returns_within_timeout() {
        // Host never finishes recovery; the start cannot happen.
        let host = host(4, 4);
        host.start_in_recovery();

        let started = tokio::time::Instant::now();
        let err = launch(&host, request(), Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, LaunchError::StartFailed { .. }));
        assert!(started.elapsed() <= Duration::from_millis(2010));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(host.registered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn host_start_policy_runs_during_recovery() {
        let host = host(4, 4);
        host.start_in_recovery();
        let pid = launch(
            &host,
            request().with_start(StartPolicy::HostStart),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(pid.get(), crate::host::FIRST_PID);
        host.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_are_exclusive_per_call() {
        let host = host(1, 0);
        host.start();

        // No running capacity at all: failed to start, never registration or host errors.
        let err = launch(&host, request(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.as_label(), "launch_start_failed");

        host.shutdown_immediate();
        let err = launch(&host, request(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.as_label(), "launch_registration_rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_instance_restarts_after_delay() {
        let host = host(4, 4);
        let mut rx = host.bus().subscribe();
        host.start();
        let entry = WorkerFn::arc("crashing_main", |ctx: WorkerContext| async move {
            Err::<(), _>(WorkerError::Fatal {
                worker: ctx.identity().name().to_string(),
                detail: "boom".into(),
            })
        });
        let reg = WorkerRegistration::new("crashing", entry)
            .with_restart(RestartPolicy::After(Duration::from_secs(1)));
        let mut handle = host.register_dynamic(reg).unwrap();
        let first = handle.wait_for_startup(Duration::from_secs(5)).await;
        assert!(matches!(first, LaunchOutcome::Started(_)));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.terminate();
        assert_eq!(handle.wait_for_shutdown().await, LaunchOutcome::Stopped);
        host.shutdown().await.unwrap();

        let mut starts = 0;
        let mut restarts = 0;
        while let Ok(ev) = rx.try_recv() {
            match ev.kind {
                EventKind::WorkerStarted => starts += 1,
                EventKind::RestartScheduled => restarts += 1,
                _ => {}
            }
        }
        // Starts at 0s, 1s and 2s; the third restart is cancelled by terminate.
        assert_eq!(starts, 3);
        assert_eq!(restarts, 3);
    }
}
