//! # Role-count worker.
//!
//! The reference worker: every `check_duration` it counts the roles of the
//! database cluster in a fresh transaction and logs
//! `Currently N roles in database cluster`.
//!
//! - [`init`] registers the statically started instance (starts once
//!   recovery finished, never restarted).
//! - [`launch`] starts an extra instance on demand and returns its pid.
//! - [`entry`] / [`count_roles_main`] the entry point both use.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use bgvisor::{backend::MemoryConnector, roles, Host, HostConfig, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let host = Host::builder(HostConfig::default())
//!         .with_connector(Arc::new(MemoryConnector::scalar(Value::Int(5))))
//!         .build();
//!     roles::init(&host).unwrap();
//!     host.start();
//!
//!     let pid = roles::launch(&host).await.unwrap();
//!     assert!(pid.get() >= bgvisor::FIRST_PID);
//!     host.shutdown().await.unwrap();
//! }
//! ```

use std::time::Duration;

use tracing::info;

use crate::error::{LaunchError, WorkerError};
use crate::host::{Host, Pid, RestartPolicy, StartPolicy, WorkerRegistration};
use crate::launch::LaunchRequest;
use crate::work::Operation;
use crate::worker::{EntryRef, WorkerContext, WorkerFn, WorkerLoop};

/// Query run once per cycle.
pub const COUNT_ROLES_QUERY: &str = "SELECT count(*) FROM pg_roles;";

/// Name the worker is registered and reported under.
pub const WORKER_NAME: &str = "count roles";

/// Name of the entry point.
pub const ENTRY_NAME: &str = "count_roles_main";

/// Noun logged after the count.
pub const SUBJECT: &str = "roles in database cluster";

/// How long [`launch`] waits for the instance to start.
pub const START_TIMEOUT: Duration = Duration::from_secs(30);

/// The operation each cycle runs.
pub fn operation() -> Operation {
    Operation::new(COUNT_ROLES_QUERY).with_subject(SUBJECT)
}

/// Entry point reference for registrations.
pub fn entry() -> EntryRef {
    WorkerFn::arc(ENTRY_NAME, count_roles_main)
}

/// Entry point: connect to the configured database and run the loop until terminated.
pub async fn count_roles_main(ctx: WorkerContext) -> Result<(), WorkerError> {
    let session = ctx.connect().await?;
    info!(
        worker = ctx.identity().name(),
        pid = ctx.identity().pid().map(|p| p.get()),
        database = ctx.config().database(),
        "{} initialized",
        ctx.identity().name()
    );
    WorkerLoop::new(&ctx, session, operation()).run().await?;
    Ok(())
}

/// Registration of the statically started worker.
pub fn registration() -> WorkerRegistration {
    WorkerRegistration::new(WORKER_NAME, entry())
        .with_start(StartPolicy::RecoveryFinished)
        .with_restart(RestartPolicy::Never)
}

/// Registers the statically started worker. Call before [`Host::start`].
pub fn init(host: &Host) -> Result<(), LaunchError> {
    host.register(registration())
}

/// Starts one more instance and waits until it runs.
pub async fn launch(host: &Host) -> Result<Pid, LaunchError> {
    crate::launch::launch(host, LaunchRequest::new(WORKER_NAME, entry()), START_TIMEOUT).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::MemoryConnector;
    use crate::config::{HostConfig, SharedSource, WorkerConfig};
    use crate::events::EventKind;
    use crate::work::Value;

    #[tokio::test(start_paused = true)]
    async fn static_worker_counts_until_shutdown() {
        let conn = MemoryConnector::scalar(Value::Int(5));
        let source = Arc::new(SharedSource::new(WorkerConfig::from_secs(1, "postgres").unwrap()));
        let host = Host::builder(HostConfig::default())
            .with_connector(Arc::new(conn.clone()))
            .with_config_source(source)
            .build();
        let mut rx = host.bus().subscribe();

        init(&host).unwrap();
        assert_eq!(host.registered(), vec![WORKER_NAME.to_string()]);
        host.start();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        host.shutdown().await.unwrap();

        let mut values = 0;
        let mut exit = None;
        while let Ok(ev) = rx.try_recv() {
            match ev.kind {
                EventKind::CycleCompleted => {
                    assert_eq!(ev.value, Some(Value::Int(5)));
                    values += 1;
                }
                EventKind::WorkerExited => exit = ev.exit_code,
                _ => {}
            }
        }
        assert_eq!(values, 3);
        assert_eq!(exit, Some(0));
        assert_eq!(conn.databases(), vec!["postgres".to_string()]);
        assert!(host.registered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn static_registration_after_start_is_rejected() {
        let host = Host::builder(HostConfig::default()).build();
        host.start();
        let err = init(&host).unwrap_err();
        assert_eq!(err.as_label(), "launch_registration_rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_crashes_without_restart() {
        let conn = MemoryConnector::scalar(Value::Int(1)).refuse_connections();
        let host = Host::builder(HostConfig::default())
            .with_connector(Arc::new(conn))
            .build();
        let mut rx = host.bus().subscribe();
        init(&host).unwrap();
        host.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut exit = None;
        let mut restarts = 0;
        while let Ok(ev) = rx.try_recv() {
            match ev.kind {
                EventKind::WorkerExited => exit = ev.exit_code,
                EventKind::RestartScheduled => restarts += 1,
                _ => {}
            }
        }
        assert_eq!(exit, Some(1));
        assert_eq!(restarts, 0);
        assert!(host.registered().is_empty());
    }
}
