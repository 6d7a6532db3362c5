//! # bgvisor
//!
//! **bgvisor** hosts background workers inside a process: periodic database
//! jobs that wake on a timer or on an explicit wake-up, run one operation per
//! cycle in its own transaction, and stop cooperatively when told to.
//!
//! It provides three pieces that fit together:
//! - a cooperative **worker loop** ([`WorkerLoop`]) built on a [`Latch`] and
//!   the [`ControlState`] flags a signal bridge writes into;
//! - an in-process **host** ([`Host`]) with a registration table, running
//!   capacity, start phases, restart policies and a graceful shutdown;
//! - a synchronous **dynamic launch** ([`launch()`]) that registers an instance
//!   and waits until it is known to be running, stopped or orphaned.
//!
//! The reference worker lives in [`roles`]: it counts the roles of a
//! PostgreSQL cluster every `check_duration` and logs the count.
//!
//! ## Architecture
//! ```text
//!     ┌────────────────┐   ┌────────────────┐   ┌────────────────┐
//!     │  Registration  │   │  Registration  │   │ LaunchRequest  │
//!     │ (static, init) │   │ (static, init) │   │   (dynamic)    │
//!     └───────┬────────┘   └───────┬────────┘   └───────┬────────┘
//!             ▼                    ▼                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Host (process manager)                                           │
//! │  - slot table (max_workers)      - running capacity (max_running) │
//! │  - phase: Init ─► Started ─► RecoveryFinished ─► Stopping ─► Dead │
//! │  - Bus + SubscriberSet (ActivityTracker, LogWriter, user subs)    │
//! └───────┬────────────────────┬────────────────────┬─────────────────┘
//!         ▼                    ▼                    ▼
//!   ┌────────────┐       ┌────────────┐       ┌────────────┐
//!   │  instance  │       │  instance  │       │  instance  │──► WorkerHandle
//!   │  driver    │       │  driver    │       │  driver    │    (launcher waits)
//!   └─────┬──────┘       └─────┬──────┘       └─────┬──────┘
//!         ▼                    ▼                    ▼
//!   WorkerLoop: wait(latch, check_duration) ─► reload? ─► shutdown? ─► cycle
//!                                                                      │
//!                  TransactionScope ─► Executor::execute(Operation) ◄──┘
//!                        │                     │
//!                        ▼                     ▼
//!                  Connector/Session     CycleResult ─► "Currently N ..."
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                             |
//! |-------------------|-------------------------------------------------------------|------------------------------------------------|
//! | **Worker loop**   | Wait, react to control flags, run one cycle per wake-up.    | [`WorkerLoop`], [`WorkerContext`]              |
//! | **Signals**       | Terminate/reload flags and the latch that wakes the loop.   | [`ControlState`], [`Latch`], [`Signal`]        |
//! | **Host**          | Registration, phases, capacity, restart and shutdown.       | [`Host`], [`WorkerRegistration`]               |
//! | **Launch**        | Start an instance and wait for a classified outcome.        | [`launch()`], [`LaunchRequest`], [`LaunchError`] |
//! | **Work**          | Transaction-scoped execution of an opaque operation.        | [`Executor`], [`TransactionScope`], [`Connector`] |
//! | **Events**        | Lifecycle events fanned out to subscribers.                 | [`Event`], [`Subscribe`], [`LogWriter`]        |
//! | **Configuration** | Host settings and reloadable worker snapshots.              | [`HostConfig`], [`WorkerConfig`], [`ConfigSource`] |
//!
//! ## Optional features
//! - `postgres`: [`backend::PgConnector`] over `sqlx` and the `count-roles` binary.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bgvisor::{backend::MemoryConnector, roles, Host, HostConfig, LogWriter, Subscribe, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::default())];
//!     let host = Host::builder(HostConfig::default())
//!         .with_connector(Arc::new(MemoryConnector::scalar(Value::Int(3))))
//!         .with_subscribers(subs)
//!         .build();
//!
//!     roles::init(&host)?;
//!     host.start();
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!
//!     host.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
mod config;
mod control;
mod error;
mod events;
mod host;
mod launch;
pub mod logging;
pub mod roles;
mod subscribers;
mod work;
mod worker;

// ---- Public re-exports ----

pub use config::{
    ConfigSource, DEFAULT_CHECK_DURATION, DEFAULT_DATABASE, FileSource, HostConfig, SharedSource,
    StaticSource, WorkerConfig,
};
pub use control::{
    ControlState, Latch, Signal, SignalListener, WakeReason, deliver, spawn_host_bridge,
    spawn_worker_bridge,
};
pub use error::{ConfigError, LaunchError, RuntimeError, SessionError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use host::{
    FIRST_PID, HandleStatus, Host, HostBuilder, HostPhase, Pid, RestartPolicy, StartPolicy,
    WorkerHandle, WorkerRegistration,
};
pub use launch::{LaunchOutcome, LaunchRequest, launch};
pub use subscribers::{Activity, ActivityRow, ActivityTracker, LogWriter, Subscribe, SubscriberSet};
pub use work::{
    Connector, CycleResult, Executor, Operation, ResultSet, Row, Session, Transaction,
    TransactionScope, Value,
};
pub use worker::{
    BoxWorkerFuture, EntryRef, WorkerContext, WorkerFn, WorkerIdentity, WorkerLoop, WorkerMain,
    WorkerState, WorkerStats,
};
