//! # In-process host.
//!
//! The host is the process manager worker instances run under:
//! - [`Host`] / [`HostBuilder`] registration table, running capacity, phases, shutdown
//! - [`WorkerRegistration`] with [`StartPolicy`] and [`RestartPolicy`]
//! - [`WorkerHandle`] / [`HandleStatus`] / [`Pid`] what a dynamic registration returns
//!
//! Each occupied slot is driven by its own task, which starts the worker's
//! entry point, reports status to the handle and applies the restart policy.

mod core;
mod handle;
mod instance;
mod registration;

pub use self::core::{FIRST_PID, Host, HostBuilder, HostPhase};
pub use handle::{HandleStatus, Pid, WorkerHandle};
pub use registration::{RestartPolicy, StartPolicy, WorkerRegistration};
