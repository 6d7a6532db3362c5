//! Signal bridge and wake source.
//!
//! This module groups everything that crosses from an asynchronous control
//! context (process signals, the host, a launcher) into a worker's
//! cooperative loop.
//!
//! ## Contents
//! - [`Latch`], [`WakeReason`] timer + explicit wake + host liveness in one wait
//! - [`ControlState`] one-way `shutdown` flag, check-and-clear `reload` flag
//! - [`Signal`], [`SignalListener`] process signals, and the bridges that
//!   route them to a worker ([`spawn_worker_bridge`]) or to the host
//!   ([`spawn_host_bridge`])

mod latch;
mod signals;
mod state;

pub use latch::{Latch, WakeReason};
pub use signals::{Signal, SignalListener, deliver, spawn_host_bridge, spawn_worker_bridge};
pub use state::ControlState;
