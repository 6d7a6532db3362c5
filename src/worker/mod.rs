//! # Worker instances.
//!
//! - [`WorkerMain`] / [`WorkerFn`] / [`EntryRef`] entry points registered with the host
//! - [`WorkerContext`] / [`WorkerIdentity`] what an instance receives when it starts
//! - [`WorkerLoop`] the cooperative wait/execute cycle, with [`WorkerState`] and
//!   the final [`WorkerStats`]

mod context;
mod entry;
mod runloop;

pub use context::{WorkerContext, WorkerIdentity};
pub use entry::{BoxWorkerFuture, EntryRef, WorkerFn, WorkerMain};
pub use runloop::{WorkerLoop, WorkerState, WorkerStats};
