//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the host, instance drivers
//! and worker loops.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Host`, instance drivers, `WorkerLoop`, `SubscriberSet`
//!   workers (overflow/panic).
//! - **Consumers**: `Host::subscriber_listener()` (fans out to `SubscriberSet`,
//!   which feeds `ActivityTracker` and `LogWriter`), plus any direct receiver.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
