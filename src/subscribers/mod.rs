//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in subscribers the host installs.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   worker loop ── publish(Event) ──► Bus ──► Host listener ──► SubscriberSet::emit(&Event)
//!                                                                  │
//!                                                   ┌──────────────┼──────────────┐
//!                                                   ▼              ▼              ▼
//!                                            ActivityTracker    LogWriter    user subscribers
//! ```
//!
//! ## Subscriber types
//! - **Passive subscribers** - observe and react to events (logging, alerts)
//! - **Stateful subscribers** - maintain internal state based on events ([`ActivityTracker`])

mod activity;
mod log;
mod set;
mod subscribe;

pub use activity::{Activity, ActivityRow, ActivityTracker};
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
