//! Configuration: host settings, worker snapshots and where they come from.
//!
//! ## Contents
//! - [`HostConfig`] grace period, slot table size, running capacity, bus capacity
//! - [`WorkerConfig`] per-instance interval and target database (immutable snapshot)
//! - [`ConfigSource`] produces snapshots; [`StaticSource`], [`SharedSource`], [`FileSource`]
//!
//! ## Quick wiring
//! ```text
//! Host::builder(HostConfig)
//!      .with_config_source(Arc<dyn ConfigSource>)
//!      └─► each instance: load() at startup ─► WorkerConfig
//!                         load() again on reload ─► new check_duration on the next wait
//! ```

mod host;
mod source;
mod worker;

pub use host::HostConfig;
pub use source::{ConfigSource, FileSource, SharedSource, StaticSource};
pub use worker::{DEFAULT_CHECK_DURATION, DEFAULT_DATABASE, WorkerConfig};
