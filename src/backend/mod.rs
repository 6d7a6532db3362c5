//! # Session backends.
//!
//! - [`MemoryConnector`] scripted, in-process; always available.
//! - [`PgConnector`] PostgreSQL through `sqlx`; requires the `postgres` feature.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::{MemoryConnector, MemoryStats};
#[cfg(feature = "postgres")]
pub use postgres::PgConnector;
