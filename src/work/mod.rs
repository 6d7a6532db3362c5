//! # Unit of work.
//!
//! Everything a worker cycle needs to run one operation in one transaction:
//! - [`Operation`] opaque operation descriptor
//! - [`Connector`] / [`Session`] / [`Transaction`] seams to the database
//! - [`TransactionScope`] one-cycle scope, rolled back unless committed
//! - [`Executor`] runs the operation and classifies the result
//! - [`ResultSet`], [`Value`], [`CycleResult`] result shapes

mod executor;
mod operation;
mod result;
mod session;

pub use executor::Executor;
pub use operation::Operation;
pub use result::{CycleResult, ResultSet, Row, Value};
pub use session::{Connector, Session, Transaction, TransactionScope};
