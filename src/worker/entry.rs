//! # Worker entry points.
//!
//! A registration names its entry point by an [`EntryRef`], an
//! `Arc<dyn WorkerMain>`. [`WorkerFn`] wraps a closure that creates a fresh
//! future per instance start, so a restarted instance never shares hidden
//! state with the previous one.
//!
//! ## Example
//! ```rust
//! use bgvisor::{EntryRef, WorkerContext, WorkerError, WorkerFn, WorkerMain};
//!
//! let entry: EntryRef = WorkerFn::arc("noop_main", |_ctx: WorkerContext| async move {
//!     Ok::<(), WorkerError>(())
//! });
//! assert_eq!(entry.name(), "noop_main");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::WorkerError;
use crate::worker::WorkerContext;

/// Boxed future returned by [`WorkerMain::spawn`].
pub type BoxWorkerFuture = BoxFuture<'static, Result<(), WorkerError>>;

/// Entry point of a worker instance.
///
/// `Ok(())` is a clean exit (exit code 0); any `Err` is a crash (exit code 1).
pub trait WorkerMain: Send + Sync + 'static {
    /// Entry point name, e.g. `"count_roles_main"`.
    fn name(&self) -> &str;

    /// Creates the future of one instance run.
    fn spawn(&self, ctx: WorkerContext) -> BoxWorkerFuture;
}

/// Shared entry point reference.
pub type EntryRef = Arc<dyn WorkerMain>;

/// Closure-backed entry point.
#[derive(Debug)]
pub struct WorkerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> WorkerFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the entry point and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> WorkerMain for WorkerFn<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: WorkerContext) -> BoxWorkerFuture {
        Box::pin((self.f)(ctx))
    }
}
