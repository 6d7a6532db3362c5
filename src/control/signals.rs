//! # Cross-platform OS signal bridge.
//!
//! Translates process signals into calls on a worker's [`ControlState`] or on
//! the [`Host`].
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT`, `SIGTERM` → [`Signal::Terminate`]
//! - `SIGQUIT` → [`Signal::Quit`]
//! - `SIGHUP` → [`Signal::Reload`]
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`] → [`Signal::Terminate`]
//!
//! ## Mapping
//! ```text
//!                 worker bridge            host bridge
//! Terminate  ─►   on_terminate()           Host::shutdown()  (fast, with grace)
//! Quit       ─►   on_terminate()           Host::shutdown_immediate()
//! Reload     ─►   on_reload()              Host::reload()    (forwarded to every instance)
//! ```
//!
//! Tokio delivers signals to these listeners from its own driver, so the
//! handlers run in an ordinary task; they still only touch the atomic flags
//! and the latch.

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::state::ControlState;
use crate::host::Host;

/// A process signal relevant to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful termination request.
    Terminate,
    /// Immediate termination request.
    Quit,
    /// Configuration reload request.
    Reload,
}

/// Listens for process signals.
///
/// Each listener registers its own handlers; creating several is allowed.
pub struct SignalListener {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigquit: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sighup: tokio::signal::unix::Signal,
}

impl SignalListener {
    /// Registers the signal handlers.
    ///
    /// Must be called inside a Tokio runtime. Returns `Err` if registration fails.
    #[cfg(unix)]
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// Registers the signal handlers.
    #[cfg(not(unix))]
    pub fn new() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next signal. `None` once the signal streams are closed.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            s = self.sigint.recv()  => s.map(|_| Signal::Terminate),
            s = self.sigterm.recv() => s.map(|_| Signal::Terminate),
            s = self.sigquit.recv() => s.map(|_| Signal::Quit),
            s = self.sighup.recv()  => s.map(|_| Signal::Reload),
        }
    }

    /// Waits for the next signal. `None` if Ctrl-C cannot be awaited.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Option<Signal> {
        tokio::signal::ctrl_c().await.ok().map(|_| Signal::Terminate)
    }
}

/// Applies a signal to a single worker's control state.
pub fn deliver(control: &ControlState, signal: Signal) {
    match signal {
        Signal::Terminate | Signal::Quit => control.on_terminate(),
        Signal::Reload => control.on_reload(),
    }
}

/// Spawns a task that feeds process signals into one worker's control state.
///
/// Used when a worker runs standalone, without a host.
pub fn spawn_worker_bridge(control: Arc<ControlState>) -> io::Result<JoinHandle<()>> {
    let mut listener = SignalListener::new()?;
    Ok(tokio::spawn(async move {
        while let Some(signal) = listener.recv().await {
            deliver(&control, signal);
        }
    }))
}

/// Spawns a task that maps process signals onto host operations.
///
/// The task ends after the host has shut down.
pub fn spawn_host_bridge(host: Arc<Host>) -> io::Result<JoinHandle<()>> {
    let mut listener = SignalListener::new()?;
    Ok(tokio::spawn(async move {
        while let Some(signal) = listener.recv().await {
            match signal {
                Signal::Reload => {
                    info!("received reload request, forwarding to workers");
                    host.reload();
                }
                Signal::Terminate => {
                    info!("received fast shutdown request");
                    if let Err(e) = host.shutdown().await {
                        error!(label = e.as_label(), "{}", e.as_message());
                    }
                    break;
                }
                Signal::Quit => {
                    warn!("received immediate shutdown request");
                    host.shutdown_immediate();
                    break;
                }
            }
        }
    }))
}
