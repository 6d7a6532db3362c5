//! # WorkerLoop: the cooperative cycle of one worker instance.
//!
//! ```text
//!            ┌──────────────────────────────────────────────────────┐
//!            ▼                                                      │
//!   take_reload()? ─► re-read config (new interval for next wait)   │
//!            │                                                      │
//!   WAITING: latch.wait(check_duration, host)                       │
//!            ├─ HostGone            → Err(HostUnavailable)          │
//!            ├─ shutdown_requested  → TERMINATING → Ok(stats)       │
//!            └─ otherwise           → EXECUTING                     │
//!                                       open scope                  │
//!                                       report running(op)          │
//!                                       executor.execute(op)        │
//!                                       ├─ failed → rollback, Err(Fatal)
//!                                       report idle, commit         │
//!                                       "Currently {v} {subject}" ──┘
//! ```
//!
//! ## Rules
//! - Cycles never overlap: cycle N+1 starts only after cycle N's scope closed.
//! - `shutdown_requested` is only checked between WAITING and EXECUTING; a
//!   cycle already running is never interrupted.
//! - A reloaded interval applies from the next wait on.
//! - Zero rows (or a NULL scalar) is not an error and logs no value.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::control::WakeReason;
use crate::error::WorkerError;
use crate::events::EventKind;
use crate::work::{Executor, Operation, Session, TransactionScope};
use crate::worker::WorkerContext;

/// State of a [`WorkerLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Suspended until the next wake.
    Waiting,
    /// Running one cycle.
    Executing,
    /// Terminal.
    Terminating,
}

/// Statistics reported when the loop terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Completed cycles.
    pub cycles: u64,
    /// Cycles that produced a scalar.
    pub reported: u64,
    /// Cycles that produced no rows or a NULL scalar.
    pub empty: u64,
}

/// Cooperative wait/execute loop bound to one context, one session and one operation.
pub struct WorkerLoop<'a> {
    ctx: &'a WorkerContext,
    session: Box<dyn Session>,
    operation: Operation,
    executor: Executor,
    config: WorkerConfig,
    state: WorkerState,
    stats: WorkerStats,
}

impl<'a> WorkerLoop<'a> {
    /// Creates the loop in [`WorkerState::Waiting`] with the context's configuration.
    pub fn new(ctx: &'a WorkerContext, session: Box<dyn Session>, operation: Operation) -> Self {
        Self {
            ctx,
            session,
            operation,
            executor: Executor::new(),
            config: ctx.config().clone(),
            state: WorkerState::Waiting,
            stats: WorkerStats::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Interval of the next wait.
    pub fn check_duration(&self) -> Duration {
        self.config.check_duration()
    }

    /// Runs until termination is requested, the host goes away, or a cycle fails.
    ///
    /// - `Ok(stats)` after a requested termination.
    /// - `Err(WorkerError::HostUnavailable)` when the host died while waiting.
    /// - `Err(WorkerError::Fatal)` when a cycle hit a contract violation.
    pub async fn run(&mut self) -> Result<WorkerStats, WorkerError> {
        loop {
            if self.ctx.control().take_reload() {
                self.reload();
            }

            self.state = WorkerState::Waiting;
            let wake = self
                .ctx
                .control()
                .latch()
                .wait(self.config.check_duration(), self.ctx.host_token())
                .await;

            if wake == WakeReason::HostGone {
                warn!(worker = self.ctx.identity().name(), "host gone; exiting");
                return Err(WorkerError::HostUnavailable);
            }
            if self.ctx.control().shutdown_requested() {
                return Ok(self.terminate());
            }

            self.state = WorkerState::Executing;
            self.cycle().await?;
        }
    }

    async fn cycle(&mut self) -> Result<(), WorkerError> {
        let ctx = self.ctx;
        let worker = ctx.identity().name();
        let pid = ctx.identity().pid().map(|p| p.get());

        let mut scope = match TransactionScope::open(self.session.as_ref()).await {
            Ok(scope) => scope,
            Err(e) => return Err(self.fatal(e.to_string())),
        };
        ctx.report_running(self.operation.text());

        let result = self.executor.execute(&mut scope, &self.operation).await;
        if !result.succeeded {
            drop(scope);
            let detail = result
                .error
                .unwrap_or_else(|| "unit of work failed".to_string());
            return Err(self.fatal(detail));
        }

        ctx.report_idle();
        if let Err(e) = scope.commit().await {
            return Err(self.fatal(e.to_string()));
        }

        self.stats.cycles += 1;
        match result.value {
            Some(value) => {
                self.stats.reported += 1;
                info!(worker, pid, %value, "Currently {} {}", value, self.operation.subject());
                ctx.bus()
                    .publish(ctx.event(EventKind::CycleCompleted).with_value(value));
            }
            None => {
                self.stats.empty += 1;
                debug!(worker, pid, "cycle returned no rows");
                ctx.bus().publish(ctx.event(EventKind::CycleEmpty));
            }
        }
        Ok(())
    }

    fn reload(&mut self) {
        let worker = self.ctx.identity().name();
        match self.ctx.reload_config() {
            Ok(fresh) => {
                if fresh.database() != self.config.database() {
                    warn!(
                        worker,
                        database = self.config.database(),
                        requested = fresh.database(),
                        "database change takes effect on restart only"
                    );
                }
                match self.config.with_check_duration(fresh.check_duration()) {
                    Ok(cfg) => {
                        self.config = cfg;
                        info!(
                            worker,
                            check_duration = ?self.config.check_duration(),
                            "configuration reloaded"
                        );
                        self.ctx.bus().publish(
                            self.ctx
                                .event(EventKind::ConfigReloaded)
                                .with_delay(self.config.check_duration()),
                        );
                    }
                    Err(e) => warn!(worker, error = %e, "reloaded interval rejected"),
                }
            }
            Err(e) => warn!(
                worker,
                label = e.as_label(),
                error = %e,
                "configuration reload failed; keeping previous values"
            ),
        }
    }

    fn fatal(&mut self, detail: String) -> WorkerError {
        let worker = self.ctx.identity().name();
        error!(
            worker,
            pid = self.ctx.identity().pid().map(|p| p.get()),
            operation = self.operation.text(),
            "{detail}"
        );
        self.ctx
            .bus()
            .publish(self.ctx.event(EventKind::WorkerFatal).with_reason(detail.as_str()));
        WorkerError::Fatal {
            worker: worker.to_string(),
            detail,
        }
    }

    fn terminate(&mut self) -> WorkerStats {
        self.state = WorkerState::Terminating;
        info!(
            worker = self.ctx.identity().name(),
            cycles = self.stats.cycles,
            reported = self.stats.reported,
            empty = self.stats.empty,
            "worker terminating"
        );
        self.ctx
            .bus()
            .publish(self.ctx.event(EventKind::WorkerStopped).with_stats(self.stats));
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use super::*;
    use crate::backend::MemoryConnector;
    use crate::config::SharedSource;
    use crate::events::{Bus, Event};
    use crate::work::{ResultSet, Value};

    fn op() -> Operation {
        Operation::new("SELECT count(*) FROM pg_roles;").with_subject("roles in database cluster")
    }

    fn ctx(conn: &MemoryConnector, secs: u64) -> WorkerContext {
        let cfg = WorkerConfig::from_secs(secs, "postgres").unwrap();
        WorkerContext::new("count roles", cfg, Arc::new(conn.clone())).with_bus(Bus::new(256))
    }

    fn drain(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == kind {
                out.push(ev);
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn three_wakes_give_three_values_and_keep_running() {
        let conn = MemoryConnector::scalar(Value::Int(5));
        let ctx = ctx(&conn, 1);
        let mut rx = ctx.bus().subscribe();
        let session = ctx.connect().await.unwrap();

        let control = ctx.control().clone();
        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { WorkerLoop::new(&ctx, session, op()).run().await }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!handle.is_finished());
        let values: Vec<_> = drain(&mut rx, EventKind::CycleCompleted)
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(values, vec![Some(Value::Int(5)); 3]);

        control.on_terminate();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.reported, 3);
        assert_eq!(conn.stats().committed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_waiting_runs_no_cycle() {
        let conn = MemoryConnector::scalar(Value::Int(5));
        let ctx = ctx(&conn, 10);
        let session = ctx.connect().await.unwrap();
        let control = ctx.control().clone();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                let mut lp = WorkerLoop::new(&ctx, session, op());
                let res = lp.run().await;
                (res, lp.state())
            }
        });
        tokio::time::sleep(Duration::from_secs(3)).await;
        control.on_terminate();
        control.on_terminate();

        let started = tokio::time::Instant::now();
        let (res, state) = handle.await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(res.unwrap(), WorkerStats::default());
        assert_eq!(state, WorkerState::Terminating);
        assert_eq!(conn.stats().begun, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_cycle_completes_before_termination() {
        let conn = MemoryConnector::scalar(Value::Int(2)).with_latency(Duration::from_millis(500));
        let ctx = ctx(&conn, 1);
        let session = ctx.connect().await.unwrap();
        let control = ctx.control().clone();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { WorkerLoop::new(&ctx, session, op()).run().await }
        });
        // First wake at 1s, the cycle is in flight until 1.5s.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        control.on_terminate();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.cycles, 1);
        assert_eq!(conn.stats().committed, 1);
        assert_eq!(conn.stats().begun, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_results_never_log_a_value() {
        let conn = MemoryConnector::script(vec![Ok(ResultSet::empty(vec!["count".into()]))]);
        let ctx = ctx(&conn, 1);
        let mut rx = ctx.bus().subscribe();
        let session = ctx.connect().await.unwrap();
        let control = ctx.control().clone();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { WorkerLoop::new(&ctx, session, op()).run().await }
        });
        tokio::time::sleep(Duration::from_millis(2500)).await;
        control.on_terminate();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats, WorkerStats { cycles: 2, reported: 0, empty: 2 });
        assert!(drain(&mut rx, EventKind::CycleCompleted).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_result_is_fatal_and_rolled_back() {
        let conn = MemoryConnector::script(vec![
            Ok(ResultSet::scalar("count", 4)),
            Ok(ResultSet::command("UPDATE", 12)),
        ]);
        let ctx = ctx(&conn, 1);
        let mut rx = ctx.bus().subscribe();
        let session = ctx.connect().await.unwrap();

        let err = WorkerLoop::new(&ctx, session, op()).run().await.unwrap_err();
        assert_eq!(err.as_label(), "worker_fatal");

        let stats = conn.stats();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(drain(&mut rx, EventKind::WorkerFatal).len(), 1);
    }

    fn cycle_trace(rx: &mut broadcast::Receiver<Event>) -> Vec<(EventKind, Option<String>)> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if matches!(
                ev.kind,
                EventKind::ActivityRunning
                    | EventKind::ActivityIdle
                    | EventKind::CycleCompleted
                    | EventKind::WorkerFatal
            ) {
                out.push((ev.kind, ev.activity.as_deref().map(str::to_string)));
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn each_cycle_reports_running_then_idle() {
        let conn = MemoryConnector::scalar(Value::Int(5));
        let ctx = ctx(&conn, 1);
        let mut rx = ctx.bus().subscribe();
        let session = ctx.connect().await.unwrap();
        let control = ctx.control().clone();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { WorkerLoop::new(&ctx, session, op()).run().await }
        });
        tokio::time::sleep(Duration::from_millis(2500)).await;
        control.on_terminate();
        handle.await.unwrap().unwrap();

        let text = op().text().to_string();
        let one = vec![
            (EventKind::ActivityRunning, Some(text)),
            (EventKind::ActivityIdle, None),
            (EventKind::CycleCompleted, None),
        ];
        assert_eq!(cycle_trace(&mut rx), [one.clone(), one].concat());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_cycle_never_reports_idle() {
        let conn = MemoryConnector::script(vec![Ok(ResultSet::command("UPDATE", 1))]);
        let ctx = ctx(&conn, 1);
        let mut rx = ctx.bus().subscribe();
        let session = ctx.connect().await.unwrap();

        WorkerLoop::new(&ctx, session, op()).run().await.unwrap_err();

        assert_eq!(
            cycle_trace(&mut rx),
            vec![
                (EventKind::ActivityRunning, Some(op().text().to_string())),
                (EventKind::WorkerFatal, None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commit_failure_is_fatal() {
        let conn = MemoryConnector::scalar(Value::Int(1)).fail_commits();
        let ctx = ctx(&conn, 1);
        let session = ctx.connect().await.unwrap();

        let err = WorkerLoop::new(&ctx, session, op()).run().await.unwrap_err();
        assert!(matches!(err, WorkerError::Fatal { .. }));
        assert_eq!(conn.stats().rolled_back, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn host_death_ends_the_loop() {
        let conn = MemoryConnector::scalar(Value::Int(5));
        let host = tokio_util::sync::CancellationToken::new();
        let ctx = ctx(&conn, 10).with_host_token(host.clone());
        let session = ctx.connect().await.unwrap();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { WorkerLoop::new(&ctx, session, op()).run().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        host.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, WorkerError::HostUnavailable));
        assert_eq!(conn.stats().begun, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_applies_new_interval_to_next_wait() {
        let conn = MemoryConnector::scalar(Value::Int(5));
        let source = Arc::new(SharedSource::new(WorkerConfig::from_secs(10, "postgres").unwrap()));
        let ctx = ctx(&conn, 10).with_config_source(source.clone());
        let mut rx = ctx.bus().subscribe();
        let session = ctx.connect().await.unwrap();
        let control = ctx.control().clone();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { WorkerLoop::new(&ctx, session, op()).run().await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        source.set(WorkerConfig::from_secs(2, "postgres").unwrap());
        control.on_reload();

        // The reload wake runs one cycle, then waits 2s per cycle.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        control.on_terminate();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.cycles, 3);
        let reloaded = drain(&mut rx, EventKind::ConfigReloaded);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].delay_ms, Some(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reload_keeps_previous_interval() {
        struct Broken;
        impl crate::config::ConfigSource for Broken {
            fn load(&self) -> Result<WorkerConfig, crate::error::ConfigError> {
                Err(crate::error::ConfigError::Parse {
                    error: "expected `=`".into(),
                })
            }
        }

        let conn = MemoryConnector::scalar(Value::Int(5));
        let ctx = ctx(&conn, 3).with_config_source(Arc::new(Broken));
        let session = ctx.connect().await.unwrap();
        let control = ctx.control().clone();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                let mut lp = WorkerLoop::new(&ctx, session, op());
                let res = lp.run().await;
                (res, lp.check_duration())
            }
        });
        control.on_reload();
        tokio::time::sleep(Duration::from_millis(100)).await;
        control.on_terminate();

        let (res, interval) = handle.await.unwrap();
        assert!(res.is_ok());
        assert_eq!(interval, Duration::from_secs(3));
    }
}
