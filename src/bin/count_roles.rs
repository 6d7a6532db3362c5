//! # count-roles
//!
//! Runs the role-count worker against a PostgreSQL cluster under the
//! in-process host.
//!
//! ```text
//! main()
//!   ├─► logging::init()
//!   ├─► PgConnector::new(url)
//!   ├─► Host::builder(cfg).with_connector(..).with_config_source(..)
//!   ├─► roles::init(host)              static instance
//!   ├─► host.start()                   Started ─► RecoveryFinished
//!   ├─► roles::launch(host) × N        extra instances (--launch N)
//!   └─► spawn_host_bridge(host)        SIGTERM/SIGINT: shutdown, SIGQUIT: immediate, SIGHUP: reload
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --features postgres --bin count-roles -- \
//!     --url postgres://postgres@localhost/postgres --config bgvisor.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bgvisor::backend::PgConnector;
use bgvisor::{
    ConfigSource, FileSource, Host, HostConfig, LogWriter, StaticSource, Subscribe, WorkerConfig,
    logging, roles, spawn_host_bridge,
};
use clap::Parser;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "count-roles", version, about = "Periodically count the roles of a PostgreSQL cluster")]
struct Args {
    /// Connection URL; the database part is replaced by the configured database.
    #[arg(long, env = "DATABASE_URL")]
    url: String,

    /// TOML file holding the worker settings; re-read on SIGHUP.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Section of the config file to read.
    #[arg(long, default_value = FileSource::DEFAULT_SECTION)]
    section: String,

    /// Seconds between cycles when no config file is given.
    #[arg(long, default_value_t = 10)]
    check_duration: u64,

    /// Target database when no config file is given.
    #[arg(long, default_value = "postgres")]
    database: String,

    /// Extra instances to launch after start.
    #[arg(long, default_value_t = 0)]
    launch: usize,

    /// Registration slots.
    #[arg(long, default_value_t = 8)]
    max_workers: usize,

    /// Seconds to wait for workers on shutdown.
    #[arg(long, default_value_t = 60)]
    grace: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    let source: Arc<dyn ConfigSource> = match &args.config {
        Some(path) => Arc::new(FileSource::new(path).with_section(args.section.clone())),
        None => Arc::new(StaticSource::new(WorkerConfig::from_secs(
            args.check_duration,
            args.database.clone(),
        )?)),
    };
    // Fail early on a broken file instead of at instance start.
    let initial = source.load().context("loading worker configuration")?;
    info!(check_duration = ?initial.check_duration(), database = initial.database(), "configuration loaded");

    let connector = PgConnector::new(&args.url)
        .context("parsing connection url")?
        .with_acquire_timeout(Duration::from_secs(10));

    let cfg = HostConfig {
        grace: Duration::from_secs(args.grace),
        max_workers: args.max_workers,
        max_running: args.max_workers,
        ..HostConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let host = Host::builder(cfg)
        .with_connector(Arc::new(connector))
        .with_config_source(source)
        .with_subscribers(subs)
        .build();

    roles::init(&host)?;
    let bridge = spawn_host_bridge(Arc::clone(&host)).context("installing signal handlers")?;
    host.start();

    for _ in 0..args.launch {
        match roles::launch(&host).await {
            Ok(pid) => info!(%pid, "launched extra instance"),
            Err(e) => warn!(label = e.as_label(), hint = e.hint(), "{}", e.as_message()),
        }
    }

    bridge.await.context("signal bridge task failed")?;
    info!(phase = ?host.phase(), "host stopped");
    Ok(())
}
