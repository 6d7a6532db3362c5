//! # Example: count_roles
//!
//! The role-count worker against the in-memory backend.
//!
//! Demonstrates how to:
//! - Register the static instance before the host starts.
//! - Wake the worker early and change its interval with a reload.
//! - Shut the host down gracefully.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► roles::init(host)             registered, starts after recovery
//!   ├─► host.start()
//!   ├─► sleep 2.5s                    cycles at 1s, 2s
//!   ├─► source.set(500ms) + reload    next wait uses the new interval
//!   ├─► sleep 2s                      four more cycles
//!   └─► host.shutdown()               terminate, wait within grace
//! ```
//!
//! ## Run
//! ```bash
//! BGVISOR_LOG=debug cargo run --example count_roles
//! ```

use std::sync::Arc;
use std::time::Duration;

use bgvisor::backend::MemoryConnector;
use bgvisor::{
    Host, HostConfig, LogWriter, ResultSet, SharedSource, Subscribe, Value, WorkerConfig, logging,
    roles,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    // The role count grows by one every cycle.
    let conn = MemoryConnector::new(|_op, n| Ok(ResultSet::scalar("count", Value::Int(n as i64 + 3))));
    let source = Arc::new(SharedSource::new(WorkerConfig::from_secs(1, "postgres")?));

    let mut cfg = HostConfig::default();
    cfg.grace = Duration::from_secs(5);

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let host = Host::builder(cfg)
        .with_connector(Arc::new(conn.clone()))
        .with_config_source(source.clone())
        .with_subscribers(subs)
        .build();

    roles::init(&host)?;
    host.start();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    source.set(WorkerConfig::new(Duration::from_millis(500), "postgres")?);
    host.reload();
    tokio::time::sleep(Duration::from_secs(2)).await;

    for row in host.activity().snapshot() {
        println!("{row:?}");
    }

    host.shutdown().await?;
    println!("{:?}", conn.stats());
    Ok(())
}
