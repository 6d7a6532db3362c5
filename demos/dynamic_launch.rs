//! # Example: dynamic_launch
//!
//! Launch instances on demand and observe the three failure classes.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► host (max_workers = 3, max_running = 2), start()
//!   ├─► launch #1, #2            Ok(pid)
//!   ├─► launch #3, #4            slot free, no running capacity ─► StartFailed
//!   ├─► manual handle            wait_for_startup / terminate / wait_for_shutdown
//!   └─► second host (max_workers = 1) stuck in recovery
//!         ├─► launcher A waits, holding the only slot
//!         ├─► launcher B         table full ─► RegistrationRejected
//!         └─► shutdown_immediate() ─► A gets HostUnavailable
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example dynamic_launch
//! ```

use std::sync::Arc;
use std::time::Duration;

use bgvisor::backend::MemoryConnector;
use bgvisor::{
    Host, HostConfig, LaunchError, LaunchRequest, LogWriter, StartPolicy, Subscribe, Value, launch,
    logging, roles,
};

fn report(what: &str, res: &Result<bgvisor::Pid, LaunchError>) {
    match res {
        Ok(pid) => println!("{what}: started, pid {pid}"),
        Err(e) => println!("{what}: {} ({})", e.as_label(), e.hint()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let cfg = HostConfig {
        max_workers: 3,
        max_running: 2,
        grace: Duration::from_secs(2),
        ..HostConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let host = Host::builder(cfg)
        .with_connector(Arc::new(MemoryConnector::scalar(Value::Int(7))))
        .with_subscribers(subs)
        .build();
    host.start();

    let timeout = Duration::from_secs(5);
    for i in 1..=4 {
        let res = roles::launch(&host).await;
        report(&format!("launch #{i}"), &res);
    }
    println!("registered: {:?}", host.registered());

    // A handle lets the caller stop the instance it started.
    let req = LaunchRequest::new("count roles (manual)", roles::entry());
    match host.register_dynamic(req.registration().clone()) {
        Ok(mut handle) => {
            println!("manual: {:?}", handle.wait_for_startup(timeout).await);
            handle.terminate();
            println!("manual: {:?}", handle.wait_for_shutdown().await);
        }
        Err(e) => println!("manual: {}", e.as_message()),
    }

    // Recovery never finishes on this host; the launcher is left waiting.
    let single = HostConfig {
        max_workers: 1,
        ..HostConfig::default()
    };
    let pending = Host::builder(single)
        .with_connector(Arc::new(MemoryConnector::scalar(Value::Int(1))))
        .build();
    pending.start_in_recovery();
    let waiter = tokio::spawn({
        let pending = Arc::clone(&pending);
        async move {
            let req =
                LaunchRequest::new("late", roles::entry()).with_start(StartPolicy::RecoveryFinished);
            launch(&pending, req, Duration::from_secs(30)).await
        }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    let second = launch(&pending, LaunchRequest::new("later", roles::entry()), timeout).await;
    report("second launcher", &second);
    pending.shutdown_immediate();
    report("pending host", &waiter.await?);

    host.shutdown().await?;
    Ok(())
}
