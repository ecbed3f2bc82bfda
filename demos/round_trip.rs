//! Master/worker round-trip demo.
//!
//! Connects two handles against the same broker - one `master`, one
//! `worker` - puts a handful of messages through the master, and prints
//! whatever the worker echoes back. Takes the broker host from `AMQP_HOST`
//! (default `localhost`). Not wired into any CLI argument parser; this is
//! the thin smoke-test harness spec.md §1 treats as an external collaborator.

use amqp_connector::{ConnectorHandle, Role, SessionConfig};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let host = std::env::var("AMQP_HOST").unwrap_or_else(|_| "localhost".to_string());

    let master_config = SessionConfig::builder(&host)
        .master()
        .flush_queues(true)
        .build()
        .expect("valid master config");
    let worker_config = SessionConfig::builder(&host).worker().build().expect("valid worker config");

    tracing::info!(role = ?Role::Master, "connecting");
    let master = ConnectorHandle::connect(master_config);
    tracing::info!(role = ?Role::Worker, "connecting");
    let worker = ConnectorHandle::connect(worker_config);

    for i in 0..5 {
        master.put(format!("Oh HAI {i}").into_bytes(), None);
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    let mut echoed = 0;
    while echoed < 5 && std::time::Instant::now() < deadline {
        match worker.get() {
            Ok(Some(task)) => {
                println!("worker received: {}", String::from_utf8_lossy(&task));
                worker.put(b"Hi Thar!".to_vec(), None);
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(100)),
            Err(err) => {
                tracing::error!(error = %err, "worker.get() failed");
                break;
            }
        }

        if let Ok(Some(response)) = master.get() {
            println!("master received: {}", String::from_utf8_lossy(&response));
            echoed += 1;
        }
    }

    master.stop();
    worker.stop();
}
