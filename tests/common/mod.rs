//! Shared fixtures for the integration suite: builds `ConnectorHandle`s
//! wired to the in-memory fake broker instead of a real one.

use amqp_connector::config::{Role, SessionConfig};
use amqp_connector::supervisor::TransportFactory;
use amqp_connector::transport::fake::{self, FakeTransport};
use amqp_connector::transport::Transport;
use amqp_connector::ConnectorHandle;
use std::sync::Arc;
use std::time::Duration;

pub fn fake_transport_factory() -> TransportFactory {
    Arc::new(|| Ok(Box::new(FakeTransport::new()) as Box<dyn Transport>))
}

pub fn config(role: Role) -> SessionConfig {
    let builder = SessionConfig::builder("fake-broker").poll_rate(Duration::from_millis(20));
    match role {
        Role::Master => builder.master(),
        Role::Worker => builder.worker(),
    }
    .build()
    .expect("valid test config")
}

pub fn connect(role: Role) -> ConnectorHandle {
    ConnectorHandle::with_transport_factory(config(role), fake_transport_factory())
}

/// Clears the process-wide fake broker state. Call at the start of every
/// test that touches it - the fake broker is a shared global, so tests
/// must not run concurrently against it (see `#[serial]`).
pub fn reset_broker() {
    fake::reset();
}

pub fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    predicate()
}
