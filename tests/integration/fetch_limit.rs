//! spec.md §8 scenario 2: a session's `session_fetch_limit` is a hard
//! ceiling both on what `get()` will hand back and on what the Transfer
//! Loop keeps pulling off the broker queue.

use crate::common;
use amqp_connector::config::{Role, SessionConfig};
use amqp_connector::transport::fake::FakeTransport;
use amqp_connector::transport::Transport;
use amqp_connector::ConnectorError;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn fourth_get_past_the_limit_is_rejected() {
    common::reset_broker();

    let master = common::connect(Role::Master);
    let worker_cfg = SessionConfig::builder("fake-broker")
        .worker()
        .session_fetch_limit(3)
        .poll_rate(Duration::from_millis(20))
        .build()
        .unwrap();
    let worker = amqp_connector::ConnectorHandle::with_transport_factory(
        worker_cfg,
        common::fake_transport_factory(),
    );

    for i in 0..5 {
        master.put(format!("task {i}").into_bytes(), None);
    }

    let mut received = Vec::new();
    let mut saw_limit_error = false;
    common::wait_until(
        || {
            match worker.get() {
                Ok(Some(payload)) => received.push(payload),
                Ok(None) => {}
                Err(ConnectorError::FetchLimitExceeded) => saw_limit_error = true,
                Err(other) => panic!("unexpected error: {other}"),
            }
            received.len() == 3 && saw_limit_error
        },
        Duration::from_secs(5),
    );

    assert_eq!(received.len(), 3, "only the first 3 tasks should ever reach the local queue");
    assert!(saw_limit_error, "get() should reject once the session's fetch limit is hit");

    // The Transfer Loop must have stopped polling `basic_get` once the
    // limit tripped, leaving the remaining tasks on the broker queue.
    let mut leftover = FakeTransport::new();
    assert!(
        leftover.basic_get("task.q").unwrap().is_some(),
        "worker should have stopped fetching after reaching its limit"
    );

    master.stop();
    worker.stop();
}
