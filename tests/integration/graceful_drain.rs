//! spec.md §8 scenario 5: `stop()` blocks until every `put()`-ed message
//! has actually reached the broker, never truncating the outbound queue.

use crate::common;
use amqp_connector::config::{Role, SessionConfig};
use amqp_connector::transport::fake::FakeTransport;
use amqp_connector::transport::Transport;
use serial_test::serial;

const MESSAGE_COUNT: usize = 100;

#[test]
#[serial]
fn stop_waits_for_the_outbound_queue_to_drain() {
    common::reset_broker();

    // Bind task.q up front so publishes from the master below land
    // somewhere, without spinning up a worker session that would consume
    // them out from under this test.
    let worker_cfg = common::config(Role::Worker);
    let mut binder = FakeTransport::new();
    binder.connect(&worker_cfg).unwrap();
    binder.declare_topology(&worker_cfg, "nak-seed.e").unwrap();

    let master = common::connect(Role::Master);
    for i in 0..MESSAGE_COUNT {
        master.put(format!("task {i}").into_bytes(), None);
    }

    master.stop();

    let mut drained = FakeTransport::new();
    let mut delivered = 0usize;
    while drained.basic_get(&SessionConfig::builder("fake-broker").build().unwrap().task_queue)
        .unwrap()
        .is_some()
    {
        delivered += 1;
    }

    assert_eq!(
        delivered, MESSAGE_COUNT,
        "stop() must not return until every put() message has been published"
    );
}
