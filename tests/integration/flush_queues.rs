//! spec.md §8 scenario 6: `flush_queues` purges whatever was already
//! sitting on a session's queues at construction time.

use crate::common;
use amqp_connector::config::{Role, SessionConfig};
use amqp_connector::transport::fake::FakeTransport;
use amqp_connector::transport::Transport;
use amqp_connector::ConnectorHandle;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn flush_queues_purges_stale_messages_on_connect() {
    common::reset_broker();

    // Bind task.q and seed it with stale messages, without starting any
    // session that would otherwise drain it immediately.
    let binder_cfg = SessionConfig::builder("fake-broker").worker().build().unwrap();
    let mut binder = FakeTransport::new();
    binder.connect(&binder_cfg).unwrap();
    binder.declare_topology(&binder_cfg, "nak-seed.e").unwrap();
    for _ in 0..3 {
        binder
            .publish(
                binder_cfg.task_exchange.as_str(),
                SessionConfig::routing_key_for(&binder_cfg.task_queue),
                b"stale",
                false,
            )
            .unwrap();
    }

    let flush_cfg = SessionConfig::builder("fake-broker")
        .worker()
        .flush_queues(true)
        .poll_rate(Duration::from_millis(20))
        .build()
        .unwrap();
    let worker = ConnectorHandle::with_transport_factory(flush_cfg, common::fake_transport_factory());

    // Give the Transfer Loop a few iterations to prove nothing ever shows
    // up - the stale messages should have been purged at declare_topology.
    let saw_anything = common::wait_until(
        || worker.get().ok().flatten().is_some(),
        Duration::from_millis(300),
    );
    assert!(!saw_anything, "flush_queues should have purged the stale messages");

    worker.stop();
}
