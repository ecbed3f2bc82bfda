//! spec.md §8 scenario 1: master publishes, worker echoes.

use crate::common;
use amqp_connector::config::Role;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn master_publishes_worker_echoes() {
    common::reset_broker();

    let master = common::connect(Role::Master);
    let worker = common::connect(Role::Worker);

    for i in 0..5 {
        master.put(format!("Oh HAI {i}").into_bytes(), None);
    }

    let mut received_by_worker = Vec::new();
    let got_all_tasks = common::wait_until(
        || {
            if let Ok(Some(payload)) = worker.get() {
                received_by_worker.push(payload);
            }
            received_by_worker.len() == 5
        },
        Duration::from_secs(5),
    );
    assert!(got_all_tasks, "worker should have received 5 tasks, got {}", received_by_worker.len());

    for _ in 0..5 {
        worker.put(b"Hi Thar!".to_vec(), None);
    }

    let mut received_by_master = 0;
    let got_all_responses = common::wait_until(
        || {
            while let Ok(Some(payload)) = master.get() {
                assert_eq!(payload, b"Hi Thar!");
                received_by_master += 1;
            }
            received_by_master == 5
        },
        Duration::from_secs(5),
    );
    assert!(got_all_responses, "master should have received 5 responses, got {received_by_master}");

    master.stop();
    worker.stop();
}
