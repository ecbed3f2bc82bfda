//! In-memory [`Transport`] double used by the test suite.
//!
//! Mirrors a minimal direct-exchange broker: a process-wide registry of
//! named queues, each bound to an exchange under a routing key, so that two
//! independently constructed `FakeTransport`s (one per test session) can
//! exchange messages exactly as a master/worker pair would against a real
//! broker, without a network round-trip. Grounded in the teacher's pattern
//! of a narrow fake standing in for `BinanceClient` in unit tests.

use super::{Delivery, DrainResult, Transport};
use crate::config::{Role, SessionConfig};
use crate::error::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

#[derive(Default)]
struct Broker {
    /// routing key -> queue name -> messages.
    bindings: HashMap<String, Vec<String>>,
    queues: HashMap<String, VecDeque<Vec<u8>>>,
}

fn broker() -> &'static Mutex<Broker> {
    static BROKER: OnceLock<Mutex<Broker>> = OnceLock::new();
    BROKER.get_or_init(|| Mutex::new(Broker::default()))
}

/// Resets all shared broker state. Call at the start of any test that
/// depends on queues not leaking across test functions.
pub fn reset() {
    let mut broker = broker().lock().unwrap();
    broker.bindings.clear();
    broker.queues.clear();
}

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

pub struct FakeTransport {
    connected: bool,
    consume_queue: Option<String>,
    keepalive_queue: Option<String>,
    ack_rx: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            connected: false,
            consume_queue: None,
            keepalive_queue: None,
            ack_rx: true,
        }
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn declare_queue(broker: &mut Broker, queue: &str) {
    broker.queues.entry(queue.to_string()).or_default();
}

fn bind(broker: &mut Broker, routing_key: &str, queue: &str) {
    declare_queue(broker, queue);
    broker
        .bindings
        .entry(routing_key.to_string())
        .or_default()
        .push(queue.to_string());
}

impl Transport for FakeTransport {
    fn connect(&mut self, _config: &SessionConfig) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn declare_topology(&mut self, config: &SessionConfig, keepalive_exchange: &str) -> Result<()> {
        let mut broker = broker().lock().unwrap();

        match config.role {
            Role::Master => bind(
                &mut broker,
                SessionConfig::routing_key_for(&config.response_queue),
                &config.response_queue,
            ),
            Role::Worker => bind(
                &mut broker,
                SessionConfig::routing_key_for(&config.task_queue),
                &config.task_queue,
            ),
        }

        if config.flush_queues {
            if let Some(q) = broker.queues.get_mut(&config.task_queue) {
                q.clear();
            }
            if let Some(q) = broker.queues.get_mut(&config.response_queue) {
                q.clear();
            }
        }

        bind(&mut broker, "nak", "nak.q");
        let _ = keepalive_exchange;
        Ok(())
    }

    fn set_qos(&mut self, _prefetch: u16) -> Result<()> {
        Ok(())
    }

    fn start_consumer(&mut self, queue: &str, ack_rx: bool) -> Result<()> {
        self.consume_queue = Some(queue.to_string());
        self.ack_rx = ack_rx;
        Ok(())
    }

    fn start_keepalive_consumer(&mut self, nak_queue: &str) -> Result<()> {
        self.keepalive_queue = Some(nak_queue.to_string());
        Ok(())
    }

    fn publish(&mut self, _exchange: &str, routing_key: &str, payload: &[u8], _persistent: bool) -> Result<()> {
        let mut broker = broker().lock().unwrap();
        let queues = broker.bindings.get(routing_key).cloned().unwrap_or_default();
        for queue in queues {
            broker
                .queues
                .entry(queue)
                .or_default()
                .push_back(payload.to_vec());
        }
        Ok(())
    }

    fn basic_get(&mut self, queue: &str) -> Result<Option<Delivery>> {
        let mut broker = broker().lock().unwrap();
        let message = broker.queues.get_mut(queue).and_then(VecDeque::pop_front);
        Ok(message.map(|payload| Delivery {
            tag: NEXT_TAG.fetch_add(1, Ordering::Relaxed),
            payload,
        }))
    }

    fn heartbeat_tick(&mut self) -> Result<()> {
        Ok(())
    }

    fn drain_events(&mut self, _timeout: Duration) -> Result<DrainResult> {
        let mut result = DrainResult::default();
        let mut broker = broker().lock().unwrap();

        if let Some(queue) = &self.keepalive_queue {
            if let Some(q) = broker.queues.get_mut(queue) {
                if q.pop_front().is_some() {
                    result.keepalive_received = true;
                }
            }
        }

        if let Some(queue) = &self.consume_queue {
            if let Some(q) = broker.queues.get_mut(queue) {
                while let Some(payload) = q.pop_front() {
                    result.inbound.push(Delivery {
                        tag: NEXT_TAG.fetch_add(1, Ordering::Relaxed),
                        payload,
                    });
                }
            }
        }

        Ok(result)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn publish_from_master_is_visible_to_worker() {
        reset();

        let master_cfg = SessionConfig::builder("h").master().build().unwrap();
        let worker_cfg = SessionConfig::builder("h").worker().build().unwrap();

        let mut master = FakeTransport::new();
        master.connect(&master_cfg).unwrap();
        master.declare_topology(&master_cfg, "nak-test.e").unwrap();

        let mut worker = FakeTransport::new();
        worker.connect(&worker_cfg).unwrap();
        worker.declare_topology(&worker_cfg, "nak-test.e").unwrap();

        master
            .publish(
                &master_cfg.publish_exchange().to_string(),
                SessionConfig::routing_key_for(&master_cfg.publish_queue()),
                b"hello",
                false,
            )
            .unwrap();

        let delivery = worker.basic_get(&worker_cfg.consume_queue()).unwrap().unwrap();
        assert_eq!(delivery.payload, b"hello");
    }

    #[test]
    fn basic_get_on_empty_queue_returns_none() {
        reset();
        let cfg = SessionConfig::builder("h").build().unwrap();
        let mut t = FakeTransport::new();
        t.connect(&cfg).unwrap();
        t.declare_topology(&cfg, "nak-test.e").unwrap();
        assert!(t.basic_get(&cfg.task_queue).unwrap().is_none());
    }
}
