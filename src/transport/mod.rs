//! AMQP transport abstraction.
//!
//! [`Transport`] is the seam between session logic (`crate::session`) and
//! the concrete wire-protocol client. The only production implementation,
//! [`lapin_transport::LapinTransport`], drives `lapin` - the AMQP framing
//! library itself is explicitly an external collaborator (spec.md §1); this
//! crate never speaks the wire protocol directly. A second, in-memory
//! implementation lives under `#[cfg(test)]` / `cfg(feature = "test-util")`
//! so session and Transfer Loop logic can be exercised without a broker,
//! mirroring the teacher's pattern of routing all network access through a
//! narrow client type that tests can swap out.

pub mod lapin_transport;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

use crate::config::SessionConfig;
use crate::error::Result;
use std::time::Duration;

/// One message as delivered by the broker: an opaque payload plus whatever
/// handle the transport needs to ack it later.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
}

/// What a bounded `drain_events` call observed.
#[derive(Debug, Default)]
pub struct DrainResult {
    /// Messages delivered to the registered inbound consumer (async mode
    /// only). Already acked by the transport when `ack_rx` was set.
    pub inbound: Vec<Delivery>,
    /// Whether the private keepalive round-trip completed during this call.
    pub keepalive_received: bool,
}

/// Everything the Broker Session and Transfer Loop need from an AMQP
/// connection. Every method is blocking from the caller's perspective: the
/// `lapin`-backed implementation drives its async calls with
/// `Handle::block_on` from inside the single supervisor thread (spec.md §9
/// - "do not port this as task/future-based async").
pub trait Transport: Send {
    /// Open the connection and channel, with the configured socket timeout
    /// and negotiated protocol heartbeat.
    fn connect(&mut self, config: &SessionConfig) -> Result<()>;

    /// Declare exchanges/queues/bindings per spec.md §4.1: task + response
    /// exchanges, the role-conditional queue declare/bind, the private
    /// keepalive exchange + `nak.q`, and (if `flush_queues`) purging both
    /// role queues.
    fn declare_topology(&mut self, config: &SessionConfig, keepalive_exchange: &str) -> Result<()>;

    /// `basic_qos(prefetch_count, prefetch_size = 0, global = false)`.
    fn set_qos(&mut self, prefetch: u16) -> Result<()>;

    /// Register the push consumer used in asynchronous mode on `queue`.
    /// Acks deliveries itself when `ack_rx` is set.
    fn start_consumer(&mut self, queue: &str, ack_rx: bool) -> Result<()>;

    /// Register the private consumer on `nak.q` that feeds the keepalive
    /// round-trip.
    fn start_keepalive_consumer(&mut self, nak_queue: &str) -> Result<()>;

    /// `basic_publish` to `exchange` with `routing_key`; persistent
    /// delivery mode when `persistent`.
    fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8], persistent: bool) -> Result<()>;

    /// One `basic_get` against `queue`. `None` means the queue was empty.
    /// Already acked before returning (spec.md §4.4: "ack immediately").
    fn basic_get(&mut self, queue: &str) -> Result<Option<Delivery>>;

    /// Protocol-level heartbeat tick (spec.md §4.2 layer 1). For
    /// `lapin`, whose reactor drives protocol heartbeats on its own
    /// background task, this is a liveness check rather than an I/O call -
    /// see `lapin_transport` for the rationale.
    fn heartbeat_tick(&mut self) -> Result<()>;

    /// Drain any pending consumer deliveries (async inbound consumer, and
    /// the keepalive consumer) within `timeout`. A timeout with nothing
    /// delivered is not an error.
    fn drain_events(&mut self, timeout: Duration) -> Result<DrainResult>;

    /// Whether the underlying connection is still open.
    fn is_connected(&self) -> bool;

    /// Close channel then connection. Errors are for the caller to log and
    /// swallow (spec.md §4.3: "Errors during teardown are swallowed").
    fn close(&mut self) -> Result<()>;
}
