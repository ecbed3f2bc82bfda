//! Two-layer liveness check driven by the Transfer Loop (spec.md §4.2).
//!
//! The underlying transport performs I/O only inside explicit calls, so a
//! bare protocol heartbeat tick does not prove the receive side is making
//! progress. The application layer closes that gap with a self-addressed
//! round trip through a private exchange: publish to `nak`, receive back
//! off `nak.q`, and watch the gap between sends and receipts.

use crate::config::SessionConfig;
use crate::counters::SessionCounters;
use crate::error::{ConnectorError, Result};
use crate::transport::Transport;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Drives both heartbeat layers for one session.
pub struct HeartbeatController {
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
    keepalive_exchange: String,
}

impl HeartbeatController {
    pub fn new(config: &SessionConfig, keepalive_exchange: impl Into<String>) -> Self {
        Self {
            keepalive_interval: config.keepalive_interval,
            keepalive_timeout: config.keepalive_timeout,
            keepalive_exchange: keepalive_exchange.into(),
        }
    }

    /// Seeds `last_keepalive_received` to "now" so a freshly (re)connected
    /// session isn't immediately judged silent.
    pub fn prime(&self, counters: &SessionCounters) {
        counters.set_last_keepalive_received_millis(now_millis());
    }

    /// Step 2 of spec.md §4.3: publish a keepalive if due, advancing
    /// `last_keepalive_sent` by exactly `keepalive_interval` rather than
    /// snapping to `now`, to preserve cadence under scheduling jitter.
    pub fn maybe_send_keepalive(
        &self,
        transport: &mut dyn Transport,
        counters: &SessionCounters,
    ) -> Result<()> {
        let due_at = counters.last_keepalive_sent_millis() + self.keepalive_interval.as_millis() as i64;
        if now_millis() < due_at {
            return Ok(());
        }

        transport.publish(&self.keepalive_exchange, "nak", b"keepalive", false)?;
        counters.set_last_keepalive_sent_millis(due_at);
        Ok(())
    }

    /// Step 3: the protocol-level tick.
    pub fn protocol_tick(&self, transport: &mut dyn Transport) -> Result<()> {
        transport.heartbeat_tick()
    }

    /// Step 4: raise a fault if the private keepalive hasn't round-tripped
    /// within `keepalive_timeout`.
    pub fn check_timeout(&self, counters: &SessionCounters) -> Result<()> {
        let deadline = counters.last_keepalive_received_millis() + self.keepalive_timeout.as_millis() as i64;
        if now_millis() > deadline {
            Err(ConnectorError::HeartbeatTimeout)
        } else {
            Ok(())
        }
    }

    /// Called when `drain_events`/the keepalive consumer observes the
    /// private round-trip completing.
    pub fn record_keepalive_received(&self, counters: &SessionCounters) {
        counters.set_last_keepalive_received_millis(now_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::transport::fake::{self, FakeTransport};

    fn controller(interval_ms: u64, timeout_ms: u64) -> HeartbeatController {
        let config = SessionConfig::builder("h")
            .keepalive_interval(Duration::from_millis(interval_ms))
            .keepalive_timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap();
        HeartbeatController::new(&config, "nak-test.e")
    }

    #[test]
    fn fresh_session_does_not_immediately_timeout() {
        fake::reset();
        let hb = controller(10_000, 120_000);
        let counters = SessionCounters::new();
        hb.prime(&counters);
        assert!(hb.check_timeout(&counters).is_ok());
    }

    #[test]
    fn timeout_trips_once_deadline_passes() {
        let hb = controller(10, 5);
        let counters = SessionCounters::new();
        counters.set_last_keepalive_received_millis(now_millis() - 1000);
        assert!(matches!(
            hb.check_timeout(&counters),
            Err(ConnectorError::HeartbeatTimeout)
        ));
    }

    #[test]
    fn keepalive_send_advances_by_exact_interval_not_to_now() {
        fake::reset();
        let hb = controller(10, 120_000);
        let counters = SessionCounters::new();
        let mut transport = FakeTransport::new();

        let start = now_millis();
        counters.set_last_keepalive_sent_millis(start - 100);
        hb.maybe_send_keepalive(&mut transport, &counters).unwrap();

        assert_eq!(counters.last_keepalive_sent_millis(), start - 100 + 10);
    }
}
