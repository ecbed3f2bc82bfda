//! Broker Session (spec.md §4.1): owns one AMQP connection + channel for
//! its lifetime, declares topology, and runs the Transfer Loop.

pub mod heartbeat;
mod transfer_loop;

use crate::config::{Role, SessionConfig};
use crate::counters::SessionCounters;
use crate::error::Result;
use crate::queues::SessionQueues;
use crate::runstate::RunStateFlag;
use crate::supervisor::ActiveSessionGuard;
use crate::transport::Transport;
use heartbeat::HeartbeatController;
use std::sync::Arc;

/// Where a session sits in its lifecycle (spec.md §3 "Lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Configured,
    Running,
    Draining,
    Closed,
}

pub struct BrokerSession {
    config: SessionConfig,
    queues: SessionQueues,
    counters: Arc<SessionCounters>,
    transport: Box<dyn Transport>,
    heartbeat: HeartbeatController,
    state: SessionState,
    keepalive_exchange: String,
    /// Held for its `Drop` side effect: releases the active-session slot
    /// when this session is torn down, however that happens.
    _active_guard: ActiveSessionGuard,
}

impl BrokerSession {
    /// Construction per spec.md §4.1: connect, open channel, set QoS,
    /// declare exchanges/queues, role-conditional bind, private keepalive
    /// topology, optional flush. `counters` is supplied by the Supervisor,
    /// which also publishes it to the `CountersSlot` the `ConnectorHandle`
    /// reads from - fresh per session, per spec.md §3's "session-scoped,
    /// non-persistent" counters.
    pub fn new(
        config: SessionConfig,
        queues: SessionQueues,
        counters: Arc<SessionCounters>,
        mut transport: Box<dyn Transport>,
        active_guard: ActiveSessionGuard,
    ) -> Result<Self> {
        let keepalive_exchange = config.keepalive_exchange_name();

        transport.connect(&config)?;
        transport.set_qos(config.prefetch)?;
        transport.declare_topology(&config, &keepalive_exchange)?;
        transport.start_keepalive_consumer("nak.q")?;

        if config.mode == crate::config::Mode::Asynchronous {
            transport.start_consumer(config.consume_queue(), config.ack_rx)?;
        }

        let heartbeat = HeartbeatController::new(&config, keepalive_exchange.clone());
        heartbeat.prime(&counters);

        Ok(Self {
            config,
            queues,
            counters,
            transport,
            heartbeat,
            state: SessionState::Configured,
            keepalive_exchange,
            _active_guard: active_guard,
        })
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the Transfer Loop until graceful stop or a fault. On either
    /// exit path, tears down the channel/connection first.
    pub fn run(&mut self, runstate: &RunStateFlag) -> Result<()> {
        self.state = SessionState::Running;
        let result = transfer_loop::run(self, runstate);
        self.state = SessionState::Draining;
        self.teardown();
        result
    }

    /// Step 1 of spec.md §4.3: re-run the §4.1 construction in place when
    /// the transport reports itself disconnected.
    pub(crate) fn reconnect_if_needed(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }

        self.state = SessionState::Connecting;
        self.transport.connect(&self.config)?;
        self.transport.set_qos(self.config.prefetch)?;
        self.transport
            .declare_topology(&self.config, &self.keepalive_exchange)?;
        self.transport.start_keepalive_consumer("nak.q")?;
        if self.config.mode == crate::config::Mode::Asynchronous {
            self.transport
                .start_consumer(self.config.consume_queue(), self.config.ack_rx)?;
        }
        self.heartbeat.prime(&self.counters);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Closes the channel/connection, swallowing any errors (spec.md
    /// §4.3: "errors during teardown are swallowed").
    pub fn teardown(&mut self) {
        if let Err(err) = self.transport.set_qos(0) {
            tracing::warn!(error = %err, "failed to reset prefetch during teardown");
        }
        if let Err(err) = self.transport.close() {
            tracing::warn!(error = %err, "failed to close transport during teardown");
        }
        self.state = SessionState::Closed;
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn queues(&self) -> &SessionQueues {
        &self.queues
    }

    pub(crate) fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub(crate) fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub(crate) fn heartbeat(&self) -> &HeartbeatController {
        &self.heartbeat
    }

    pub(crate) fn keepalive_exchange(&self) -> &str {
        &self.keepalive_exchange
    }
}
