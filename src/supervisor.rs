//! Restart-on-fault wrapper around the Transfer Loop (spec.md §4.6).
//!
//! ```text
//! while runstate != stopped:
//!     if no session: session = new BrokerSession(config)
//!     try: session.run()
//!     except any fault:
//!         log; teardown session; session = none
//!         if runstate != stopped: continue
//! ```

use crate::config::SessionConfig;
use crate::counters::{CountersSlot, SessionCounters};
use crate::error::ConnectorError;
use crate::queues::SessionQueues;
use crate::runstate::RunStateFlag;
use crate::session::BrokerSession;
use crate::transport::lapin_transport::LapinTransport;
use crate::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Enforces spec.md §3 invariant 4: at most one live session at a time.
/// Shared between a `Supervisor` and the `ConnectorHandle` that owns it so
/// tests can observe it without reaching into the supervisor thread.
#[derive(Clone, Default)]
pub struct ActiveSessionCounter(Arc<AtomicU64>);

impl ActiveSessionCounter {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Asserts the counter is currently `0`, sets it to `1`, and returns a
    /// guard that resets it to `0` on drop - the RAII rendition of spec.md
    /// §9's "model the session as a scoped resource, guaranteed release".
    fn acquire(&self) -> Result<ActiveSessionGuard, ConnectorError> {
        if self
            .0
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ConnectorError::BadConfig(
                "a session is already active for this handle".to_string(),
            ));
        }
        Ok(ActiveSessionGuard(self.0.clone()))
    }
}

pub struct ActiveSessionGuard(Arc<AtomicU64>);

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Factory for the `Transport` a fresh `BrokerSession` is built on.
/// Production code defaults to `lapin`; tests inject an in-memory fake.
pub type TransportFactory = Arc<dyn Fn() -> Result<Box<dyn Transport>, ConnectorError> + Send + Sync>;

pub struct Supervisor {
    config: SessionConfig,
    queues: SessionQueues,
    runstate: RunStateFlag,
    active: ActiveSessionCounter,
    counters_slot: CountersSlot,
    transport_factory: TransportFactory,
}

impl Supervisor {
    pub fn new(
        config: SessionConfig,
        queues: SessionQueues,
        runstate: RunStateFlag,
        active: ActiveSessionCounter,
        counters_slot: CountersSlot,
    ) -> Self {
        Self::with_transport_factory(
            config,
            queues,
            runstate,
            active,
            counters_slot,
            Arc::new(|| Ok(Box::new(LapinTransport::new()?) as Box<dyn Transport>)),
        )
    }

    pub fn with_transport_factory(
        config: SessionConfig,
        queues: SessionQueues,
        runstate: RunStateFlag,
        active: ActiveSessionCounter,
        counters_slot: CountersSlot,
        transport_factory: TransportFactory,
    ) -> Self {
        Self {
            config,
            queues,
            runstate,
            active,
            counters_slot,
            transport_factory,
        }
    }

    /// Runs until `runstate == stopped` and the outbound queue is drained.
    /// Meant to be the body of the dedicated supervisor thread.
    pub fn run(&self) {
        while !self.runstate.is_stopped() {
            let guard = match self.active.acquire() {
                Ok(guard) => guard,
                Err(err) => {
                    tracing::error!(error = %err, "active-session counter already held, refusing to start a second session");
                    return;
                }
            };

            let transport = match (self.transport_factory)() {
                Ok(transport) => transport,
                Err(err) => {
                    tracing::error!(error = %err, "failed to construct transport, retrying");
                    drop(guard);
                    std::thread::sleep(self.config.poll_rate);
                    continue;
                }
            };

            let counters = Arc::new(SessionCounters::new());
            self.counters_slot.publish(counters.clone());

            let mut session = match BrokerSession::new(self.config.clone(), self.queues.clone(), counters, transport, guard) {
                Ok(session) => session,
                Err(err) => {
                    tracing::error!(error = %err, "failed to construct broker session, retrying");
                    if self.runstate.is_stopped() {
                        return;
                    }
                    std::thread::sleep(self.config.poll_rate);
                    continue;
                }
            };

            match session.run(&self.runstate) {
                Ok(()) => return,
                Err(err) => {
                    tracing::error!(error = %err, "session fault, tearing down and restarting");
                }
            }

            if self.runstate.is_stopped() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_session_counter_rejects_double_acquire() {
        let counter = ActiveSessionCounter::new();
        let guard = counter.acquire().unwrap();
        assert_eq!(counter.get(), 1);
        assert!(counter.acquire().is_err());
        drop(guard);
        assert_eq!(counter.get(), 0);
        assert!(counter.acquire().is_ok());
    }
}
