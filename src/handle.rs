//! Connector Handle (spec.md §4.7): the caller-visible object.
//!
//! Out of scope per spec.md §1 ("the caller-facing handle ... is an
//! external collaborator"), but carried here anyway since a crate with no
//! public entry point isn't a usable crate - this is the thin, idiomatic
//! surface spec.md assumes exists around the core it actually specifies.

use crate::config::SessionConfig;
use crate::counters::CountersSlot;
use crate::error::{ConnectorError, Result};
use crate::queues::SessionQueues;
use crate::runstate::RunStateFlag;
use crate::supervisor::{ActiveSessionCounter, Supervisor, TransportFactory};
use crate::transport::lapin_transport::LapinTransport;
use crate::transport::Transport;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Bound on the local queues. Not part of `SessionConfig` because it's a
/// property of the handle's memory footprint, not the broker session.
const LOCAL_QUEUE_CAPACITY: usize = 4096;

pub struct ConnectorHandle {
    config: SessionConfig,
    queues: SessionQueues,
    runstate: RunStateFlag,
    active: ActiveSessionCounter,
    counters_slot: CountersSlot,
    transport_factory: TransportFactory,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectorHandle {
    /// Spawns the supervisor thread and returns a handle backed by a real
    /// `lapin` connection.
    pub fn connect(config: SessionConfig) -> Self {
        Self::with_transport_factory(
            config,
            Arc::new(|| Ok(Box::new(LapinTransport::new()?) as Box<dyn Transport>)),
        )
    }

    /// As [`Self::connect`], but with an injected transport factory - used
    /// by the test suite to run against [`crate::transport::fake::FakeTransport`]
    /// instead of a real broker.
    pub fn with_transport_factory(config: SessionConfig, transport_factory: TransportFactory) -> Self {
        let handle = Self {
            config,
            queues: SessionQueues::bounded(LOCAL_QUEUE_CAPACITY),
            runstate: RunStateFlag::new(),
            active: ActiveSessionCounter::new(),
            counters_slot: CountersSlot::new(),
            transport_factory,
            thread: Mutex::new(None),
        };
        handle.check_launch_thread();
        handle
    }

    /// Idempotent supervisor-thread (re)start (spec.md §4.7). Called at the
    /// top of every public operation.
    pub fn check_launch_thread(&self) {
        let mut slot = self.thread.lock().unwrap();

        let dead = match slot.as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        };
        if !dead {
            return;
        }

        if let Some(previous) = slot.take() {
            if previous.join().is_err() {
                tracing::warn!("supervisor thread panicked; respawning");
            }
        } else {
            tracing::info!("starting supervisor thread");
        }

        let supervisor = Supervisor::with_transport_factory(
            self.config.clone(),
            self.queues.clone(),
            self.runstate.clone(),
            self.active.clone(),
            self.counters_slot.clone(),
            self.transport_factory.clone(),
        );
        *slot = Some(std::thread::spawn(move || supervisor.run()));
    }

    /// Enqueue an outbound payload. If `synchronous_threshold` is set,
    /// blocks (polled sleep) while the outbound queue's length exceeds it -
    /// the standardized reading of spec.md §9's `synchronous_threshold`
    /// open question ("positive integer threshold, else no backpressure").
    pub fn put(&self, payload: Vec<u8>, synchronous_threshold: Option<NonZeroUsize>) {
        self.check_launch_thread();

        if let Some(threshold) = synchronous_threshold {
            while self.queues.outbound.len() > threshold.get() {
                std::thread::sleep(self.config.poll_rate);
            }
        }

        self.queues.outbound.push_blocking(payload);
    }

    /// Non-blocking pop from the inbound queue. Buffered messages are
    /// always drained first, even after the session's fetch limit has been
    /// reached - the limit caps what the Transfer Loop pulls off the
    /// broker, not what the caller can read back out of its own local
    /// queue. Only once the queue is empty does reaching the limit turn
    /// into `Err(FetchLimitExceeded)` (spec.md §4.7, §8 scenario 2).
    pub fn get(&self) -> Result<Option<Vec<u8>>> {
        self.check_launch_thread();

        let counters = self.counters_slot.current();
        match self.queues.inbound.pop() {
            Some(payload) => {
                counters.dec_active();
                Ok(Some(payload))
            }
            None => {
                if counters.fetch_limit_reached(self.config.session_fetch_limit) {
                    Err(ConnectorError::FetchLimitExceeded)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Sets `runstate = stopped`, waits for the outbound queue to drain
    /// (polled every second with progress logging), then joins the
    /// supervisor thread.
    pub fn stop(&self) {
        self.runstate.stop();

        while !self.queues.outbound.is_empty() {
            tracing::info!(remaining = self.queues.outbound.len(), "draining outbound queue");
            std::thread::sleep(Duration::from_secs(1));
        }

        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                tracing::warn!("supervisor thread panicked during stop");
            }
        }
    }
}
