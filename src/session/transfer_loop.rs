//! The single-threaded poll loop (spec.md §4.3).
//!
//! Runs until `runstate == stopped` and the outbound queue is empty. Every
//! iteration performs the same eight steps in the same order; nothing here
//! ever catches a fault to keep going - faults always escape to the
//! Supervisor (spec.md §7 "propagation policy").

use super::heartbeat::HeartbeatController;
use super::BrokerSession;
use crate::config::{Mode, SessionConfig};
use crate::counters::SessionCounters;
use crate::error::Result;
use crate::queues::SessionQueues;
use crate::runstate::RunStateFlag;
use crate::transport::Transport;
use std::time::Duration;

const ASYNC_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(15);

pub(super) fn run(session: &mut BrokerSession, runstate: &RunStateFlag) -> Result<()> {
    let mut status_accumulator = Duration::ZERO;

    loop {
        session.reconnect_if_needed()?;

        run_iteration(session)?;

        status_accumulator += session.config.poll_rate;
        if status_accumulator >= STATUS_LOG_INTERVAL {
            status_accumulator = Duration::ZERO;
            tracing::info!(
                role = ?session.role(),
                sent = session.counters.sent_messages(),
                received = session.counters.recv_messages(),
                fetched = session.counters.session_fetched(),
                active = session.counters.active(),
                "transfer loop status",
            );
        }

        if runstate.is_stopped() && session.queues.outbound.is_empty() {
            return Ok(());
        }
    }
}

/// One pass of steps 2-7; split out of `run` so every field borrow it
/// needs is disjoint and scoped to this call.
fn run_iteration(session: &mut BrokerSession) -> Result<()> {
    let BrokerSession {
        transport,
        ref heartbeat,
        ref counters,
        ref queues,
        ref config,
        ..
    } = session;
    let transport: &mut dyn Transport = &mut **transport;
    let counters: &SessionCounters = counters;

    heartbeat.maybe_send_keepalive(transport, counters)?;
    heartbeat.protocol_tick(transport)?;
    heartbeat.check_timeout(counters)?;

    std::thread::sleep(config.poll_rate);

    match config.mode {
        Mode::Asynchronous => drain_async(transport, heartbeat, counters, queues)?,
        Mode::Synchronous => {
            if counters.active() == 0 {
                let fetched = bounded_fetch(transport, counters, queues, config)?;
                counters.add_active(fetched);
            }
        }
    }

    publish_outbound(transport, counters, queues, config)
}

fn drain_async(
    transport: &mut dyn Transport,
    heartbeat: &HeartbeatController,
    counters: &SessionCounters,
    queues: &SessionQueues,
) -> Result<()> {
    let drained = transport.drain_events(ASYNC_DRAIN_TIMEOUT)?;
    if drained.keepalive_received {
        heartbeat.record_keepalive_received(counters);
    }
    for delivery in drained.inbound {
        if queues.inbound.push(delivery.payload).is_err() {
            tracing::warn!("inbound local queue full, dropping delivery");
        } else {
            counters.record_fetched(1);
            counters.record_received();
        }
    }
    Ok(())
}

/// spec.md §4.4: repeated `basic_get` against the inbound broker queue.
fn bounded_fetch(
    transport: &mut dyn Transport,
    counters: &SessionCounters,
    queues: &SessionQueues,
    config: &SessionConfig,
) -> Result<u64> {
    let queue = config.consume_queue();
    let limit = config.session_fetch_limit;
    let prefetch = config.prefetch as u64;
    let mut fetched = 0u64;

    loop {
        if counters.fetch_limit_reached(limit) {
            break;
        }

        match transport.basic_get(queue)? {
            Some(delivery) => {
                if queues.inbound.push(delivery.payload).is_err() {
                    tracing::warn!("inbound local queue full, dropping fetched message");
                }
                counters.record_fetched(1);
                counters.record_received();
                fetched += 1;

                if fetched > prefetch {
                    break;
                }
            }
            None => break,
        }
    }

    Ok(fetched)
}

/// spec.md §4.5: FIFO drain of the outbound local queue.
fn publish_outbound(
    transport: &mut dyn Transport,
    counters: &SessionCounters,
    queues: &SessionQueues,
    config: &SessionConfig,
) -> Result<()> {
    let exchange = config.publish_exchange();
    let routing_key = SessionConfig::routing_key_for(config.publish_queue());
    let persistent = config.durable;

    while let Some(payload) = queues.outbound.pop() {
        transport.publish(exchange, routing_key, &payload, persistent)?;
        counters.record_sent();
    }

    Ok(())
}
