//! Local producer/consumer queues.
//!
//! Two bounded, thread-safe buffers of opaque byte payloads (spec.md §3):
//! an inbound queue filled by the Transfer Loop and drained by the caller,
//! and an outbound queue filled by the caller and drained by the Transfer
//! Loop. Built on `crossbeam-channel` rather than `std::sync::mpsc` because
//! the caller-facing `put` backpressure and the `stop` drain-wait both need
//! a live length check, which `mpsc` doesn't expose.

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// A bounded FIFO queue of byte payloads, shared between the caller thread(s)
/// and the supervisor thread.
#[derive(Clone)]
pub struct LocalQueue {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Returned by [`LocalQueue::push`] when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

impl LocalQueue {
    /// `capacity` bounds the number of messages the queue will hold before
    /// `push` starts reporting [`QueueFull`].
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Non-blocking push. Used by the caller for outbound messages and by
    /// the Transfer Loop for inbound messages.
    pub fn push(&self, payload: Vec<u8>) -> Result<(), QueueFull> {
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(QueueFull),
        }
    }

    /// Blocks until there is room, then pushes. Used by
    /// [`crate::handle::ConnectorHandle::put`], which promises delivery
    /// into the queue rather than a best-effort attempt.
    pub fn push_blocking(&self, payload: Vec<u8>) {
        // The matching `Receiver` is held alongside this `Sender` inside
        // the same `LocalQueue`/`SessionQueues`, so the channel can only
        // disconnect if the whole queue is being torn down.
        let _ = self.tx.send(payload);
    }

    /// Non-blocking pop. Returns `None` if the queue is currently empty -
    /// a normal condition (spec.md §7), not an error.
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Current number of queued messages.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The inbound/outbound pair a session is built around (spec.md §3).
#[derive(Clone)]
pub struct SessionQueues {
    /// Filled by the Transfer Loop, drained by the caller.
    pub inbound: LocalQueue,
    /// Filled by the caller, drained by the Transfer Loop.
    pub outbound: LocalQueue,
}

impl SessionQueues {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            inbound: LocalQueue::bounded(capacity),
            outbound: LocalQueue::bounded(capacity),
        }
    }
}
