//! Session counters (spec.md §3).
//!
//! Session-scoped, non-persistent. Owned exclusively by the Transfer Loop
//! thread in practice, but kept as atomics so status logging and tests can
//! read them without synchronizing with that thread.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Monotonic counters and keepalive timestamps for one live session.
#[derive(Debug, Default)]
pub struct SessionCounters {
    /// Inbound messages ever pushed to the local queue, for fetch-limit
    /// enforcement. Incremented both by the async consumer callback and by
    /// the synchronous bounded fetch (spec.md §9 Open Question #1).
    session_fetched: AtomicU64,
    sent_messages: AtomicU64,
    recv_messages: AtomicU64,
    /// Messages fetched from the broker and sitting in the local inbound
    /// queue, not yet drained by the caller's `get()`. Incremented by
    /// whichever fetch path delivered them (sync bounded fetch only - the
    /// async consumer path never gates on this), decremented when `get()`
    /// pops one.
    ///
    /// spec.md §9 Open Question #2 preserves the source's "decrement on
    /// publish" behavior, but that couples this counter to a message
    /// stream that, for a master, has nothing to do with the one being
    /// fetched: a master's outbound publishes are new tasks, unrelated to
    /// the responses it fetches, so decrementing on publish drives this
    /// counter permanently negative and wedges the synchronous idle/busy
    /// gate shut. Decrementing on caller drain instead keeps the counter
    /// tied to the queue it actually describes, for both roles.
    active: AtomicU64,
    last_keepalive_sent_millis: AtomicI64,
    last_keepalive_received_millis: AtomicI64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_fetched(&self) -> u64 {
        self.session_fetched.load(Ordering::Relaxed)
    }

    pub fn record_fetched(&self, count: u64) {
        self.session_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn sent_messages(&self) -> u64 {
        self.sent_messages.load(Ordering::Relaxed)
    }

    pub fn record_sent(&self) {
        self.sent_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recv_messages(&self) -> u64 {
        self.recv_messages.load(Ordering::Relaxed)
    }

    pub fn record_received(&self) {
        self.recv_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn add_active(&self, delta: u64) {
        self.active.fetch_add(delta, Ordering::Relaxed);
    }

    /// Saturating decrement: never wraps below zero. A `get()` can observe
    /// and drain a message the synchronous fetch gate never tracked (async
    /// mode doesn't maintain this counter at all), so this must tolerate
    /// being called more often than `add_active` was.
    pub fn dec_active(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| Some(x.saturating_sub(1)));
    }

    pub fn last_keepalive_sent_millis(&self) -> i64 {
        self.last_keepalive_sent_millis.load(Ordering::Relaxed)
    }

    pub fn set_last_keepalive_sent_millis(&self, millis: i64) {
        self.last_keepalive_sent_millis.store(millis, Ordering::Relaxed);
    }

    pub fn last_keepalive_received_millis(&self) -> i64 {
        self.last_keepalive_received_millis.load(Ordering::Relaxed)
    }

    pub fn set_last_keepalive_received_millis(&self, millis: i64) {
        self.last_keepalive_received_millis
            .store(millis, Ordering::Relaxed);
    }

    /// Whether `session_fetched` has reached `limit` (when one is set).
    /// `limit == None` means unbounded.
    pub fn fetch_limit_reached(&self, limit: Option<u64>) -> bool {
        match limit {
            Some(limit) => self.session_fetched() >= limit,
            None => false,
        }
    }
}

/// Publishes whichever `SessionCounters` belongs to the currently live
/// session so the `ConnectorHandle` (on the caller side of the
/// caller/supervisor boundary) can read `session_fetched` for the
/// fetch-limit-exceeded check in `get()`, even though the counters
/// themselves are recreated fresh on every restart.
#[derive(Clone)]
pub struct CountersSlot(Arc<Mutex<Arc<SessionCounters>>>);

impl CountersSlot {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Arc::new(SessionCounters::new()))))
    }

    pub fn publish(&self, counters: Arc<SessionCounters>) {
        *self.0.lock().unwrap() = counters;
    }

    pub fn current(&self) -> Arc<SessionCounters> {
        self.0.lock().unwrap().clone()
    }
}

impl Default for CountersSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let c = SessionCounters::new();
        assert_eq!(c.session_fetched(), 0);
        assert_eq!(c.sent_messages(), 0);
        assert_eq!(c.recv_messages(), 0);
        assert_eq!(c.active(), 0);
    }

    #[test]
    fn active_decrements_on_drain() {
        let c = SessionCounters::new();
        c.add_active(2);
        assert_eq!(c.active(), 2);
        c.dec_active();
        assert_eq!(c.active(), 1);
    }

    #[test]
    fn active_decrement_saturates_at_zero() {
        let c = SessionCounters::new();
        assert_eq!(c.active(), 0);
        c.dec_active();
        assert_eq!(c.active(), 0, "dec_active must never wrap past zero");
        c.dec_active();
        assert_eq!(c.active(), 0);
    }

    #[test]
    fn fetch_limit_reached_respects_unbounded() {
        let c = SessionCounters::new();
        c.record_fetched(1000);
        assert!(!c.fetch_limit_reached(None));
    }

    #[test]
    fn fetch_limit_reached_trips_at_threshold() {
        let c = SessionCounters::new();
        c.record_fetched(3);
        assert!(!c.fetch_limit_reached(Some(4)));
        c.record_fetched(1);
        assert!(c.fetch_limit_reached(Some(4)));
    }
}
