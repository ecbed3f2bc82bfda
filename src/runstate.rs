//! The single cancellation signal shared across the caller/supervisor
//! boundary (spec.md §5: "one atomic runstate flag").
//!
//! `runstate = stopped` does not interrupt an in-flight broker call; it
//! only takes effect at the next Transfer Loop iteration boundary.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const RUNNING: u8 = 0;
const STOPPED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

/// Cheaply cloned handle onto the shared flag.
#[derive(Clone)]
pub struct RunStateFlag(Arc<AtomicU8>);

impl RunStateFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RUNNING)))
    }

    pub fn get(&self) -> RunState {
        match self.0.load(Ordering::SeqCst) {
            STOPPED => RunState::Stopped,
            _ => RunState::Running,
        }
    }

    pub fn stop(&self) {
        self.0.store(STOPPED, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.get() == RunState::Stopped
    }
}

impl Default for RunStateFlag {
    fn default() -> Self {
        Self::new()
    }
}
