//! Time sources for the ledger
//!
//! Every mutation reads "now" exactly once from a [`Clock`], so a whole
//! transaction observes a single instant.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current time in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Set the current time
    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Move time forward, returning the new instant
    pub fn advance(&self, secs: u64) -> Timestamp {
        self.now.fetch_add(secs as i64, Ordering::SeqCst) + secs as i64
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
