//! Per-participant limit on new positions inside a trailing window
//!
//! Each participant keeps a log of the instants at which their positions were
//! opened. An opening at `t` counts against the limit while
//! `now < t + window_secs`, so the window slides with time rather than
//! resetting at fixed boundaries.

use crate::error::{LedgerError, Result};
use crate::types::{AccountId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RateLimiter {
    window_secs: u64,
    openings: HashMap<AccountId, VecDeque<Timestamp>>,
}

impl RateLimiter {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            openings: HashMap::new(),
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Change the window length; the recorded log is kept
    pub fn set_window(&mut self, window_secs: u64) {
        self.window_secs = window_secs;
    }

    /// Window length as a timestamp offset, saturating at `i64::MAX`
    fn window(&self) -> i64 {
        i64::try_from(self.window_secs).unwrap_or(i64::MAX)
    }

    fn in_window(&self, opened_at: Timestamp, now: Timestamp) -> bool {
        now < opened_at.saturating_add(self.window())
    }

    /// Openings by `participant` still inside the window at `now`
    pub fn count(&self, participant: &AccountId, now: Timestamp) -> u32 {
        self.openings
            .get(participant)
            .map(|log| log.iter().filter(|t| self.in_window(**t, now)).count() as u32)
            .unwrap_or(0)
    }

    /// Fail once the in-window count has reached `max`
    pub fn check_limit(&self, participant: &AccountId, max: u32, now: Timestamp) -> Result<()> {
        if self.count(participant, now) >= max {
            return Err(LedgerError::RateLimitExceeded {
                limit: max,
                window_secs: self.window_secs,
            });
        }
        Ok(())
    }

    /// Openings still permitted in the current window
    pub fn remaining(&self, participant: &AccountId, max: u32, now: Timestamp) -> u32 {
        max.saturating_sub(self.count(participant, now))
    }

    /// Record a successful opening
    pub fn record_open_attempt(&mut self, participant: AccountId, now: Timestamp) {
        let window = self.window();
        let log = self.openings.entry(participant).or_default();
        while log.front().is_some_and(|t| now >= t.saturating_add(window)) {
            log.pop_front();
        }
        log.push_back(now);
    }

    /// Drop expired entries for every participant
    pub fn prune(&mut self, now: Timestamp) {
        let window = self.window();
        self.openings.retain(|_, log| {
            log.retain(|t| now < t.saturating_add(window));
            !log.is_empty()
        });
    }

    /// Participants with at least one entry in the log
    pub fn tracked_participants(&self) -> usize {
        self.openings.len()
    }
}
