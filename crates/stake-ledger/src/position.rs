//! Stake positions and their lifecycle
//!
//! ```text
//! NonExistent ──open──► Active ◄──resume── Paused
//!                         │   ──pause──►     │
//!                         └──close──► Closed (terminal)
//! ```

use crate::types::{AccountId, Amount, PositionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Lifecycle state derived from the position flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Active,
    Paused,
    Closed,
}

/// One staking commitment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub id: PositionId,

    pub owner: AccountId,

    /// Principal; positive and fixed for the lifetime of the position
    pub amount: Amount,

    pub tier_index: usize,

    /// Tier rate captured at open
    pub rate_bps: u32,

    /// Tier lock captured at open; 0 for flexible
    pub duration_secs: u64,

    pub opened_at: Timestamp,

    /// Start of the current accrual interval
    pub last_claimed_at: Timestamp,

    /// Reward settled by a pause but not yet paid out
    pub settled_reward: Amount,

    /// Reward paid out so far
    pub total_claimed: Amount,

    pub is_active: bool,

    pub is_paused: bool,

    pub paused_at: Option<Timestamp>,

    pub closed_at: Option<Timestamp>,
}

impl StakePosition {
    pub(crate) fn open(
        id: PositionId,
        owner: AccountId,
        amount: Amount,
        tier_index: usize,
        rate_bps: u32,
        duration_secs: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            owner,
            amount,
            tier_index,
            rate_bps,
            duration_secs,
            opened_at: now,
            last_claimed_at: now,
            settled_reward: 0,
            total_claimed: 0,
            is_active: true,
            is_paused: false,
            paused_at: None,
            closed_at: None,
        }
    }

    pub fn state(&self) -> PositionState {
        match (self.is_active, self.is_paused) {
            (false, _) => PositionState::Closed,
            (true, true) => PositionState::Paused,
            (true, false) => PositionState::Active,
        }
    }

    pub fn is_flexible(&self) -> bool {
        self.duration_secs == 0
    }

    /// Instant the lock ends (equal to `opened_at` for flexible positions)
    pub fn unlocks_at(&self) -> Timestamp {
        let duration = i64::try_from(self.duration_secs).unwrap_or(i64::MAX);
        self.opened_at.saturating_add(duration)
    }

    /// Check if the lock has ended
    pub fn is_unlocked(&self, now: Timestamp) -> bool {
        self.is_flexible() || now >= self.unlocks_at()
    }
}
