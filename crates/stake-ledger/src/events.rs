//! Lifecycle events emitted by the ledger

use crate::access::Role;
use crate::types::{AccountId, Amount, AssetRef, PositionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Events emitted on successful mutations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    PositionOpened {
        id: PositionId,
        owner: AccountId,
        amount: Amount,
        tier_index: usize,
        rate_bps: u32,
    },
    PositionClosed {
        id: PositionId,
        principal: Amount,
        reward: Amount,
    },
    RewardClaimed {
        id: PositionId,
        amount: Amount,
    },
    PositionPaused {
        id: PositionId,
    },
    PositionResumed {
        id: PositionId,
    },
    TierRateUpdated {
        tier_index: usize,
        old: u32,
        new: u32,
    },
    TierActivationChanged {
        tier_index: usize,
        is_active: bool,
    },
    TierCapUpdated {
        tier_index: usize,
        old: Amount,
        new: Amount,
    },
    GlobalLimitsUpdated {
        min_amount: Amount,
        max_amount: Amount,
    },
    ParticipantCapUpdated {
        old: Amount,
        new: Amount,
    },
    RateLimitUpdated {
        max_new_positions: u32,
        window_secs: u64,
    },
    RoleGranted {
        role: Role,
        account: AccountId,
        by: AccountId,
    },
    RoleRevoked {
        role: Role,
        account: AccountId,
        by: AccountId,
    },
    SystemPaused {
        by: AccountId,
    },
    SystemResumed {
        by: AccountId,
    },
    EmergencyWithdrawal {
        asset: AssetRef,
        amount: Amount,
        by: AccountId,
    },
}

impl LedgerEvent {
    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::PositionOpened { .. } => "PositionOpened",
            Self::PositionClosed { .. } => "PositionClosed",
            Self::RewardClaimed { .. } => "RewardClaimed",
            Self::PositionPaused { .. } => "PositionPaused",
            Self::PositionResumed { .. } => "PositionResumed",
            Self::TierRateUpdated { .. } => "TierRateUpdated",
            Self::TierActivationChanged { .. } => "TierActivationChanged",
            Self::TierCapUpdated { .. } => "TierCapUpdated",
            Self::GlobalLimitsUpdated { .. } => "GlobalLimitsUpdated",
            Self::ParticipantCapUpdated { .. } => "ParticipantCapUpdated",
            Self::RateLimitUpdated { .. } => "RateLimitUpdated",
            Self::RoleGranted { .. } => "RoleGranted",
            Self::RoleRevoked { .. } => "RoleRevoked",
            Self::SystemPaused { .. } => "SystemPaused",
            Self::SystemResumed { .. } => "SystemResumed",
            Self::EmergencyWithdrawal { .. } => "EmergencyWithdrawal",
        }
    }
}

/// Journal entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the journal, starting at 1
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub event: LedgerEvent,
}

/// Append-only, ordered event journal.
///
/// The oldest records can be dropped with [`EventJournal::retain_latest`];
/// sequence numbers keep counting from where they were.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventJournal {
    records: Vec<EventRecord>,
    /// Records dropped from the front
    dropped: u64,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, timestamp: Timestamp, event: LedgerEvent) -> &EventRecord {
        let sequence = self.last_sequence() + 1;
        self.records.push(EventRecord {
            sequence,
            timestamp,
            event,
        });
        &self.records[self.records.len() - 1]
    }

    /// Records with a sequence number greater than `after`
    pub fn since(&self, after: u64) -> &[EventRecord] {
        let skip = after.saturating_sub(self.dropped);
        let start = usize::try_from(skip).map_or(self.records.len(), |s| s.min(self.records.len()));
        &self.records[start..]
    }

    /// Sequence of the newest record ever appended, 0 if none
    pub fn last_sequence(&self) -> u64 {
        self.dropped + self.records.len() as u64
    }

    /// Drop the oldest records so that at most `keep` remain.
    /// Returns how many were dropped.
    pub fn retain_latest(&mut self, keep: usize) -> usize {
        let excess = self.records.len().saturating_sub(keep);
        self.records.drain(..excess);
        self.dropped += excess as u64;
        excess
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Synchronous observer of committed events.
///
/// Observers run inside the writer section after the mutation has been
/// committed, in commit order. They may query the ledger; a mutating call
/// made from an observer is rejected with `Reentrancy`.
pub trait LedgerObserver: Send + Sync {
    fn on_event(&self, record: &EventRecord);
}
