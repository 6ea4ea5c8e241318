//! # Stake Ledger - Tiered Value Staking
//!
//! Participants lock a quantity of a fungible token into a duration tier and
//! accrue simple, time-proportional rewards. Positions can be opened, closed
//! after their lock elapses, paused and resumed by an operator, and (for the
//! flexible tier) claimed continuously.
//!
//! ## Key Features
//!
//! - **Duration tiers**: fixed locks with higher rates, plus a flexible tier
//! - **Exact reward arithmetic**: integer basis points, always rounded down
//! - **Exposure limits**: per-amount bounds, per-participant and per-tier caps
//! - **Rate limiting**: at most N new positions per participant per window
//! - **Role-gated administration**: administrator, operator, emergency responder
//!
//! ## Default Tier Catalog
//!
//! | Tier | Lock | Annual Rate | Cap |
//! |------|------|-------------|-----|
//! | 0 | 30 days | 8% | 500k |
//! | 1 | 90 days | 12% | 500k |
//! | 2 | 180 days | 15% | 500k |
//! | 3 | 365 days | 20% | 500k |
//! | 4 | flexible | 5% | 500k |
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       StakeLedger                         │
//! │  ┌────────────────┐ ┌──────────────┐ ┌─────────────────┐  │
//! │  │ ConfigRegistry │ │ RateLimiter  │ │  AccessControl  │  │
//! │  └────────────────┘ └──────────────┘ └─────────────────┘  │
//! │  ┌────────────────┐ ┌──────────────┐ ┌─────────────────┐  │
//! │  │ StakePosition  │ │ RewardCalc.  │ │  EventJournal   │──┼──► observers
//! │  │    arena       │ │              │ │                 │  │
//! │  └────────────────┘ └──────────────┘ └─────────────────┘  │
//! └──────────────────────────────┬────────────────────────────┘
//!                                │ LedgerSnapshot
//!                                ▼
//!                          SnapshotStore
//! ```

pub mod access;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod position;
pub mod rate_limit;
pub mod rewards;
pub mod settings;
pub mod storage;
pub mod types;

// Re-exports
pub use access::{AccessControl, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigRegistry, GlobalLimits, TierConfig};
pub use error::{ErrorKind, LedgerError, Result};
pub use events::{EventJournal, EventRecord, LedgerEvent, LedgerObserver};
pub use ledger::{AggregateStats, OwnerStats, Settlement, StakeLedger};
pub use position::{PositionState, StakePosition};
pub use rate_limit::RateLimiter;
pub use rewards::RewardCalculator;
pub use settings::{LedgerSettings, LoggingConfig};
pub use storage::{FileSnapshotStore, LedgerSnapshot, MemorySnapshotStore, SnapshotStore};
pub use types::{format_amount, parse_amount, AccountId, Amount, AssetRef, PositionId, Timestamp};

/// Token and policy constants
pub mod constants {
    /// Decimal places of the staked token
    pub const DECIMALS: u8 = 18;

    /// One whole token in base units
    pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000; // 10^18

    pub const SECONDS_PER_DAY: u64 = 86_400;

    /// 365-day year used for reward accrual
    pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

    /// Basis points in 100%
    pub const BPS_DENOMINATOR: u128 = 10_000;

    /// Highest configurable annual rate (100%)
    pub const MAX_RATE_BPS: u32 = 10_000;

    /// Smallest position: 100 tokens
    pub const DEFAULT_MIN_AMOUNT: u128 = 100 * ONE_TOKEN;

    /// Largest single position: 1,000,000 tokens
    pub const DEFAULT_MAX_AMOUNT: u128 = 1_000_000 * ONE_TOKEN;

    /// Active exposure allowed per participant: 100,000 tokens
    pub const DEFAULT_PARTICIPANT_CAP: u128 = 100_000 * ONE_TOKEN;

    /// Total staked allowed per tier: 500,000 tokens
    pub const DEFAULT_TIER_CAP: u128 = 500_000 * ONE_TOKEN;

    /// New positions per participant per window
    pub const DEFAULT_MAX_NEW_POSITIONS: u32 = 5;

    pub const DEFAULT_RATE_WINDOW_SECS: u64 = SECONDS_PER_DAY;
}

pub use constants::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::access::Role;
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{LedgerError, Result};
    pub use crate::ledger::{Settlement, StakeLedger};
    pub use crate::storage::{FileSnapshotStore, SnapshotStore};
    pub use crate::types::*;
}
