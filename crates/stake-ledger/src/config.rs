//! # Tier Catalog & Global Limits
//!
//! Duration tiers and position limits. Setters validate the new value and
//! assign it; existing positions are never re-validated.
//!
//! ## Default Tiers
//!
//! | Index | Lock Period | Annual Rate | Cap |
//! |-------|-------------|-------------|-----|
//! | 0 | 30 days | 8% | 500,000 tokens |
//! | 1 | 90 days | 12% | 500,000 tokens |
//! | 2 | 180 days | 15% | 500,000 tokens |
//! | 3 | 365 days | 20% | 500,000 tokens |
//! | 4 | Flexible | 5% | 500,000 tokens |

use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::types::Amount;
use serde::{Deserialize, Serialize};

/// One duration tier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Position in the catalog
    pub index: usize,

    /// Lock duration; 0 means flexible
    pub duration_secs: u64,

    /// Annual rate in basis points (10000 = 100%)
    pub annual_rate_bps: u32,

    /// Accepting new positions?
    pub is_active: bool,

    /// Maximum total open amount in this tier
    pub cap_amount: Amount,

    /// Running total of open positions in this tier
    pub staked_amount: Amount,
}

impl TierConfig {
    pub fn new(index: usize, duration_secs: u64, annual_rate_bps: u32, cap_amount: Amount) -> Self {
        Self {
            index,
            duration_secs,
            annual_rate_bps,
            is_active: true,
            cap_amount,
            staked_amount: 0,
        }
    }

    /// Flexible tiers have no lock and allow mid-position claims
    pub fn is_flexible(&self) -> bool {
        self.duration_secs == 0
    }

    /// Capacity left before the tier cap is reached
    pub fn remaining_capacity(&self) -> Amount {
        self.cap_amount.saturating_sub(self.staked_amount)
    }
}

/// Global position limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalLimits {
    /// Smallest accepted position (inclusive)
    pub min_amount: Amount,

    /// Largest accepted position (inclusive)
    pub max_amount: Amount,

    /// Anti-concentration cap on a participant's total active exposure
    pub per_participant_cap: Amount,

    /// New positions allowed per participant inside one window
    pub max_new_positions_per_window: u32,

    /// Length of the trailing rate-limit window
    pub rate_window_secs: u64,
}

impl Default for GlobalLimits {
    fn default() -> Self {
        Self {
            min_amount: DEFAULT_MIN_AMOUNT,
            max_amount: DEFAULT_MAX_AMOUNT,
            per_participant_cap: DEFAULT_PARTICIPANT_CAP,
            max_new_positions_per_window: DEFAULT_MAX_NEW_POSITIONS,
            rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
        }
    }
}

/// Tier catalog plus global limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRegistry {
    tiers: Vec<TierConfig>,
    limits: GlobalLimits,
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        let cap = DEFAULT_TIER_CAP;
        Self {
            tiers: vec![
                TierConfig::new(0, 30 * SECONDS_PER_DAY, 800, cap),
                TierConfig::new(1, 90 * SECONDS_PER_DAY, 1200, cap),
                TierConfig::new(2, 180 * SECONDS_PER_DAY, 1500, cap),
                TierConfig::new(3, 365 * SECONDS_PER_DAY, 2000, cap),
                TierConfig::new(4, 0, 500, cap),
            ],
            limits: GlobalLimits::default(),
        }
    }
}

impl ConfigRegistry {
    /// Build a registry from an explicit catalog.
    ///
    /// Tier indices are reassigned to their catalog position and running
    /// totals start at zero.
    pub fn new(tiers: Vec<TierConfig>, limits: GlobalLimits) -> Result<Self> {
        if tiers.is_empty() {
            return Err(LedgerError::InvalidRange("tier catalog is empty".into()));
        }
        validate_limits(limits.min_amount, limits.max_amount)?;
        validate_window(limits.rate_window_secs)?;

        let mut tiers = tiers;
        for (index, tier) in tiers.iter_mut().enumerate() {
            validate_rate(tier.annual_rate_bps)?;
            validate_duration(tier.duration_secs)?;
            tier.index = index;
            tier.staked_amount = 0;
        }

        Ok(Self { tiers, limits })
    }

    /// Get tier by index
    pub fn tier(&self, index: usize) -> Result<&TierConfig> {
        self.tiers.get(index).ok_or(LedgerError::InvalidTierIndex(index))
    }

    /// Tier that can accept a new position
    pub fn open_tier(&self, index: usize) -> Result<&TierConfig> {
        match self.tiers.get(index) {
            Some(tier) if tier.is_active => Ok(tier),
            _ => Err(LedgerError::InvalidTier(index)),
        }
    }

    pub(crate) fn tier_mut(&mut self, index: usize) -> Result<&mut TierConfig> {
        self.tiers
            .get_mut(index)
            .ok_or(LedgerError::InvalidTierIndex(index))
    }

    pub fn tiers(&self) -> &[TierConfig] {
        &self.tiers
    }

    pub fn limits(&self) -> &GlobalLimits {
        &self.limits
    }

    /// Sum of staked amounts across tiers
    pub fn total_tier_staked(&self) -> Amount {
        self.tiers.iter().map(|t| t.staked_amount).sum()
    }

    /// Update a tier's annual rate, returning the previous rate
    pub fn set_tier_rate(&mut self, index: usize, new_rate_bps: u32) -> Result<u32> {
        validate_rate(new_rate_bps)?;
        let tier = self.tier_mut(index)?;
        let old = tier.annual_rate_bps;
        tier.annual_rate_bps = new_rate_bps;
        Ok(old)
    }

    pub fn set_tier_active(&mut self, index: usize, active: bool) -> Result<()> {
        self.tier_mut(index)?.is_active = active;
        Ok(())
    }

    /// Update a tier's participation cap, returning the previous cap
    pub fn set_tier_cap(&mut self, index: usize, cap: Amount) -> Result<Amount> {
        let tier = self.tier_mut(index)?;
        let old = tier.cap_amount;
        tier.cap_amount = cap;
        Ok(old)
    }

    pub fn set_global_limits(&mut self, min: Amount, max: Amount) -> Result<()> {
        validate_limits(min, max)?;
        self.limits.min_amount = min;
        self.limits.max_amount = max;
        Ok(())
    }

    pub fn set_per_participant_cap(&mut self, cap: Amount) -> Result<()> {
        self.limits.per_participant_cap = cap;
        Ok(())
    }

    pub fn set_rate_limit(&mut self, max_new_positions: u32, window_secs: u64) -> Result<()> {
        validate_window(window_secs)?;
        self.limits.max_new_positions_per_window = max_new_positions;
        self.limits.rate_window_secs = window_secs;
        Ok(())
    }
}

fn validate_rate(rate_bps: u32) -> Result<()> {
    if rate_bps > MAX_RATE_BPS {
        return Err(LedgerError::InvalidRange(format!(
            "rate {} bps exceeds {} bps",
            rate_bps, MAX_RATE_BPS
        )));
    }
    Ok(())
}

/// Durations are added to `i64` timestamps and must fit one
fn validate_duration(duration_secs: u64) -> Result<()> {
    if i64::try_from(duration_secs).is_err() {
        return Err(LedgerError::InvalidRange(format!(
            "lock duration {}s exceeds {}s",
            duration_secs,
            i64::MAX
        )));
    }
    Ok(())
}

fn validate_window(window_secs: u64) -> Result<()> {
    if window_secs == 0 {
        return Err(LedgerError::InvalidRange("rate window must be positive".into()));
    }
    if i64::try_from(window_secs).is_err() {
        return Err(LedgerError::InvalidRange(format!(
            "rate window {}s exceeds {}s",
            window_secs,
            i64::MAX
        )));
    }
    Ok(())
}

fn validate_limits(min: Amount, max: Amount) -> Result<()> {
    if min == 0 {
        return Err(LedgerError::InvalidRange("minimum must be positive".into()));
    }
    if min > max {
        return Err(LedgerError::InvalidRange(format!(
            "minimum {} exceeds maximum {}",
            min, max
        )));
    }
    Ok(())
}
