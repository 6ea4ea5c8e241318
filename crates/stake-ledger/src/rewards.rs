//! # Reward Calculation
//!
//! Simple (non-compounding) interest on the principal:
//!
//! ```text
//! reward = floor(amount × rate_bps × elapsed / (10_000 × SECONDS_PER_YEAR))
//! ```
//!
//! `elapsed` only ever covers unpaused time. Pausing settles the interval up
//! to the pause instant into `settled_reward`, and nothing accrues until the
//! position resumes.

use crate::constants::{BPS_DENOMINATOR, SECONDS_PER_YEAR};
use crate::error::{LedgerError, Result};
use crate::position::StakePosition;
use crate::types::{Amount, Timestamp};

/// Stateless reward arithmetic
pub struct RewardCalculator;

impl RewardCalculator {
    /// Reward accrued on `amount` at `rate_bps` over `elapsed_secs`, rounded down.
    ///
    /// The product `amount × rate × elapsed` is never formed directly:
    /// `amount` is split into quotient and remainder over the denominator so
    /// the result is the exact floor. Overflow is only possible when the
    /// reward itself does not fit in `u128`.
    pub fn accrued(amount: Amount, rate_bps: u32, elapsed_secs: u64) -> Result<Amount> {
        if amount == 0 || rate_bps == 0 || elapsed_secs == 0 {
            return Ok(0);
        }

        let denominator = BPS_DENOMINATOR * SECONDS_PER_YEAR as u128;
        let factor = rate_bps as u128 * elapsed_secs as u128;

        let quotient = amount / denominator;
        let remainder = amount % denominator;

        let whole = quotient
            .checked_mul(factor)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let partial = remainder
            .checked_mul(factor)
            .ok_or(LedgerError::ArithmeticOverflow)?
            / denominator;

        whole.checked_add(partial).ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Unpaused seconds since the last settlement
    pub fn unpaused_elapsed(last_claimed_at: Timestamp, now: Timestamp, is_paused: bool) -> u64 {
        if is_paused || now <= last_claimed_at {
            return 0;
        }
        (now - last_claimed_at) as u64
    }

    /// Reward owed to a position at `now` (settled plus currently accruing)
    pub fn pending(position: &StakePosition, now: Timestamp) -> Result<Amount> {
        if !position.is_active {
            return Ok(0);
        }
        let elapsed = Self::unpaused_elapsed(position.last_claimed_at, now, position.is_paused);
        let accruing = Self::accrued(position.amount, position.rate_bps, elapsed)?;
        position
            .settled_reward
            .checked_add(accruing)
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Reward for holding `amount` for one full year
    pub fn annual_projection(amount: Amount, rate_bps: u32) -> Result<Amount> {
        Self::accrued(amount, rate_bps, SECONDS_PER_YEAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ONE_TOKEN;
    use crate::types::{AccountId, PositionId};
    use proptest::prelude::*;

    #[test]
    fn test_one_year_at_eight_percent() {
        let reward = RewardCalculator::accrued(1000 * ONE_TOKEN, 800, SECONDS_PER_YEAR).unwrap();
        assert_eq!(reward, 80 * ONE_TOKEN);
    }

    #[test]
    fn test_rounds_down() {
        // 1 base unit for one second can never yield a whole unit
        assert_eq!(RewardCalculator::accrued(1, 10_000, 1).unwrap(), 0);
        // 315_360_000_000 × 10000 × 1 / 315_360_000_000 = 1 exactly
        let denominator = (BPS_DENOMINATOR * SECONDS_PER_YEAR as u128) as Amount;
        assert_eq!(RewardCalculator::accrued(denominator, 1, 1).unwrap(), 1);
        assert_eq!(RewardCalculator::accrued(denominator - 1, 1, 1).unwrap(), 0);
    }

    #[test]
    fn test_zero_inputs() {
        assert_eq!(RewardCalculator::accrued(0, 800, 100).unwrap(), 0);
        assert_eq!(RewardCalculator::accrued(100, 0, 100).unwrap(), 0);
        assert_eq!(RewardCalculator::accrued(100, 800, 0).unwrap(), 0);
    }

    #[test]
    fn test_large_amounts_do_not_overflow() {
        // Far beyond any realistic supply, still exact
        let amount = u128::MAX / 4;
        let reward = RewardCalculator::accrued(amount, 100, SECONDS_PER_YEAR).unwrap();
        assert_eq!(reward, amount / 100);
    }

    #[test]
    fn test_overflow_reported() {
        let result = RewardCalculator::accrued(u128::MAX, 10_000, u64::MAX);
        assert!(matches!(result, Err(LedgerError::ArithmeticOverflow)));
    }

    #[test]
    fn test_paused_elapsed_is_zero() {
        assert_eq!(RewardCalculator::unpaused_elapsed(100, 500, true), 0);
        assert_eq!(RewardCalculator::unpaused_elapsed(100, 500, false), 400);
        assert_eq!(RewardCalculator::unpaused_elapsed(500, 100, false), 0);
    }

    #[test]
    fn test_pending_includes_settled() {
        let mut position = StakePosition::open(
            PositionId::new(1),
            AccountId::from_name("alice"),
            1000 * ONE_TOKEN,
            0,
            800,
            0,
            0,
        );
        position.settled_reward = 5;
        let pending = RewardCalculator::pending(&position, SECONDS_PER_YEAR as i64).unwrap();
        assert_eq!(pending, 80 * ONE_TOKEN + 5);

        position.is_paused = true;
        assert_eq!(
            RewardCalculator::pending(&position, SECONDS_PER_YEAR as i64).unwrap(),
            5
        );
    }

    #[test]
    fn test_annual_projection() {
        assert_eq!(
            RewardCalculator::annual_projection(1000 * ONE_TOKEN, 500).unwrap(),
            50 * ONE_TOKEN
        );
    }

    proptest! {
        #[test]
        fn prop_matches_naive_formula(
            amount in 0u128..1_000_000_000_000_000_000_000_000 / 1000,
            rate in 0u32..=10_000,
            elapsed in 0u64..=10 * SECONDS_PER_YEAR,
        ) {
            let expected = amount * rate as u128 * elapsed as u128
                / (BPS_DENOMINATOR * SECONDS_PER_YEAR as u128);
            prop_assert_eq!(RewardCalculator::accrued(amount, rate, elapsed).unwrap(), expected);
        }

        #[test]
        fn prop_monotonic_in_time(
            amount in 1u128..1_000_000_000_000_000_000_000_000 / 1000,
            rate in 1u32..=10_000,
            a in 0u64..SECONDS_PER_YEAR,
            b in 0u64..SECONDS_PER_YEAR,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let r_lo = RewardCalculator::accrued(amount, rate, lo).unwrap();
            let r_hi = RewardCalculator::accrued(amount, rate, hi).unwrap();
            prop_assert!(r_lo <= r_hi);
        }
    }
}
