//! Error types for stake ledger operations

use crate::types::{Amount, PositionId};
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Broad classification of a [`LedgerError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-correctable input problem
    Validation,
    /// Caller lacks the required role or ownership
    Authorization,
    /// Operation does not fit the position's current lifecycle state
    State,
    /// A limit is currently saturated; may succeed later
    Capacity,
    /// System-wide pause
    System,
    /// Arithmetic, storage or re-entry failure
    Internal,
}

/// Errors that can occur in stake ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    // === Validation ===
    #[error("Amount {amount} below minimum {minimum}")]
    AmountBelowMinimum { amount: Amount, minimum: Amount },

    #[error("Amount {amount} above maximum {maximum}")]
    AmountAboveMaximum { amount: Amount, maximum: Amount },

    /// Tier out of range or inactive
    #[error("Invalid tier: {0}")]
    InvalidTier(usize),

    /// Tier index out of range on an administrative setter
    #[error("Invalid tier index: {0}")]
    InvalidTierIndex(usize),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // === Authorization ===
    #[error("Unauthorized: caller lacks role {role}")]
    Unauthorized { role: &'static str },

    #[error("Caller is not the owner of position {0}")]
    NotOwner(PositionId),

    // === State ===
    #[error("Position not found: {0}")]
    PositionNotFound(PositionId),

    #[error("Position {0} is not active")]
    StakeNotActive(PositionId),

    #[error("Position {0} is paused")]
    StakePaused(PositionId),

    #[error("Position {0} is not paused")]
    StakeNotPaused(PositionId),

    #[error("Lock period of position {id} ends at {unlocks_at}")]
    LockNotEnded { id: PositionId, unlocks_at: i64 },

    #[error("No rewards available for position {0}")]
    NoRewardsAvailable(PositionId),

    /// Mid-lock claims are only allowed on the flexible tier
    #[error("Position {0} is locked; rewards are paid on close")]
    ClaimRequiresFlexibleTier(PositionId),

    #[error("System is already paused")]
    SystemAlreadyPaused,

    #[error("System is not paused")]
    SystemNotPaused,

    // === Capacity ===
    #[error("Exceeds participant cap: exposure would be {exposure}, cap {cap}")]
    ExceedsParticipantCap { exposure: Amount, cap: Amount },

    #[error("Exceeds cap of tier {tier}: staked would be {staked}, cap {cap}")]
    ExceedsTierCap { tier: usize, staked: Amount, cap: Amount },

    #[error("Rate limit exceeded: {limit} new positions per {window_secs}s")]
    RateLimitExceeded { limit: u32, window_secs: u64 },

    // === System ===
    #[error("System is paused; new positions are not accepted")]
    SystemPaused,

    // === Internal ===
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Re-entrant mutation rejected")]
    Reentrancy,

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl LedgerError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmountBelowMinimum { .. }
            | Self::AmountAboveMaximum { .. }
            | Self::InvalidTier(_)
            | Self::InvalidTierIndex(_)
            | Self::InvalidRange(_)
            | Self::InvalidAmount(_) => ErrorKind::Validation,

            Self::Unauthorized { .. } | Self::NotOwner(_) => ErrorKind::Authorization,

            Self::PositionNotFound(_)
            | Self::StakeNotActive(_)
            | Self::StakePaused(_)
            | Self::StakeNotPaused(_)
            | Self::LockNotEnded { .. }
            | Self::NoRewardsAvailable(_)
            | Self::ClaimRequiresFlexibleTier(_)
            | Self::SystemAlreadyPaused
            | Self::SystemNotPaused => ErrorKind::State,

            Self::ExceedsParticipantCap { .. }
            | Self::ExceedsTierCap { .. }
            | Self::RateLimitExceeded { .. } => ErrorKind::Capacity,

            Self::SystemPaused => ErrorKind::System,

            Self::ArithmeticOverflow
            | Self::Reentrancy
            | Self::CorruptSnapshot(_)
            | Self::Storage(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::AmountBelowMinimum { .. } => 2001,
            Self::AmountAboveMaximum { .. } => 2002,
            Self::InvalidTier(_) | Self::InvalidTierIndex(_) => 2003,
            Self::InvalidRange(_) | Self::InvalidAmount(_) => 2004,
            Self::Unauthorized { .. } => 3001,
            Self::NotOwner(_) => 3002,
            Self::PositionNotFound(_) => 4001,
            Self::StakeNotActive(_) => 4002,
            Self::StakePaused(_) | Self::StakeNotPaused(_) => 4003,
            Self::LockNotEnded { .. } => 4004,
            Self::NoRewardsAvailable(_) | Self::ClaimRequiresFlexibleTier(_) => 4005,
            Self::ExceedsParticipantCap { .. } => 5001,
            Self::ExceedsTierCap { .. } => 5002,
            Self::RateLimitExceeded { .. } => 5003,
            Self::SystemPaused | Self::SystemAlreadyPaused | Self::SystemNotPaused => 6001,
            _ => 9999,
        }
    }

    /// Check if retrying later may succeed without caller changes
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Capacity | ErrorKind::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(LedgerError::InvalidTier(9).kind(), ErrorKind::Validation);
        assert_eq!(
            LedgerError::Unauthorized { role: "operator" }.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            LedgerError::LockNotEnded { id: PositionId::new(1), unlocks_at: 10 }.kind(),
            ErrorKind::State
        );
        assert_eq!(LedgerError::SystemPaused.kind(), ErrorKind::System);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(LedgerError::RateLimitExceeded { limit: 5, window_secs: 86_400 }.is_recoverable());
        assert!(LedgerError::SystemPaused.is_recoverable());
        assert!(!LedgerError::NotOwner(PositionId::new(1)).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::StakePaused(PositionId::new(7));
        assert!(err.to_string().contains("paused"));
        assert_eq!(err.code(), 4003);
    }
}
