//! Ledger bootstrap settings
//!
//! Deserialized from TOML (plus environment overrides) by the host. Token
//! quantities are whole tokens here and converted to base units when the
//! registry is built.

use crate::access::{AccessControl, Role};
use crate::clock::Clock;
use crate::config::{ConfigRegistry, GlobalLimits, TierConfig};
use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::ledger::StakeLedger;
use crate::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Complete ledger settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Tier catalog, in index order
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierSettings>,

    /// Global bounds and rate limit
    #[serde(default)]
    pub limits: LimitSettings,

    /// Bootstrap role holders
    #[serde(default)]
    pub roles: RoleSettings,

    /// Snapshot location
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            limits: LimitSettings::default(),
            roles: RoleSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// One tier entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings {
    /// Lock in days; 0 for flexible
    pub duration_days: u64,

    pub annual_rate_bps: u32,

    #[serde(default = "default_true")]
    pub active: bool,

    /// Tier capacity in whole tokens
    #[serde(default = "default_tier_cap_tokens")]
    pub cap_tokens: u64,
}

fn default_true() -> bool {
    true
}

fn default_tier_cap_tokens() -> u64 {
    (DEFAULT_TIER_CAP / ONE_TOKEN) as u64
}

fn default_tiers() -> Vec<TierSettings> {
    [(30, 800), (90, 1200), (180, 1500), (365, 2000), (0, 500)]
        .into_iter()
        .map(|(duration_days, annual_rate_bps)| TierSettings {
            duration_days,
            annual_rate_bps,
            active: true,
            cap_tokens: default_tier_cap_tokens(),
        })
        .collect()
}

/// Limits in whole tokens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSettings {
    #[serde(default = "default_min_tokens")]
    pub min_tokens: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    #[serde(default = "default_participant_cap_tokens")]
    pub participant_cap_tokens: u64,

    #[serde(default = "default_max_new_positions")]
    pub max_new_positions: u32,

    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
}

fn default_min_tokens() -> u64 {
    (DEFAULT_MIN_AMOUNT / ONE_TOKEN) as u64
}

fn default_max_tokens() -> u64 {
    (DEFAULT_MAX_AMOUNT / ONE_TOKEN) as u64
}

fn default_participant_cap_tokens() -> u64 {
    (DEFAULT_PARTICIPANT_CAP / ONE_TOKEN) as u64
}

fn default_max_new_positions() -> u32 {
    DEFAULT_MAX_NEW_POSITIONS
}

fn default_rate_window_secs() -> u64 {
    DEFAULT_RATE_WINDOW_SECS
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            min_tokens: default_min_tokens(),
            max_tokens: default_max_tokens(),
            participant_cap_tokens: default_participant_cap_tokens(),
            max_new_positions: default_max_new_positions(),
            rate_window_secs: default_rate_window_secs(),
        }
    }
}

/// Role holders by name or 64-char hex identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSettings {
    /// Bootstrap authority
    #[serde(default = "default_root")]
    pub root: String,

    #[serde(default)]
    pub administrators: Vec<String>,

    #[serde(default)]
    pub operators: Vec<String>,

    #[serde(default)]
    pub emergency_responders: Vec<String>,
}

fn default_root() -> String {
    "owner".to_string()
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            administrators: Vec::new(),
            operators: Vec::new(),
            emergency_responders: Vec::new(),
        }
    }
}

/// Storage settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Snapshot file; `~` is expanded by the host
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Journal records kept in each saved snapshot; 0 keeps all of them
    #[serde(default = "default_journal_retention")]
    pub journal_retention: usize,
}

fn default_snapshot_path() -> String {
    "~/.stake/ledger.snap".to_string()
}

fn default_journal_retention() -> usize {
    10_000
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            journal_retention: default_journal_retention(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Resolve a configured identity: 64 hex chars are taken literally,
/// anything else is treated as a name
pub fn resolve_identity(value: &str) -> AccountId {
    if value.len() == 64 {
        if let Ok(id) = AccountId::from_hex(value) {
            return id;
        }
    }
    AccountId::from_name(value)
}

fn tokens(whole: u64) -> Amount {
    whole as Amount * ONE_TOKEN
}

impl LedgerSettings {
    /// Build the validated tier catalog and limits
    pub fn registry(&self) -> Result<ConfigRegistry> {
        if self.tiers.is_empty() {
            return Err(LedgerError::InvalidRange("at least one tier is required".into()));
        }
        let tiers = self
            .tiers
            .iter()
            .enumerate()
            .map(|(index, tier)| {
                let duration_secs = tier
                    .duration_days
                    .checked_mul(SECONDS_PER_DAY)
                    .ok_or(LedgerError::ArithmeticOverflow)?;
                let mut config =
                    TierConfig::new(index, duration_secs, tier.annual_rate_bps, tokens(tier.cap_tokens));
                config.is_active = tier.active;
                Ok(config)
            })
            .collect::<Result<Vec<_>>>()?;

        let limits = GlobalLimits {
            min_amount: tokens(self.limits.min_tokens),
            max_amount: tokens(self.limits.max_tokens),
            per_participant_cap: tokens(self.limits.participant_cap_tokens),
            max_new_positions_per_window: self.limits.max_new_positions,
            rate_window_secs: self.limits.rate_window_secs,
        };
        ConfigRegistry::new(tiers, limits)
    }

    /// Build the role table with the configured holders
    pub fn access_control(&self) -> Result<AccessControl> {
        let root = resolve_identity(&self.roles.root);
        let mut access = AccessControl::new(root);
        let groups = [
            (Role::Administrator, &self.roles.administrators),
            (Role::Operator, &self.roles.operators),
            (Role::EmergencyResponder, &self.roles.emergency_responders),
        ];
        for (role, holders) in groups {
            for holder in holders {
                access.grant_role(&root, resolve_identity(holder), role)?;
            }
        }
        Ok(access)
    }

    /// Fresh ledger bootstrapped from these settings
    pub fn build_ledger(&self, clock: Arc<dyn Clock>) -> Result<StakeLedger> {
        Ok(StakeLedger::new(self.registry()?, self.access_control()?, clock))
    }
}
