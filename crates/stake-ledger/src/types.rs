//! Core type definitions for the stake ledger

use crate::constants::{DECIMALS, ONE_TOKEN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Token quantity in base units (18 decimals)
pub type Amount = u128;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// AccountId - identity of a participant or role holder
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId {
    id: [u8; 32],
}

impl AccountId {
    pub fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Derive an identity from a human-readable name using BLAKE3
    pub fn from_name(name: &str) -> Self {
        Self {
            id: *blake3::hash(name.as_bytes()).as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let id: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self { id })
    }
}

// Hex in human-readable formats, raw bytes otherwise
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.id.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self::new)
        }
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// PositionId - monotonically assigned, starting at 1
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(u64);

impl PositionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub(crate) fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to an asset held in custody (token symbol or contract address)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(asset: impl Into<String>) -> Self {
        Self(asset.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Amount parsing errors
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,

    #[error("invalid digit in amount: {0}")]
    InvalidDigit(String),

    #[error("more than 18 decimal places")]
    TooPrecise,

    #[error("amount overflows")]
    Overflow,
}

/// Parse a decimal token string ("1000", "0.25") into base units
pub fn parse_amount(s: &str) -> Result<Amount, AmountParseError> {
    let s = s.trim().replace('_', "");
    if s.is_empty() {
        return Err(AmountParseError::Empty);
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s.as_str(), ""),
    };

    if frac.len() > DECIMALS as usize {
        return Err(AmountParseError::TooPrecise);
    }
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) || (whole.is_empty() && frac.is_empty()) {
        return Err(AmountParseError::InvalidDigit(s.clone()));
    }

    let whole_units: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| AmountParseError::Overflow)?
    };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = DECIMALS as usize);
        padded.parse().map_err(|_| AmountParseError::Overflow)?
    };

    whole_units
        .checked_mul(ONE_TOKEN)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or(AmountParseError::Overflow)
}

/// Format base units as a decimal token string, trimming trailing zeros
pub fn format_amount(amount: Amount) -> String {
    let whole = amount / ONE_TOKEN;
    let frac = amount % ONE_TOKEN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = DECIMALS as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
