//! Snapshot persistence
//!
//! ## File Layout
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────┐
//! │ bincode(LedgerSnapshot)      │ blake3 (32 B)    │
//! └──────────────────────────────┴──────────────────┘
//! ```
//!
//! Writes go to a sibling `.tmp` file which is then renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact.

use crate::access::AccessControl;
use crate::config::ConfigRegistry;
use crate::error::{LedgerError, Result};
use crate::events::EventJournal;
use crate::position::StakePosition;
use crate::rate_limit::RateLimiter;
use crate::types::{Amount, AssetRef};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

const CHECKSUM_LEN: usize = 32;

/// Point-in-time copy of the full ledger state.
///
/// Derived indexes (owner lookup, exposure, total staked) are not stored;
/// they are rebuilt and cross-checked on restore.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub registry: ConfigRegistry,
    pub access: AccessControl,
    pub rate_limiter: RateLimiter,
    pub positions: Vec<StakePosition>,
    pub total_rewards_paid: Amount,
    pub emergency_withdrawn: BTreeMap<AssetRef, Amount>,
    pub system_paused: bool,
    pub journal: EventJournal,
}

impl LedgerSnapshot {
    /// Encode with a trailing checksum
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = bincode::serialize(self)?;
        let checksum = blake3::hash(&bytes);
        bytes.extend_from_slice(checksum.as_bytes());
        Ok(bytes)
    }

    /// Decode, verifying the trailing checksum
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHECKSUM_LEN {
            return Err(LedgerError::CorruptSnapshot("snapshot truncated".into()));
        }
        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != checksum {
            return Err(LedgerError::CorruptSnapshot("checksum mismatch".into()));
        }
        Ok(bincode::deserialize(body)?)
    }
}

/// Durable home for ledger snapshots
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()>;

    /// `None` when nothing has been saved yet
    fn load(&self) -> Result<Option<LedgerSnapshot>>;
}

/// Single-file store on the local filesystem
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let bytes = snapshot.to_bytes()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &bytes)?;
        std::fs::rename(&temp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            positions = snapshot.positions.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot = LedgerSnapshot::from_bytes(&bytes)?;
        tracing::debug!(path = %self.path.display(), "Snapshot loaded");
        Ok(Some(snapshot))
    }
}

/// In-memory store for tests and embedding
#[derive(Default)]
pub struct MemorySnapshotStore {
    data: RwLock<Option<Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        *self.data.write() = Some(snapshot.to_bytes()?);
        Ok(())
    }

    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        self.data
            .read()
            .as_deref()
            .map(LedgerSnapshot::from_bytes)
            .transpose()
    }
}
