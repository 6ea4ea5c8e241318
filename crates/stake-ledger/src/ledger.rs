//! # Stake Ledger
//!
//! Owns every position and aggregate counter and is the only component that
//! mutates them. Composes the tier catalog, reward arithmetic, rate limiter
//! and access control.
//!
//! ## Transactions
//!
//! All state sits in one arena behind a re-entrant mutex. A mutating call:
//!
//! 1. takes the writer lock and marks the section busy (a nested mutating
//!    call on the same thread sees the flag and fails with `Reentrancy`);
//! 2. reads the clock once;
//! 3. validates everything, then applies the change;
//! 4. appends events to the journal and, with the data borrow released,
//!    notifies observers in commit order.
//!
//! A failed command returns before step 3 mutates anything.

use crate::access::{AccessControl, Role};
use crate::clock::Clock;
use crate::config::{ConfigRegistry, GlobalLimits, TierConfig};
use crate::error::{LedgerError, Result};
use crate::events::{EventJournal, EventRecord, LedgerEvent, LedgerObserver};
use crate::position::StakePosition;
use crate::rate_limit::RateLimiter;
use crate::rewards::RewardCalculator;
use crate::storage::{LedgerSnapshot, SNAPSHOT_VERSION};
use crate::types::{format_amount, AccountId, Amount, AssetRef, PositionId, Timestamp};
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Principal and reward released by a close
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub position_id: PositionId,
    pub principal: Amount,
    pub reward: Amount,
}

impl Settlement {
    pub fn total(&self) -> Amount {
        self.principal.saturating_add(self.reward)
    }
}

/// System-wide statistics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_staked: Amount,
    /// Staked amount per tier, by index
    pub tier_staked: Vec<Amount>,
    pub total_positions: u64,
    pub active_positions: u64,
    pub paused_positions: u64,
    pub total_rewards_paid: Amount,
    pub min_amount: Amount,
    pub max_amount: Amount,
    pub per_participant_cap: Amount,
    pub system_paused: bool,
}

/// Per-participant statistics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerStats {
    pub owner: AccountId,
    /// Active exposure
    pub total_staked: Amount,
    pub active_positions: u64,
    pub total_positions: u64,
    pub total_claimed: Amount,
    pub pending_rewards: Amount,
    /// New positions still allowed in the current rate-limit window
    pub remaining_openings: u32,
}

/// Mutable ledger state; only touched inside the writer section
#[derive(Debug)]
struct LedgerState {
    registry: ConfigRegistry,
    access: AccessControl,
    rate_limiter: RateLimiter,
    /// Arena indexed by `id - 1`
    positions: Vec<StakePosition>,
    owner_index: HashMap<AccountId, Vec<PositionId>>,
    exposure: HashMap<AccountId, Amount>,
    total_staked: Amount,
    total_rewards_paid: Amount,
    emergency_withdrawn: BTreeMap<AssetRef, Amount>,
    system_paused: bool,
    journal: EventJournal,
}

impl LedgerState {
    fn new(registry: ConfigRegistry, access: AccessControl) -> Self {
        let rate_limiter = RateLimiter::new(registry.limits().rate_window_secs);
        Self {
            registry,
            access,
            rate_limiter,
            positions: Vec::new(),
            owner_index: HashMap::new(),
            exposure: HashMap::new(),
            total_staked: 0,
            total_rewards_paid: 0,
            emergency_withdrawn: BTreeMap::new(),
            system_paused: false,
            journal: EventJournal::new(),
        }
    }

    fn index_of(&self, id: PositionId) -> Result<usize> {
        let index = id
            .value()
            .checked_sub(1)
            .ok_or(LedgerError::PositionNotFound(id))? as usize;
        if index < self.positions.len() {
            Ok(index)
        } else {
            Err(LedgerError::PositionNotFound(id))
        }
    }

    fn position(&self, id: PositionId) -> Result<&StakePosition> {
        Ok(&self.positions[self.index_of(id)?])
    }

    fn next_id(&self) -> PositionId {
        PositionId::new(self.positions.len() as u64).next()
    }

    fn exposure_of(&self, owner: &AccountId) -> Amount {
        self.exposure.get(owner).copied().unwrap_or(0)
    }

    fn positions_of(&self, owner: &AccountId) -> impl Iterator<Item = &StakePosition> {
        self.owner_index
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|id| self.position(*id).ok())
    }

    /// Owner-checked lookup shared by close and claim
    fn owned_open_position(&self, id: PositionId, caller: &AccountId) -> Result<&StakePosition> {
        let position = self.position(id)?;
        if position.owner != *caller {
            return Err(LedgerError::NotOwner(id));
        }
        if !position.is_active {
            return Err(LedgerError::StakeNotActive(id));
        }
        if position.is_paused {
            return Err(LedgerError::StakePaused(id));
        }
        Ok(position)
    }

    /// Remove a closed position's principal from every aggregate.
    ///
    /// Every subtraction is checked before anything is written.
    fn release_principal(&mut self, owner: AccountId, tier_index: usize, amount: Amount) -> Result<()> {
        let tier_staked = self
            .registry
            .tier(tier_index)?
            .staked_amount
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total_staked = self
            .total_staked
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let exposure = self
            .exposure_of(&owner)
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.registry.tier_mut(tier_index)?.staked_amount = tier_staked;
        self.total_staked = total_staked;
        if exposure == 0 {
            self.exposure.remove(&owner);
        } else {
            self.exposure.insert(owner, exposure);
        }
        Ok(())
    }

    fn verify_invariants(&self) -> Result<()> {
        let mut total: Amount = 0;
        let mut per_tier = vec![0 as Amount; self.registry.tiers().len()];
        let mut per_owner: HashMap<AccountId, Amount> = HashMap::new();

        for (index, position) in self.positions.iter().enumerate() {
            if position.id.value() != index as u64 + 1 {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "position {} stored at slot {}",
                    position.id, index
                )));
            }
            if position.amount == 0 {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "position {} has zero amount",
                    position.id
                )));
            }
            if !position.is_active {
                continue;
            }
            let slot = per_tier.get_mut(position.tier_index).ok_or_else(|| {
                LedgerError::CorruptSnapshot(format!(
                    "position {} references unknown tier {}",
                    position.id, position.tier_index
                ))
            })?;
            *slot = slot.checked_add(position.amount).ok_or(LedgerError::ArithmeticOverflow)?;
            total = total.checked_add(position.amount).ok_or(LedgerError::ArithmeticOverflow)?;
            *per_owner.entry(position.owner).or_default() += position.amount;
        }

        if total != self.total_staked || total != self.registry.total_tier_staked() {
            return Err(LedgerError::CorruptSnapshot(format!(
                "total staked {} does not match positions {} / tiers {}",
                self.total_staked,
                total,
                self.registry.total_tier_staked()
            )));
        }
        for (tier, expected) in self.registry.tiers().iter().zip(per_tier) {
            if tier.staked_amount != expected {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "tier {} staked {} but positions sum to {}",
                    tier.index, tier.staked_amount, expected
                )));
            }
        }
        if per_owner != self.exposure {
            return Err(LedgerError::CorruptSnapshot("participant exposure mismatch".into()));
        }
        if self.rate_limiter.window_secs() != self.registry.limits().rate_window_secs {
            return Err(LedgerError::CorruptSnapshot(format!(
                "rate limiter window {}s differs from configured {}s",
                self.rate_limiter.window_secs(),
                self.registry.limits().rate_window_secs
            )));
        }
        Ok(())
    }

    fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            registry: self.registry.clone(),
            access: self.access.clone(),
            rate_limiter: self.rate_limiter.clone(),
            positions: self.positions.clone(),
            total_rewards_paid: self.total_rewards_paid,
            emergency_withdrawn: self.emergency_withdrawn.clone(),
            system_paused: self.system_paused,
            journal: self.journal.clone(),
        }
    }

    /// Rebuild derived indexes from a snapshot and check every invariant
    fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::CorruptSnapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut owner_index: HashMap<AccountId, Vec<PositionId>> = HashMap::new();
        let mut exposure: HashMap<AccountId, Amount> = HashMap::new();
        let mut total_staked: Amount = 0;
        for position in &snapshot.positions {
            owner_index.entry(position.owner).or_default().push(position.id);
            if position.is_active {
                let owner_total = exposure.entry(position.owner).or_default();
                *owner_total = owner_total
                    .checked_add(position.amount)
                    .ok_or(LedgerError::ArithmeticOverflow)?;
                total_staked = total_staked
                    .checked_add(position.amount)
                    .ok_or(LedgerError::ArithmeticOverflow)?;
            }
        }

        let state = Self {
            registry: snapshot.registry,
            access: snapshot.access,
            rate_limiter: snapshot.rate_limiter,
            positions: snapshot.positions,
            owner_index,
            exposure,
            total_staked,
            total_rewards_paid: snapshot.total_rewards_paid,
            emergency_withdrawn: snapshot.emergency_withdrawn,
            system_paused: snapshot.system_paused,
            journal: snapshot.journal,
        };
        state.verify_invariants()?;
        Ok(state)
    }
}

/// Guarded writer section
struct Writer {
    state: RefCell<LedgerState>,
    busy: Cell<bool>,
}

/// Clears the busy flag when a transaction ends, including on early return
struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The staking ledger
pub struct StakeLedger {
    writer: ReentrantMutex<Writer>,
    clock: Arc<dyn Clock>,
    observers: RwLock<Vec<Arc<dyn LedgerObserver>>>,
}

impl StakeLedger {
    /// Create a ledger over an explicit catalog and role table
    pub fn new(registry: ConfigRegistry, access: AccessControl, clock: Arc<dyn Clock>) -> Self {
        Self::from_state(LedgerState::new(registry, access), clock)
    }

    /// Default catalog and limits with `root` as bootstrap authority
    pub fn with_defaults(root: AccountId, clock: Arc<dyn Clock>) -> Self {
        Self::new(ConfigRegistry::default(), AccessControl::new(root), clock)
    }

    /// Restore from a snapshot, rejecting inconsistent state
    pub fn restore(snapshot: LedgerSnapshot, clock: Arc<dyn Clock>) -> Result<Self> {
        let state = LedgerState::from_snapshot(snapshot)?;
        tracing::info!(
            positions = state.positions.len(),
            total_staked = %format_amount(state.total_staked),
            "Ledger restored from snapshot"
        );
        Ok(Self::from_state(state, clock))
    }

    fn from_state(state: LedgerState, clock: Arc<dyn Clock>) -> Self {
        Self {
            writer: ReentrantMutex::new(Writer {
                state: RefCell::new(state),
                busy: Cell::new(false),
            }),
            clock,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer for committed events
    pub fn subscribe(&self, observer: Arc<dyn LedgerObserver>) {
        self.observers.write().push(observer);
    }

    /// Run one mutating command as an atomic transaction
    fn transact<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut LedgerState, Timestamp, &mut Vec<LedgerEvent>) -> Result<T>,
    ) -> Result<T> {
        let writer = self.writer.lock();
        if writer.busy.get() {
            tracing::warn!(operation, "Re-entrant mutation rejected");
            return Err(LedgerError::Reentrancy);
        }
        writer.busy.set(true);
        let _busy = BusyGuard(&writer.busy);

        let now = self.clock.now();
        let mut events = Vec::new();

        let (value, records) = {
            let mut state = writer.state.borrow_mut();
            match apply(&mut state, now, &mut events) {
                Ok(value) => {
                    let records: Vec<EventRecord> = events
                        .into_iter()
                        .map(|event| state.journal.append(now, event).clone())
                        .collect();
                    (value, records)
                }
                Err(err) => {
                    tracing::debug!(operation, error = %err, "Command rejected");
                    return Err(err);
                }
            }
        };

        if !records.is_empty() {
            let observers = self.observers.read().clone();
            for record in &records {
                for observer in &observers {
                    observer.on_event(record);
                }
            }
        }

        Ok(value)
    }

    /// Run a read-only query against committed state
    fn read<T>(&self, query: impl FnOnce(&LedgerState, Timestamp) -> T) -> T {
        let writer = self.writer.lock();
        let state = writer.state.borrow();
        query(&state, self.clock.now())
    }

    // === Participant commands ===

    /// Open a new position for `participant`
    pub fn open(&self, participant: AccountId, amount: Amount, tier_index: usize) -> Result<PositionId> {
        self.transact("open", |state, now, events| {
            if state.system_paused {
                return Err(LedgerError::SystemPaused);
            }

            let limits = state.registry.limits().clone();
            if amount == 0 || amount < limits.min_amount {
                return Err(LedgerError::AmountBelowMinimum {
                    amount,
                    minimum: limits.min_amount,
                });
            }
            if amount > limits.max_amount {
                return Err(LedgerError::AmountAboveMaximum {
                    amount,
                    maximum: limits.max_amount,
                });
            }

            let tier = state.registry.open_tier(tier_index)?;
            let (rate_bps, duration_secs) = (tier.annual_rate_bps, tier.duration_secs);
            let tier_staked = tier
                .staked_amount
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            if tier_staked > tier.cap_amount {
                return Err(LedgerError::ExceedsTierCap {
                    tier: tier_index,
                    staked: tier_staked,
                    cap: tier.cap_amount,
                });
            }

            let exposure = state
                .exposure_of(&participant)
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            if exposure > limits.per_participant_cap {
                return Err(LedgerError::ExceedsParticipantCap {
                    exposure,
                    cap: limits.per_participant_cap,
                });
            }

            state
                .rate_limiter
                .check_limit(&participant, limits.max_new_positions_per_window, now)?;

            let total_staked = state
                .total_staked
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;

            // Validation complete; apply
            let id = state.next_id();
            state.positions.push(StakePosition::open(
                id,
                participant,
                amount,
                tier_index,
                rate_bps,
                duration_secs,
                now,
            ));
            state.owner_index.entry(participant).or_default().push(id);
            state.exposure.insert(participant, exposure);
            state.registry.tier_mut(tier_index)?.staked_amount = tier_staked;
            state.total_staked = total_staked;
            state.rate_limiter.record_open_attempt(participant, now);

            tracing::info!(
                position = %id,
                owner = %participant,
                amount = %format_amount(amount),
                tier = tier_index,
                rate_bps,
                "Position opened"
            );
            events.push(LedgerEvent::PositionOpened {
                id,
                owner: participant,
                amount,
                tier_index,
                rate_bps,
            });
            Ok(id)
        })
    }

    /// Close a position, settling its reward and releasing the principal
    pub fn close(&self, id: PositionId, caller: AccountId) -> Result<Settlement> {
        self.transact("close", |state, now, events| {
            let position = state.owned_open_position(id, &caller)?;
            if !position.is_unlocked(now) {
                return Err(LedgerError::LockNotEnded {
                    id,
                    unlocks_at: position.unlocks_at(),
                });
            }

            let reward = RewardCalculator::pending(position, now)?;
            let total_claimed = position
                .total_claimed
                .checked_add(reward)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            let total_rewards_paid = state
                .total_rewards_paid
                .checked_add(reward)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            let (owner, tier_index, principal) = (position.owner, position.tier_index, position.amount);
            let index = state.index_of(id)?;

            state.release_principal(owner, tier_index, principal)?;
            state.total_rewards_paid = total_rewards_paid;

            let position = &mut state.positions[index];
            position.is_active = false;
            position.closed_at = Some(now);
            position.last_claimed_at = now;
            position.settled_reward = 0;
            position.total_claimed = total_claimed;

            tracing::info!(
                position = %id,
                owner = %owner,
                principal = %format_amount(principal),
                reward = %format_amount(reward),
                "Position closed"
            );
            events.push(LedgerEvent::PositionClosed {
                id,
                principal,
                reward,
            });
            Ok(Settlement {
                position_id: id,
                principal,
                reward,
            })
        })
    }

    /// Claim accrued reward on a flexible position
    pub fn claim_rewards(&self, id: PositionId, caller: AccountId) -> Result<Amount> {
        self.transact("claim_rewards", |state, now, events| {
            let position = state.owned_open_position(id, &caller)?;
            if !position.is_flexible() {
                return Err(LedgerError::ClaimRequiresFlexibleTier(id));
            }

            let reward = RewardCalculator::pending(position, now)?;
            if reward == 0 {
                return Err(LedgerError::NoRewardsAvailable(id));
            }
            let total_claimed = position
                .total_claimed
                .checked_add(reward)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            let total_rewards_paid = state
                .total_rewards_paid
                .checked_add(reward)
                .ok_or(LedgerError::ArithmeticOverflow)?;

            let index = state.index_of(id)?;
            let position = &mut state.positions[index];
            position.last_claimed_at = now;
            position.settled_reward = 0;
            position.total_claimed = total_claimed;
            state.total_rewards_paid = total_rewards_paid;

            tracing::info!(position = %id, reward = %format_amount(reward), "Rewards claimed");
            events.push(LedgerEvent::RewardClaimed { id, amount: reward });
            Ok(reward)
        })
    }

    // === Operator commands ===

    /// Pause a position, settling its reward up to now
    pub fn pause(&self, id: PositionId, caller: AccountId) -> Result<()> {
        self.transact("pause", |state, now, events| {
            state.access.require_role(&caller, Role::Operator)?;
            let position = state.position(id)?;
            if !position.is_active {
                return Err(LedgerError::StakeNotActive(id));
            }
            if position.is_paused {
                return Err(LedgerError::StakePaused(id));
            }
            let settled = RewardCalculator::pending(position, now)?;

            let index = state.index_of(id)?;
            let position = &mut state.positions[index];
            position.settled_reward = settled;
            position.last_claimed_at = now;
            position.is_paused = true;
            position.paused_at = Some(now);

            tracing::info!(position = %id, by = %caller, settled = %format_amount(settled), "Position paused");
            events.push(LedgerEvent::PositionPaused { id });
            Ok(())
        })
    }

    /// Resume a paused position; accrual restarts now
    pub fn resume(&self, id: PositionId, caller: AccountId) -> Result<()> {
        self.transact("resume", |state, now, events| {
            state.access.require_role(&caller, Role::Operator)?;
            let position = state.position(id)?;
            if !position.is_active {
                return Err(LedgerError::StakeNotActive(id));
            }
            if !position.is_paused {
                return Err(LedgerError::StakeNotPaused(id));
            }

            let index = state.index_of(id)?;
            let position = &mut state.positions[index];
            position.is_paused = false;
            position.paused_at = None;
            position.last_claimed_at = now;

            tracing::info!(position = %id, by = %caller, "Position resumed");
            events.push(LedgerEvent::PositionResumed { id });
            Ok(())
        })
    }

    pub fn set_tier_rate(&self, tier_index: usize, new_rate_bps: u32, caller: AccountId) -> Result<()> {
        self.transact("set_tier_rate", |state, _now, events| {
            state.access.require_role(&caller, Role::Operator)?;
            let old = state.registry.set_tier_rate(tier_index, new_rate_bps)?;
            tracing::info!(tier = tier_index, old, new = new_rate_bps, "Tier rate updated");
            events.push(LedgerEvent::TierRateUpdated {
                tier_index,
                old,
                new: new_rate_bps,
            });
            Ok(())
        })
    }

    pub fn set_tier_active(&self, tier_index: usize, is_active: bool, caller: AccountId) -> Result<()> {
        self.transact("set_tier_active", |state, _now, events| {
            state.access.require_role(&caller, Role::Operator)?;
            state.registry.set_tier_active(tier_index, is_active)?;
            tracing::info!(tier = tier_index, is_active, "Tier activation changed");
            events.push(LedgerEvent::TierActivationChanged {
                tier_index,
                is_active,
            });
            Ok(())
        })
    }

    // === Administrator commands ===

    pub fn set_global_limits(&self, min_amount: Amount, max_amount: Amount, caller: AccountId) -> Result<()> {
        self.transact("set_global_limits", |state, _now, events| {
            state.access.require_role(&caller, Role::Administrator)?;
            state.registry.set_global_limits(min_amount, max_amount)?;
            tracing::info!(
                min = %format_amount(min_amount),
                max = %format_amount(max_amount),
                "Global limits updated"
            );
            events.push(LedgerEvent::GlobalLimitsUpdated {
                min_amount,
                max_amount,
            });
            Ok(())
        })
    }

    pub fn set_per_participant_cap(&self, cap: Amount, caller: AccountId) -> Result<()> {
        self.transact("set_per_participant_cap", |state, _now, events| {
            state.access.require_role(&caller, Role::Administrator)?;
            let old = state.registry.limits().per_participant_cap;
            state.registry.set_per_participant_cap(cap)?;
            tracing::info!(cap = %format_amount(cap), "Participant cap updated");
            events.push(LedgerEvent::ParticipantCapUpdated { old, new: cap });
            Ok(())
        })
    }

    pub fn set_tier_cap(&self, tier_index: usize, cap: Amount, caller: AccountId) -> Result<()> {
        self.transact("set_tier_cap", |state, _now, events| {
            state.access.require_role(&caller, Role::Administrator)?;
            let old = state.registry.set_tier_cap(tier_index, cap)?;
            tracing::info!(tier = tier_index, cap = %format_amount(cap), "Tier cap updated");
            events.push(LedgerEvent::TierCapUpdated {
                tier_index,
                old,
                new: cap,
            });
            Ok(())
        })
    }

    pub fn set_rate_limit(&self, max_new_positions: u32, window_secs: u64, caller: AccountId) -> Result<()> {
        self.transact("set_rate_limit", |state, _now, events| {
            state.access.require_role(&caller, Role::Administrator)?;
            state.registry.set_rate_limit(max_new_positions, window_secs)?;
            state.rate_limiter.set_window(window_secs);
            tracing::info!(max_new_positions, window_secs, "Rate limit updated");
            events.push(LedgerEvent::RateLimitUpdated {
                max_new_positions,
                window_secs,
            });
            Ok(())
        })
    }

    /// Block all new positions system-wide
    pub fn pause_system(&self, caller: AccountId) -> Result<()> {
        self.transact("pause_system", |state, _now, events| {
            state.access.require_role(&caller, Role::Administrator)?;
            if state.system_paused {
                return Err(LedgerError::SystemAlreadyPaused);
            }
            state.system_paused = true;
            tracing::warn!(by = %caller, "System paused; new positions blocked");
            events.push(LedgerEvent::SystemPaused { by: caller });
            Ok(())
        })
    }

    pub fn resume_system(&self, caller: AccountId) -> Result<()> {
        self.transact("resume_system", |state, _now, events| {
            state.access.require_role(&caller, Role::Administrator)?;
            if !state.system_paused {
                return Err(LedgerError::SystemNotPaused);
            }
            state.system_paused = false;
            tracing::info!(by = %caller, "System resumed");
            events.push(LedgerEvent::SystemResumed { by: caller });
            Ok(())
        })
    }

    /// Grant a role; returns false if it was already held
    pub fn grant_role(&self, account: AccountId, role: Role, caller: AccountId) -> Result<bool> {
        self.transact("grant_role", |state, _now, events| {
            let granted = state.access.grant_role(&caller, account, role)?;
            if granted {
                tracing::info!(%role, account = %account, by = %caller, "Role granted");
                events.push(LedgerEvent::RoleGranted {
                    role,
                    account,
                    by: caller,
                });
            }
            Ok(granted)
        })
    }

    /// Revoke a role; returns false if it was not held
    pub fn revoke_role(&self, account: AccountId, role: Role, caller: AccountId) -> Result<bool> {
        self.transact("revoke_role", |state, _now, events| {
            let revoked = state.access.revoke_role(&caller, &account, role)?;
            if revoked {
                tracing::info!(%role, account = %account, by = %caller, "Role revoked");
                events.push(LedgerEvent::RoleRevoked {
                    role,
                    account,
                    by: caller,
                });
            }
            Ok(revoked)
        })
    }

    // === Emergency ===

    /// Incident recovery: withdraw `amount` of `asset` from custody.
    ///
    /// Bypasses every position-level check and leaves positions untouched.
    pub fn emergency_withdraw(&self, asset: AssetRef, amount: Amount, caller: AccountId) -> Result<()> {
        self.transact("emergency_withdraw", |state, _now, events| {
            state.access.require_role(&caller, Role::EmergencyResponder)?;
            if amount == 0 {
                return Err(LedgerError::InvalidAmount("withdrawal amount must be positive".into()));
            }
            let withdrawn = state
                .emergency_withdrawn
                .get(&asset)
                .copied()
                .unwrap_or(0)
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            state.emergency_withdrawn.insert(asset.clone(), withdrawn);

            tracing::warn!(
                target: "stake_ledger::emergency",
                asset = %asset,
                amount = %format_amount(amount),
                by = %caller,
                "EMERGENCY WITHDRAWAL"
            );
            events.push(LedgerEvent::EmergencyWithdrawal {
                asset,
                amount,
                by: caller,
            });
            Ok(())
        })
    }

    // === Queries ===

    pub fn get_position(&self, id: PositionId) -> Option<StakePosition> {
        self.read(|state, _| state.position(id).ok().cloned())
    }

    /// Every position ever opened by `owner`, including closed ones
    pub fn get_positions_by_owner(&self, owner: &AccountId) -> Vec<StakePosition> {
        self.read(|state, _| state.positions_of(owner).cloned().collect())
    }

    /// Open positions of `owner`
    pub fn get_active_positions(&self, owner: &AccountId) -> Vec<StakePosition> {
        self.read(|state, _| {
            state
                .positions_of(owner)
                .filter(|p| p.is_active)
                .cloned()
                .collect()
        })
    }

    pub fn get_pending_reward(&self, id: PositionId) -> Result<Amount> {
        self.read(|state, now| RewardCalculator::pending(state.position(id)?, now))
    }

    pub fn get_aggregate_stats(&self) -> AggregateStats {
        self.read(|state, _| {
            let limits = state.registry.limits();
            AggregateStats {
                total_staked: state.total_staked,
                tier_staked: state.registry.tiers().iter().map(|t| t.staked_amount).collect(),
                total_positions: state.positions.len() as u64,
                active_positions: state.positions.iter().filter(|p| p.is_active).count() as u64,
                paused_positions: state
                    .positions
                    .iter()
                    .filter(|p| p.is_active && p.is_paused)
                    .count() as u64,
                total_rewards_paid: state.total_rewards_paid,
                min_amount: limits.min_amount,
                max_amount: limits.max_amount,
                per_participant_cap: limits.per_participant_cap,
                system_paused: state.system_paused,
            }
        })
    }

    pub fn get_owner_stats(&self, owner: &AccountId) -> Result<OwnerStats> {
        self.read(|state, now| {
            let mut stats = OwnerStats {
                owner: *owner,
                total_staked: state.exposure_of(owner),
                active_positions: 0,
                total_positions: 0,
                total_claimed: 0,
                pending_rewards: 0,
                remaining_openings: state.rate_limiter.remaining(
                    owner,
                    state.registry.limits().max_new_positions_per_window,
                    now,
                ),
            };
            for position in state.positions_of(owner) {
                stats.total_positions += 1;
                stats.total_claimed = stats.total_claimed.saturating_add(position.total_claimed);
                if position.is_active {
                    stats.active_positions += 1;
                    let pending = RewardCalculator::pending(position, now)?;
                    stats.pending_rewards = stats
                        .pending_rewards
                        .checked_add(pending)
                        .ok_or(LedgerError::ArithmeticOverflow)?;
                }
            }
            Ok(stats)
        })
    }

    pub fn get_tier_config(&self, tier_index: usize) -> Result<TierConfig> {
        self.read(|state, _| state.registry.tier(tier_index).cloned())
    }

    pub fn tiers(&self) -> Vec<TierConfig> {
        self.read(|state, _| state.registry.tiers().to_vec())
    }

    pub fn limits(&self) -> GlobalLimits {
        self.read(|state, _| state.registry.limits().clone())
    }

    pub fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.read(|state, _| state.access.has_role(account, role))
    }

    pub fn role_members(&self, role: Role) -> Vec<AccountId> {
        self.read(|state, _| state.access.members(role))
    }

    pub fn is_system_paused(&self) -> bool {
        self.read(|state, _| state.system_paused)
    }

    /// Cumulative emergency withdrawals of `asset`
    pub fn emergency_withdrawn(&self, asset: &AssetRef) -> Amount {
        self.read(|state, _| state.emergency_withdrawn.get(asset).copied().unwrap_or(0))
    }

    /// Journal records after sequence number `after`
    pub fn events_since(&self, after: u64) -> Vec<EventRecord> {
        self.read(|state, _| state.journal.since(after).to_vec())
    }

    /// Sequence number of the newest journal record, 0 before any event
    pub fn last_event_sequence(&self) -> u64 {
        self.read(|state, _| state.journal.last_sequence())
    }

    /// Drop the oldest journal records so at most `keep` remain.
    ///
    /// Sequence numbers are unaffected; `events_since` with an older cursor
    /// returns the retained tail.
    pub fn compact_journal(&self, keep: usize) -> Result<usize> {
        self.transact("compact_journal", |state, _now, _events| {
            let dropped = state.journal.retain_latest(keep);
            if dropped > 0 {
                tracing::debug!(dropped, kept = state.journal.len(), "Event journal compacted");
            }
            Ok(dropped)
        })
    }

    /// Recompute aggregates from positions and compare with the counters
    pub fn verify_invariants(&self) -> Result<()> {
        self.read(|state, _| state.verify_invariants())
    }

    /// Consistent point-in-time copy of the full state
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.read(|state, now| {
            let mut snapshot = state.to_snapshot();
            snapshot.rate_limiter.prune(now);
            snapshot
        })
    }
}
