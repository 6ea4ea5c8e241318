//! Integration tests for the stake ledger
//!
//! These tests drive full position lifecycles through the public API:
//! reward accrual, lock enforcement, exposure limits, role changes and
//! snapshot persistence.

use stake_ledger::prelude::*;
use stake_ledger::{
    EventRecord, FileSnapshotStore, LedgerEvent, LedgerObserver, MemorySnapshotStore, ONE_TOKEN,
    SECONDS_PER_DAY, SECONDS_PER_YEAR,
};
use std::sync::Arc;

const START: i64 = 1_735_689_600; // 2025-01-01T00:00:00Z

struct Harness {
    ledger: StakeLedger,
    clock: Arc<ManualClock>,
    owner: AccountId,
    operator: AccountId,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let owner = AccountId::from_name("owner");
    let operator = AccountId::from_name("operator");
    let ledger = StakeLedger::with_defaults(owner, clock.clone());
    ledger.grant_role(operator, Role::Operator, owner).unwrap();
    Harness {
        ledger,
        clock,
        owner,
        operator,
    }
}

fn tokens(n: u128) -> Amount {
    n * ONE_TOKEN
}

mod reward_tests {
    use super::*;

    #[test]
    fn test_one_year_at_eight_percent() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        h.ledger.set_tier_rate(4, 800, h.operator).unwrap();
        let id = h.ledger.open(alice, tokens(1000), 4).unwrap();

        h.clock.advance(365 * SECONDS_PER_DAY);
        let pending = h.ledger.get_pending_reward(id).unwrap();
        assert_eq!(pending, tokens(80));

        let settlement = h.ledger.close(id, alice).unwrap();
        assert_eq!(settlement.principal, tokens(1000));
        assert_eq!(settlement.reward, tokens(80));
        assert_eq!(h.ledger.get_aggregate_stats().total_rewards_paid, tokens(80));
    }

    #[test]
    fn test_pending_non_decreasing_while_unpaused() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let id = h.ledger.open(alice, tokens(5000), 2).unwrap();

        let mut last = 0;
        for _ in 0..50 {
            h.clock.advance(3 * 3600 + 17);
            let pending = h.ledger.get_pending_reward(id).unwrap();
            assert!(pending >= last);
            last = pending;
        }
        assert!(last > 0);
    }

    #[test]
    fn test_pause_then_year_keeps_pre_pause_accrual() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let id = h.ledger.open(alice, tokens(1000), 1).unwrap();

        h.clock.advance(45 * SECONDS_PER_DAY);
        let before = h.ledger.get_pending_reward(id).unwrap();
        h.ledger.pause(id, h.operator).unwrap();

        h.clock.advance(SECONDS_PER_YEAR);
        assert_eq!(h.ledger.get_pending_reward(id).unwrap(), before);

        let position = h.ledger.get_position(id).unwrap();
        assert_eq!(position.settled_reward, before);
        assert_eq!(position.paused_at, Some(START + 45 * SECONDS_PER_DAY as i64));
    }

    #[test]
    fn test_claims_sum_to_uninterrupted_accrual_within_rounding() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let bob = AccountId::from_name("bob");
        let claimed_often = h.ledger.open(alice, tokens(10_000), 4).unwrap();
        let never_claimed = h.ledger.open(bob, tokens(10_000), 4).unwrap();

        let mut total = 0;
        for _ in 0..30 {
            h.clock.advance(SECONDS_PER_DAY);
            total += h.ledger.claim_rewards(claimed_often, alice).unwrap();
        }
        let single = h.ledger.get_pending_reward(never_claimed).unwrap();

        // Each claim rounds down at most one base unit
        assert!(total <= single);
        assert!(single - total <= 30);
    }

    #[test]
    fn test_claim_guards_on_flexible_position() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let mallory = AccountId::from_name("mallory");
        let id = h.ledger.open(alice, tokens(2000), 4).unwrap();
        h.clock.advance(7 * SECONDS_PER_DAY);

        let err = h.ledger.claim_rewards(id, mallory).unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner(_)));

        h.ledger.pause(id, h.operator).unwrap();
        let err = h.ledger.claim_rewards(id, alice).unwrap_err();
        assert!(matches!(err, LedgerError::StakePaused(_)));
        assert_eq!(err.code(), 4003);

        // Claiming works again once resumed
        h.ledger.resume(id, h.operator).unwrap();
        let frozen = h.ledger.get_position(id).unwrap().settled_reward;
        assert!(h.ledger.claim_rewards(id, alice).unwrap() >= frozen);

        h.clock.advance(SECONDS_PER_DAY);
        h.ledger.close(id, alice).unwrap();
        assert!(matches!(
            h.ledger.claim_rewards(id, alice),
            Err(LedgerError::StakeNotActive(_))
        ));
        assert!(matches!(
            h.ledger.claim_rewards(stake_ledger::PositionId::new(42), alice),
            Err(LedgerError::PositionNotFound(_))
        ));
    }
}

mod lock_tests {
    use super::*;

    #[test]
    fn test_close_at_exact_unlock_instant() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let id = h.ledger.open(alice, tokens(1000), 3).unwrap();
        let unlocks_at = h.ledger.get_position(id).unwrap().unlocks_at();
        assert_eq!(unlocks_at, START + 365 * SECONDS_PER_DAY as i64);

        h.clock.set(unlocks_at - 1);
        match h.ledger.close(id, alice) {
            Err(LedgerError::LockNotEnded { unlocks_at: at, .. }) => assert_eq!(at, unlocks_at),
            other => panic!("expected LockNotEnded, got {:?}", other),
        }

        h.clock.set(unlocks_at);
        assert!(h.ledger.close(id, alice).is_ok());
        assert_eq!(h.ledger.get_position(id).unwrap().closed_at, Some(unlocks_at));
    }

    #[test]
    fn test_tier_rate_change_does_not_touch_open_positions() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let id = h.ledger.open(alice, tokens(1000), 3).unwrap();
        h.ledger.set_tier_rate(3, 0, h.operator).unwrap();

        h.clock.advance(SECONDS_PER_YEAR);
        let settlement = h.ledger.close(id, alice).unwrap();
        assert_eq!(settlement.reward, tokens(200));
    }

    #[test]
    fn test_deactivated_tier_still_closes() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let id = h.ledger.open(alice, tokens(1000), 0).unwrap();
        h.ledger.set_tier_active(0, false, h.operator).unwrap();

        h.clock.advance(30 * SECONDS_PER_DAY);
        assert!(h.ledger.close(id, alice).is_ok());
        assert!(matches!(
            h.ledger.open(alice, tokens(1000), 0),
            Err(LedgerError::InvalidTier(0))
        ));
    }
}

mod limit_tests {
    use super::*;

    #[test]
    fn test_amount_bounds_inclusive() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        h.ledger.set_global_limits(tokens(100), tokens(50_000), h.owner).unwrap();

        assert!(h.ledger.open(alice, tokens(100), 0).is_ok());
        assert!(h.ledger.open(alice, tokens(50_000), 1).is_ok());
        assert!(matches!(
            h.ledger.open(alice, tokens(100) - 1, 0),
            Err(LedgerError::AmountBelowMinimum { .. })
        ));
        assert!(matches!(
            h.ledger.open(alice, tokens(50_000) + 1, 0),
            Err(LedgerError::AmountAboveMaximum { .. })
        ));
    }

    #[test]
    fn test_participant_cap_frees_on_close() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        let id = h.ledger.open(alice, tokens(100_000), 4).unwrap();
        assert!(matches!(
            h.ledger.open(alice, tokens(100), 4),
            Err(LedgerError::ExceedsParticipantCap { .. })
        ));

        h.ledger.close(id, alice).unwrap();
        assert!(h.ledger.open(alice, tokens(100), 4).is_ok());
    }

    #[test]
    fn test_tier_cap_shared_across_participants() {
        let h = harness();
        h.ledger.set_tier_cap(2, tokens(250_000), h.owner).unwrap();
        for name in ["a", "b"] {
            h.ledger
                .open(AccountId::from_name(name), tokens(100_000), 2)
                .unwrap();
        }
        assert!(matches!(
            h.ledger.open(AccountId::from_name("c"), tokens(60_000), 2),
            Err(LedgerError::ExceedsTierCap { tier: 2, .. })
        ));
        assert!(h.ledger.open(AccountId::from_name("c"), tokens(50_000), 2).is_ok());
        assert_eq!(h.ledger.get_tier_config(2).unwrap().remaining_capacity(), 0);
    }

    #[test]
    fn test_fifth_opening_succeeds_sixth_fails() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        for i in 0..5 {
            h.clock.advance(60);
            assert!(h.ledger.open(alice, tokens(100), i % 5).is_ok());
        }
        let err = h.ledger.open(alice, tokens(100), 0).unwrap_err();
        assert!(matches!(err, LedgerError::RateLimitExceeded { limit: 5, window_secs } if window_secs == SECONDS_PER_DAY));
        assert!(err.is_recoverable());

        // Closing does not give back an opening
        h.ledger.close(stake_ledger::PositionId::new(5), alice).unwrap();
        assert!(h.ledger.open(alice, tokens(100), 0).is_err());
    }

    #[test]
    fn test_rate_limit_reconfigured() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        h.ledger.set_rate_limit(2, 3600, h.owner).unwrap();

        h.ledger.open(alice, tokens(100), 4).unwrap();
        h.ledger.open(alice, tokens(100), 4).unwrap();
        assert!(h.ledger.open(alice, tokens(100), 4).is_err());

        h.clock.advance(3600);
        assert!(h.ledger.open(alice, tokens(100), 4).is_ok());
    }

    #[test]
    fn test_rate_window_beyond_timestamp_range_rejected() {
        let h = harness();
        let alice = AccountId::from_name("alice");
        assert!(matches!(
            h.ledger.set_rate_limit(5, u64::MAX, h.owner),
            Err(LedgerError::InvalidRange(_))
        ));
        assert_eq!(h.ledger.limits().rate_window_secs, SECONDS_PER_DAY);

        for _ in 0..5 {
            h.ledger.open(alice, tokens(100), 4).unwrap();
        }
        assert!(matches!(
            h.ledger.open(alice, tokens(100), 4),
            Err(LedgerError::RateLimitExceeded { .. })
        ));
    }
}

mod access_tests {
    use super::*;

    #[test]
    fn test_revoked_operator_loses_rate_control() {
        let h = harness();
        h.ledger.set_tier_rate(0, 900, h.operator).unwrap();
        assert!(h.ledger.revoke_role(h.operator, Role::Operator, h.owner).unwrap());

        assert!(matches!(
            h.ledger.set_tier_rate(0, 1500, h.operator),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert_eq!(h.ledger.get_tier_config(0).unwrap().annual_rate_bps, 900);
    }

    #[test]
    fn test_second_administrator() {
        let h = harness();
        let admin = AccountId::from_name("admin2");
        let guardian = AccountId::from_name("guardian");
        h.ledger.grant_role(admin, Role::Administrator, h.owner).unwrap();
        h.ledger.grant_role(guardian, Role::EmergencyResponder, admin).unwrap();

        h.ledger
            .emergency_withdraw(AssetRef::new("STK"), tokens(10), guardian)
            .unwrap();
        assert!(h.ledger.pause_system(admin).is_ok());
        assert!(h.ledger.is_system_paused());

        assert!(h.ledger.revoke_role(admin, Role::Administrator, admin).is_err());
    }

    #[test]
    fn test_participant_cannot_administer() {
        let h = harness();
        let mallory = AccountId::from_name("mallory");
        assert!(h.ledger.set_per_participant_cap(tokens(1), mallory).is_err());
        assert!(h.ledger.grant_role(mallory, Role::Operator, mallory).is_err());
        assert!(h
            .ledger
            .emergency_withdraw(AssetRef::new("STK"), tokens(1), mallory)
            .is_err());
        h.ledger.verify_invariants().unwrap();
    }
}

mod event_tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventRecord>>,
    }

    impl LedgerObserver for Recorder {
        fn on_event(&self, record: &EventRecord) {
            self.seen.lock().push(record.clone());
        }
    }

    #[test]
    fn test_observer_sees_commit_order() {
        let h = harness();
        let recorder = Arc::new(Recorder::default());
        h.ledger.subscribe(recorder.clone());

        let alice = AccountId::from_name("alice");
        let id = h.ledger.open(alice, tokens(1000), 4).unwrap();
        h.clock.advance(SECONDS_PER_DAY);
        h.ledger.claim_rewards(id, alice).unwrap();
        let _ = h.ledger.close(PositionId::new(42), alice);
        h.ledger.close(id, alice).unwrap();

        let seen = recorder.seen.lock();
        let names: Vec<_> = seen.iter().map(|r| r.event.name()).collect();
        assert_eq!(names, ["PositionOpened", "RewardClaimed", "PositionClosed"]);
        assert!(seen.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
        assert_eq!(seen[1].timestamp, START + SECONDS_PER_DAY as i64);
    }

    #[test]
    fn test_events_since() {
        let h = harness();
        let cursor = h.ledger.events_since(0).last().map(|r| r.sequence).unwrap_or(0);
        h.ledger.pause_system(h.owner).unwrap();

        let fresh = h.ledger.events_since(cursor);
        assert_eq!(fresh.len(), 1);
        assert!(matches!(fresh[0].event, LedgerEvent::SystemPaused { by } if by == h.owner));
    }
}

mod persistence_tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_restore_and_continue() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path().join("ledger.snap"));
        let alice = AccountId::from_name("alice");

        let h = harness();
        let locked = h.ledger.open(alice, tokens(2000), 0).unwrap();
        let flexible = h.ledger.open(alice, tokens(500), 4).unwrap();
        h.clock.advance(10 * SECONDS_PER_DAY);
        h.ledger.pause(locked, h.operator).unwrap();
        store.save(&h.ledger.snapshot()).unwrap();

        let restored = StakeLedger::restore(store.load().unwrap().unwrap(), h.clock.clone()).unwrap();
        assert_eq!(restored.get_owner_stats(&alice).unwrap(), h.ledger.get_owner_stats(&alice).unwrap());
        assert_eq!(restored.get_active_positions(&alice), h.ledger.get_active_positions(&alice));

        // Restored ledger keeps its rate-limit history and role table
        restored.resume(locked, h.operator).unwrap();
        h.clock.advance(30 * SECONDS_PER_DAY);
        assert!(restored.close(locked, alice).is_ok());
        assert!(restored.claim_rewards(flexible, alice).unwrap() > 0);
        assert_eq!(
            restored.get_owner_stats(&alice).unwrap().remaining_openings,
            5
        );
        restored.verify_invariants().unwrap();
    }

    #[test]
    fn test_memory_store_preserves_emergency_totals() {
        let h = harness();
        let guardian = AccountId::from_name("guardian");
        h.ledger.grant_role(guardian, Role::EmergencyResponder, h.owner).unwrap();
        h.ledger
            .emergency_withdraw(AssetRef::new("STK"), tokens(7), guardian)
            .unwrap();
        h.ledger
            .emergency_withdraw(AssetRef::new("STK"), tokens(3), guardian)
            .unwrap();

        let store = MemorySnapshotStore::new();
        store.save(&h.ledger.snapshot()).unwrap();
        let restored = StakeLedger::restore(store.load().unwrap().unwrap(), h.clock.clone()).unwrap();
        assert_eq!(restored.emergency_withdrawn(&AssetRef::new("STK")), tokens(10));
        assert_eq!(restored.emergency_withdrawn(&AssetRef::new("USD")), 0);
    }
}
