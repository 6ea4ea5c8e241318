//! Property tests: arbitrary command sequences never break aggregates

use proptest::prelude::*;
use stake_ledger::prelude::*;
use stake_ledger::{ONE_TOKEN, SECONDS_PER_DAY};
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Command {
    Open { who: usize, tokens: u128, tier: usize },
    Close { who: usize, slot: usize },
    Claim { who: usize, slot: usize },
    Pause { slot: usize },
    Resume { slot: usize },
    Advance { secs: u64 },
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        4 => (0usize..4, 50u128..60_000, 0usize..6)
            .prop_map(|(who, tokens, tier)| Command::Open { who, tokens, tier }),
        2 => (0usize..4, 0usize..32).prop_map(|(who, slot)| Command::Close { who, slot }),
        2 => (0usize..4, 0usize..32).prop_map(|(who, slot)| Command::Claim { who, slot }),
        1 => (0usize..32).prop_map(|slot| Command::Pause { slot }),
        1 => (0usize..32).prop_map(|slot| Command::Resume { slot }),
        2 => (0u64..40 * SECONDS_PER_DAY).prop_map(|secs| Command::Advance { secs }),
    ]
}

fn pick(opened: &[PositionId], slot: usize) -> Option<PositionId> {
    opened.get(slot % opened.len().max(1)).copied()
}

fn participants() -> Vec<AccountId> {
    (0..4)
        .map(|i| AccountId::from_name(&format!("p{}", i)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_aggregates_hold(commands in prop::collection::vec(command(), 1..80)) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let owner = AccountId::from_name("owner");
        let ledger = StakeLedger::with_defaults(owner, clock.clone());
        ledger.grant_role(owner, Role::Operator, owner).unwrap();
        let who = participants();
        let mut opened: Vec<PositionId> = Vec::new();

        for cmd in commands {
            match cmd {
                Command::Open { who: w, tokens, tier } => {
                    if let Ok(id) = ledger.open(who[w], tokens * ONE_TOKEN, tier) {
                        opened.push(id);
                    }
                }
                Command::Close { who: w, slot } => {
                    if let Some(id) = pick(&opened, slot) {
                        let _ = ledger.close(id, who[w]);
                    }
                }
                Command::Claim { who: w, slot } => {
                    if let Some(id) = pick(&opened, slot) {
                        let _ = ledger.claim_rewards(id, who[w]);
                    }
                }
                Command::Pause { slot } => {
                    if let Some(id) = pick(&opened, slot) {
                        let _ = ledger.pause(id, owner);
                    }
                }
                Command::Resume { slot } => {
                    if let Some(id) = pick(&opened, slot) {
                        let _ = ledger.resume(id, owner);
                    }
                }
                Command::Advance { secs } => {
                    clock.advance(secs);
                }
            }

            prop_assert!(ledger.verify_invariants().is_ok());
        }

        let stats = ledger.get_aggregate_stats();
        let limits = ledger.limits();
        for p in &who {
            let owner_stats = ledger.get_owner_stats(p).unwrap();
            prop_assert!(owner_stats.total_staked <= limits.per_participant_cap);
        }
        for tier in ledger.tiers() {
            prop_assert!(tier.staked_amount <= tier.cap_amount);
        }
        prop_assert_eq!(stats.total_positions, opened.len() as u64);
    }

    #[test]
    fn prop_paused_reward_is_frozen(
        tokens in 100u128..100_000,
        before in 1u64..365 * SECONDS_PER_DAY,
        after in 1u64..365 * SECONDS_PER_DAY,
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let owner = AccountId::from_name("owner");
        let ledger = StakeLedger::with_defaults(owner, clock.clone());
        ledger.grant_role(owner, Role::Operator, owner).unwrap();

        let id = ledger.open(AccountId::from_name("alice"), tokens * ONE_TOKEN, 3).unwrap();
        clock.advance(before);
        let accrued = ledger.get_pending_reward(id).unwrap();
        ledger.pause(id, owner).unwrap();
        clock.advance(after);
        prop_assert_eq!(ledger.get_pending_reward(id).unwrap(), accrued);
    }
}
