use anchor_lang::prelude::Pubkey;
use earn_staking::{RewardIndex, StakeAccount, StakingError, StakingPool};
use proptest::prelude::*;

const WALLETS: usize = 4;

fn open(pool: &StakingPool) -> StakeAccount {
    StakeAccount::new(Pubkey::new_unique(), pool.token_mint, RewardIndex::ZERO, 0)
}

#[test]
fn late_staker_only_shares_later_deposits() {
    let mut pool = earn_staking::create_pool(Pubkey::new_unique(), 0, 0, 0);
    let mut alice = open(&pool);
    let mut bob = open(&pool);

    earn_staking::stake(&mut pool, &mut alice, 100, 1).unwrap();
    earn_staking::deposit_rewards(&mut pool, 1_000, 2).unwrap();
    earn_staking::stake(&mut pool, &mut bob, 100, 3).unwrap();
    earn_staking::deposit_rewards(&mut pool, 1_000, 4).unwrap();

    assert_eq!(earn_staking::pending_rewards(&pool, &alice).unwrap(), 1_500);
    assert_eq!(earn_staking::pending_rewards(&pool, &bob).unwrap(), 500);
    assert_eq!(pool.total_staked, 200);
    assert_eq!(pool.staker_count, 2);
    assert_eq!(pool.total_rewards_distributed, 2_000);
}

#[test]
fn rewards_parked_while_empty_reach_first_stakers() {
    let mut pool = earn_staking::create_pool(Pubkey::new_unique(), 0, 0, 0);
    let mut alice = open(&pool);

    let parked = earn_staking::deposit_rewards(&mut pool, 700, 1).unwrap();
    assert_eq!(parked.parked, 700);

    earn_staking::stake(&mut pool, &mut alice, 10, 2).unwrap();
    assert_eq!(earn_staking::pending_rewards(&pool, &alice).unwrap(), 0);

    let merged = earn_staking::deposit_rewards(&mut pool, 300, 3).unwrap();
    assert_eq!(merged.allocated, 1_000);
    assert_eq!(earn_staking::pending_rewards(&pool, &alice).unwrap(), 1_000);
}

#[test]
fn cooldown_flow_request_cancel_unstake() {
    let mut pool = earn_staking::create_pool(Pubkey::new_unique(), 0, 100, 0);
    let mut alice = open(&pool);
    earn_staking::stake(&mut pool, &mut alice, 50, 0).unwrap();

    assert_eq!(
        earn_staking::request_unstake(&pool, &mut alice, 20, 10).unwrap(),
        Some(110)
    );
    assert_eq!(
        earn_staking::request_unstake(&pool, &mut alice, 20, 11).unwrap_err(),
        StakingError::AlreadyRequestedUnstake.into()
    );
    assert_eq!(earn_staking::cancel_unstake(&mut alice).unwrap(), 20);
    assert_eq!(
        earn_staking::cancel_unstake(&mut alice).unwrap_err(),
        StakingError::NoUnstakeRequest.into()
    );

    earn_staking::request_unstake(&pool, &mut alice, 50, 20).unwrap();
    let receipt = earn_staking::unstake(&mut pool, &mut alice, 50, 120).unwrap();
    assert!(receipt.closed);
    assert_eq!(pool.staker_count, 0);
}

#[derive(Clone, Debug)]
enum Action {
    Deposit(u64),
    Stake(usize, u64),
    Unstake(usize, u64),
    Claim(usize),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (1u64..1_000_000).prop_map(Action::Deposit),
        (0..WALLETS, 1u64..1_000_000).prop_map(|(w, a)| Action::Stake(w, a)),
        (0..WALLETS, 1u64..1_000_000).prop_map(|(w, a)| Action::Unstake(w, a)),
        (0..WALLETS).prop_map(Action::Claim),
    ]
}

proptest! {
    #[test]
    fn rewards_never_exceed_distributed(actions in prop::collection::vec(action(), 1..80)) {
        let mut pool = earn_staking::create_pool(Pubkey::new_unique(), 0, 0, 0);
        let mut positions: Vec<StakeAccount> = (0..WALLETS).map(|_| open(&pool)).collect();
        let mut allocating_deposits: u128 = 0;

        for (now, action) in actions.into_iter().enumerate() {
            let now = now as i64;
            match action {
                Action::Deposit(amount) => {
                    let deposit = earn_staking::deposit_rewards(&mut pool, amount, now).unwrap();
                    if deposit.allocated > 0 {
                        allocating_deposits += 1;
                    }
                }
                Action::Stake(w, amount) => {
                    earn_staking::stake(&mut pool, &mut positions[w], amount, now).unwrap();
                }
                Action::Unstake(w, amount) => {
                    let before = positions[w].staked_amount;
                    let result = earn_staking::unstake(&mut pool, &mut positions[w], amount, now);
                    prop_assert_eq!(result.is_ok(), amount <= before);
                }
                Action::Claim(w) => {
                    let _ = earn_staking::claim_rewards(&mut pool, &mut positions[w], now);
                }
            }

            let mut outstanding: u128 = 0;
            for position in &positions {
                outstanding += earn_staking::pending_rewards(&pool, position).unwrap() as u128;
            }
            let owed = outstanding + pool.total_rewards_claimed as u128;
            let distributed = pool.total_rewards_distributed as u128;

            prop_assert!(owed <= distributed);
            prop_assert!(pool.check_conservation(outstanding as u64).is_ok());
            // Rounding dust: at most one unit per staker per deposit, plus index flooring.
            prop_assert!(distributed - owed <= allocating_deposits * (WALLETS as u128 + 1));

            let staked: u64 = positions.iter().map(|p| p.staked_amount).sum();
            prop_assert_eq!(staked, pool.total_staked);
            let stakers = positions.iter().filter(|p| p.staked_amount > 0).count() as u32;
            prop_assert_eq!(stakers, pool.staker_count);
        }
    }
}
