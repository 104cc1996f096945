use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::StakingError;
use crate::state::{StakeAccount, StakingPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeReceipt {
    pub amount: u64,
    /// Pending rewards paid out alongside the principal
    pub rewards_paid: u64,
    pub remaining_stake: u64,
    pub pool_total_staked: u64,
    /// Position reached zero and should be removed
    pub closed: bool,
}

/// Unstake tokens and pay out every pending reward
pub fn handler(
    pool: &mut StakingPool,
    stake_account: &mut StakeAccount,
    amount: u64,
    now: i64,
) -> Result<UnstakeReceipt> {
    require!(amount > 0, StakingError::InvalidAmount);
    require_keys_eq!(stake_account.token_mint, pool.token_mint, StakingError::InvalidPool);

    // Validate sufficient balance
    require!(
        stake_account.staked_amount >= amount,
        StakingError::InsufficientStake
    );

    // Check cooldown if applicable
    if pool.cooldown_seconds > 0 {
        require!(
            stake_account.has_unstake_request(),
            StakingError::MustRequestUnstake
        );
        require!(
            stake_account.can_unstake(pool.cooldown_seconds, now),
            StakingError::CooldownNotPassed
        );
    }

    stake_account.settle(pool.reward_per_token_stored)?;
    let rewards_paid = stake_account.take_pending(now);

    stake_account.staked_amount -= amount;
    stake_account.clear_unstake_request();

    pool.total_staked = pool
        .total_staked
        .checked_sub(amount)
        .ok_or(StakingError::RewardAccountingViolation)?;
    pool.total_rewards_claimed = pool
        .total_rewards_claimed
        .checked_add(rewards_paid)
        .ok_or(StakingError::Overflow)?;
    pool.last_update_time = now;

    // Update staker count if fully unstaked
    let closed = stake_account.staked_amount == 0;
    if closed {
        pool.staker_count = pool
            .staker_count
            .checked_sub(1)
            .ok_or(StakingError::RewardAccountingViolation)?;
    }

    log::info!(
        "Unstaked {} tokens from {}. Rewards paid: {}, remaining: {}",
        amount,
        pool.token_mint,
        rewards_paid,
        stake_account.staked_amount
    );

    Ok(UnstakeReceipt {
        amount,
        rewards_paid,
        remaining_stake: stake_account.staked_amount,
        pool_total_staked: pool.total_staked,
        closed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::stake;
    use crate::state::RewardIndex;

    fn staked(amount: u64, cooldown_seconds: u32) -> (StakingPool, StakeAccount) {
        let mut pool = StakingPool::new(Pubkey::new_unique(), 0, cooldown_seconds, 0);
        let mut account = StakeAccount::new(Pubkey::new_unique(), pool.token_mint, RewardIndex::ZERO, 0);
        stake::handler(&mut pool, &mut account, amount, 0).unwrap();
        (pool, account)
    }

    #[test]
    fn partial_unstake_pays_all_pending() {
        let (mut pool, mut account) = staked(100, 0);
        pool.distribute(400, 1).unwrap();

        let receipt = handler(&mut pool, &mut account, 40, 2).unwrap();
        assert_eq!(receipt.rewards_paid, 400);
        assert_eq!(receipt.remaining_stake, 60);
        assert!(!receipt.closed);
        assert_eq!(account.pending_rewards, 0);
        assert_eq!(pool.total_rewards_claimed, 400);
        assert_eq!(pool.staker_count, 1);
    }

    #[test]
    fn full_unstake_closes_position() {
        let (mut pool, mut account) = staked(100, 0);

        let receipt = handler(&mut pool, &mut account, 100, 2).unwrap();
        assert!(receipt.closed);
        assert_eq!(pool.staker_count, 0);
        assert_eq!(pool.total_staked, 0);
    }

    #[test]
    fn cannot_unstake_more_than_staked() {
        let (mut pool, mut account) = staked(100, 0);
        assert_eq!(
            handler(&mut pool, &mut account, 101, 2).unwrap_err(),
            StakingError::InsufficientStake.into()
        );
        assert_eq!(pool.total_staked, 100);
    }

    #[test]
    fn cooldown_pool_requires_request() {
        let (mut pool, mut account) = staked(100, 60);
        assert_eq!(
            handler(&mut pool, &mut account, 10, 2).unwrap_err(),
            StakingError::MustRequestUnstake.into()
        );

        account.unstake_requested_at = 10;
        account.unstake_amount = 10;
        assert_eq!(
            handler(&mut pool, &mut account, 10, 69).unwrap_err(),
            StakingError::CooldownNotPassed.into()
        );

        handler(&mut pool, &mut account, 10, 70).unwrap();
        assert!(!account.has_unstake_request());
    }
}
