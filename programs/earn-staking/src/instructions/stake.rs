use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::StakingError;
use crate::state::{StakeAccount, StakingPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeReceipt {
    pub amount: u64,
    /// Position size after the stake
    pub staked_amount: u64,
    pub pool_total_staked: u64,
    /// Rewards settled into the position before its size changed
    pub settled_rewards: u64,
    pub new_staker: bool,
}

pub fn handler(
    pool: &mut StakingPool,
    stake_account: &mut StakeAccount,
    amount: u64,
    now: i64,
) -> Result<StakeReceipt> {
    require!(amount > 0, StakingError::InvalidAmount);
    require!(!pool.paused, StakingError::PoolPaused);
    require_keys_eq!(stake_account.token_mint, pool.token_mint, StakingError::InvalidPool);

    // Validate minimum stake
    require!(
        amount >= pool.min_stake_amount,
        StakingError::StakeBelowMinimum
    );

    // Update rewards before modifying stake
    let settled_rewards = stake_account.settle(pool.reward_per_token_stored)?;

    let new_staker = stake_account.staked_amount == 0;
    if new_staker {
        stake_account.staked_at = now;
        pool.staker_count = pool
            .staker_count
            .checked_add(1)
            .ok_or(StakingError::Overflow)?;
    }

    stake_account.staked_amount = stake_account
        .staked_amount
        .checked_add(amount)
        .ok_or(StakingError::Overflow)?;
    pool.total_staked = pool
        .total_staked
        .checked_add(amount)
        .ok_or(StakingError::Overflow)?;
    pool.last_update_time = now;

    log::info!(
        "Staked {} tokens into {}. Position: {}, pool total: {}",
        amount,
        pool.token_mint,
        stake_account.staked_amount,
        pool.total_staked
    );

    Ok(StakeReceipt {
        amount,
        staked_amount: stake_account.staked_amount,
        pool_total_staked: pool.total_staked,
        settled_rewards,
        new_staker,
    })
}
