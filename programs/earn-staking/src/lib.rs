//! Earn Staking
//!
//! Reward-per-share accounting for pools of any token launched via Earn
//! Protocol. Stakers deposit tokens and accrue a share of every reward
//! deposit proportional to their stake at deposit time. Each operation is
//! O(1) regardless of how many stakers a pool holds.
//!
//! The functions below are pure state transitions; callers own persistence
//! and serialization of the pool and its stake accounts.

use anchor_lang::prelude::*;

pub mod errors;
pub mod instructions;
pub mod state;

pub use errors::StakingError;
pub use instructions::{ClaimReceipt, StakeReceipt, UnstakeReceipt};
pub use state::{RewardDeposit, RewardIndex, StakeAccount, StakingPool};

/// Create a staking pool for a token
pub fn create_pool(
    token_mint: Pubkey,
    min_stake_amount: u64,
    cooldown_seconds: u32,
    now: i64,
) -> StakingPool {
    instructions::create_pool::handler(token_mint, min_stake_amount, cooldown_seconds, now)
}

/// Stake tokens into a pool
pub fn stake(
    pool: &mut StakingPool,
    stake_account: &mut StakeAccount,
    amount: u64,
    now: i64,
) -> Result<StakeReceipt> {
    instructions::stake::handler(pool, stake_account, amount, now)
}

/// Unstake tokens from a pool, paying out pending rewards
pub fn unstake(
    pool: &mut StakingPool,
    stake_account: &mut StakeAccount,
    amount: u64,
    now: i64,
) -> Result<UnstakeReceipt> {
    instructions::unstake::handler(pool, stake_account, amount, now)
}

/// Claim accumulated rewards
pub fn claim_rewards(
    pool: &mut StakingPool,
    stake_account: &mut StakeAccount,
    now: i64,
) -> Result<ClaimReceipt> {
    instructions::claim::handler(pool, stake_account, now)
}

/// Deposit rewards into a pool (called after fee distribution)
pub fn deposit_rewards(pool: &mut StakingPool, amount: u64, now: i64) -> Result<RewardDeposit> {
    instructions::deposit_rewards::handler(pool, amount, now)
}

/// Start the cooldown for a future unstake
pub fn request_unstake(
    pool: &StakingPool,
    stake_account: &mut StakeAccount,
    amount: u64,
    now: i64,
) -> Result<Option<i64>> {
    instructions::request_unstake::handler(pool, stake_account, amount, now)
}

/// Cancel a pending unstake request
pub fn cancel_unstake(stake_account: &mut StakeAccount) -> Result<u64> {
    instructions::cancel_unstake::handler(stake_account)
}

/// Rewards `stake_account` could claim right now.
pub fn pending_rewards(pool: &StakingPool, stake_account: &StakeAccount) -> Result<u64> {
    pool.claimable(stake_account)
}
