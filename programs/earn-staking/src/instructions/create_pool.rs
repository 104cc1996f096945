use anchor_lang::prelude::*;

use crate::state::StakingPool;

/// Create an empty staking pool for a token
pub fn handler(
    token_mint: Pubkey,
    min_stake_amount: u64,
    cooldown_seconds: u32,
    now: i64,
) -> StakingPool {
    let pool = StakingPool::new(token_mint, min_stake_amount, cooldown_seconds, now);

    log::info!("Created staking pool for mint: {}", pool.token_mint);
    log::info!("Min stake: {}, Cooldown: {}s", min_stake_amount, cooldown_seconds);

    pool
}
