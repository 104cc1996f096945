use anchor_lang::prelude::*;

use crate::errors::StakingError;
use crate::state::{RewardDeposit, StakingPool};

pub fn handler(pool: &mut StakingPool, amount: u64, now: i64) -> Result<RewardDeposit> {
    require!(amount > 0, StakingError::InvalidAmount);

    let deposit = pool.distribute(amount, now)?;

    if deposit.parked > 0 {
        log::info!(
            "No stakers in {}; parked {} (backlog {})",
            pool.token_mint,
            deposit.parked,
            pool.unallocated_rewards
        );
    } else {
        log::info!("Deposited {} as rewards into {}", deposit.allocated, pool.token_mint);
        log::debug!("New reward_per_token: {}", pool.reward_per_token_stored.raw());
    }

    Ok(deposit)
}
