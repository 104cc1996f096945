use anchor_lang::prelude::*;

use crate::errors::StakingError;
use crate::state::{StakeAccount, StakingPool};

/// Request to unstake tokens - starts the cooldown period.
/// Returns the earliest unstake time, or `None` when the pool has no cooldown.
pub fn handler(
    pool: &StakingPool,
    stake_account: &mut StakeAccount,
    amount: u64,
    now: i64,
) -> Result<Option<i64>> {
    require!(amount > 0, StakingError::InvalidAmount);

    // Validate sufficient balance
    require!(
        stake_account.staked_amount >= amount,
        StakingError::InsufficientStake
    );

    // Check if already has a pending request
    require!(
        !stake_account.has_unstake_request(),
        StakingError::AlreadyRequestedUnstake
    );

    // If no cooldown, they can unstake directly
    if pool.cooldown_seconds == 0 {
        log::info!("No cooldown required - user can unstake directly");
        return Ok(None);
    }

    stake_account.unstake_requested_at = now;
    stake_account.unstake_amount = amount;

    let ready_at = now + pool.cooldown_seconds as i64;
    log::info!(
        "Unstake request recorded for {} tokens, can unstake after {}",
        amount,
        ready_at
    );

    Ok(Some(ready_at))
}
