use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::StakingError;
use crate::state::{StakeAccount, StakingPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub amount: u64,
}

pub fn handler(
    pool: &mut StakingPool,
    stake_account: &mut StakeAccount,
    now: i64,
) -> Result<ClaimReceipt> {
    require_keys_eq!(stake_account.token_mint, pool.token_mint, StakingError::InvalidPool);

    // Update rewards
    stake_account.settle(pool.reward_per_token_stored)?;

    require!(
        stake_account.pending_rewards > 0,
        StakingError::NoRewardsToClaim
    );

    let rewards_to_claim = stake_account.take_pending(now);
    pool.total_rewards_claimed = pool
        .total_rewards_claimed
        .checked_add(rewards_to_claim)
        .ok_or(StakingError::Overflow)?;
    pool.last_update_time = now;

    log::info!(
        "Claimed {} in rewards from {} for {}",
        rewards_to_claim,
        pool.token_mint,
        stake_account.owner
    );

    Ok(ClaimReceipt {
        amount: rewards_to_claim,
    })
}
