use anchor_lang::prelude::*;

use crate::errors::StakingError;
use crate::state::StakeAccount;

/// Cancel a pending unstake request, returning the amount that was requested
pub fn handler(stake_account: &mut StakeAccount) -> Result<u64> {
    require!(
        stake_account.has_unstake_request(),
        StakingError::NoUnstakeRequest
    );

    let cancelled_amount = stake_account.unstake_amount;
    stake_account.clear_unstake_request();

    log::info!("Cancelled unstake request for {} tokens", cancelled_amount);

    Ok(cancelled_amount)
}
