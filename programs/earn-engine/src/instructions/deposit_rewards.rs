use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use super::EngineContext;
use crate::events::{EarnEvent, RewardsDeposited};
use crate::state::RewardDeposit;
use crate::store;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRewardsArgs {
    pub token_mint: Pubkey,
    pub amount: u64,
}

/// Feed rewards straight into a pool, outside of trade fees
pub fn deposit_rewards(ctx: &EngineContext, args: &DepositRewardsArgs) -> Result<RewardDeposit> {
    ctx.token_config(&args.token_mint)?;
    let mut pool = ctx.staking_pool(&args.token_mint)?;

    let deposit = earn_staking::deposit_rewards(&mut pool, args.amount, ctx.now)?;
    ctx.store.put(
        &store::staking_pool_key(&args.token_mint),
        store::encode(&pool)?,
    )?;

    ctx.events.emit(EarnEvent::RewardsDeposited(RewardsDeposited {
        token_mint: args.token_mint,
        amount: deposit.deposited,
        allocated: deposit.allocated,
        parked: deposit.parked,
        timestamp: ctx.now,
    }));

    Ok(deposit)
}
