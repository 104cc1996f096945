use anchor_lang::prelude::*;
use earn_staking::{ClaimReceipt, StakingError};

use super::{EngineContext, PositionArgs};
use crate::events::{EarnEvent, RewardsClaimed};
use crate::store;

/// Claim accumulated staking rewards
pub fn claim(ctx: &EngineContext, args: &PositionArgs) -> Result<ClaimReceipt> {
    let mut pool = ctx.staking_pool(&args.token_mint)?;
    let mut account = ctx
        .stake_account(&args.token_mint, &args.user)?
        .ok_or_else(|| error!(StakingError::NoRewardsToClaim))?;

    let receipt = earn_staking::claim_rewards(&mut pool, &mut account, ctx.now)?;

    ctx.store.write_batch(vec![
        store::put_op(store::staking_pool_key(&args.token_mint), &pool)?,
        store::put_op(store::stake_key(&args.token_mint, &args.user), &account)?,
    ])?;

    ctx.events.emit(EarnEvent::RewardsClaimed(RewardsClaimed {
        user: args.user,
        token_mint: args.token_mint,
        amount: receipt.amount,
        timestamp: ctx.now,
    }));

    Ok(receipt)
}
