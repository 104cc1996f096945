use anchor_lang::prelude::*;
use earn_staking::StakeReceipt;
use serde::{Deserialize, Serialize};

use super::EngineContext;
use crate::events::{EarnEvent, Staked};
use crate::state::StakeAccount;
use crate::store;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeArgs {
    pub token_mint: Pubkey,
    pub user: Pubkey,
    pub amount: u64,
}

/// Stake tokens into a token's pool, opening the position if needed
pub fn stake(ctx: &EngineContext, args: &StakeArgs) -> Result<StakeReceipt> {
    ctx.active_token_config(&args.token_mint)?;
    let mut pool = ctx.staking_pool(&args.token_mint)?;
    let mut account = ctx
        .stake_account(&args.token_mint, &args.user)?
        .unwrap_or_else(|| {
            StakeAccount::new(args.user, args.token_mint, pool.reward_per_token_stored, ctx.now)
        });

    let receipt = earn_staking::stake(&mut pool, &mut account, args.amount, ctx.now)?;

    ctx.store.write_batch(vec![
        store::put_op(store::staking_pool_key(&args.token_mint), &pool)?,
        store::put_op(store::stake_key(&args.token_mint, &args.user), &account)?,
    ])?;

    ctx.events.emit(EarnEvent::Staked(Staked {
        user: args.user,
        token_mint: args.token_mint,
        amount: args.amount,
        new_total_staked: receipt.staked_amount,
        pool_total_staked: receipt.pool_total_staked,
        timestamp: ctx.now,
    }));

    Ok(receipt)
}
