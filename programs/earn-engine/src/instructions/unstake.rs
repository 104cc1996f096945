use anchor_lang::prelude::*;
use earn_staking::{StakingError, UnstakeReceipt};
use serde::{Deserialize, Serialize};

use super::EngineContext;
use crate::events::{EarnEvent, Unstaked};
use crate::state::StakeAccount;
use crate::store::{self, BatchOp};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeArgs {
    pub token_mint: Pubkey,
    pub user: Pubkey,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionArgs {
    pub token_mint: Pubkey,
    pub user: Pubkey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeRequest {
    pub amount: u64,
    /// Earliest unstake time; `None` when the pool has no cooldown
    pub ready_at: Option<i64>,
}

fn position(ctx: &EngineContext, mint: &Pubkey, user: &Pubkey) -> Result<StakeAccount> {
    ctx.stake_account(mint, user)?
        .ok_or_else(|| error!(StakingError::InsufficientStake))
}

/// Withdraw stake and pay out every pending reward. A position that reaches
/// zero is removed.
pub fn unstake(ctx: &EngineContext, args: &UnstakeArgs) -> Result<UnstakeReceipt> {
    let mut pool = ctx.staking_pool(&args.token_mint)?;
    let mut account = position(ctx, &args.token_mint, &args.user)?;

    let receipt = earn_staking::unstake(&mut pool, &mut account, args.amount, ctx.now)?;

    let stake_key = store::stake_key(&args.token_mint, &args.user);
    let position_op = if receipt.closed {
        BatchOp::Delete { key: stake_key }
    } else {
        store::put_op(stake_key, &account)?
    };
    ctx.store.write_batch(vec![
        store::put_op(store::staking_pool_key(&args.token_mint), &pool)?,
        position_op,
    ])?;

    ctx.events.emit(EarnEvent::Unstaked(Unstaked {
        user: args.user,
        token_mint: args.token_mint,
        amount: args.amount,
        rewards_claimed: receipt.rewards_paid,
        remaining_stake: receipt.remaining_stake,
        timestamp: ctx.now,
    }));

    Ok(receipt)
}

/// Start the cooldown for a later unstake
pub fn request_unstake(ctx: &EngineContext, args: &UnstakeArgs) -> Result<UnstakeRequest> {
    let pool = ctx.staking_pool(&args.token_mint)?;
    let mut account = position(ctx, &args.token_mint, &args.user)?;

    let ready_at = earn_staking::request_unstake(&pool, &mut account, args.amount, ctx.now)?;
    if ready_at.is_some() {
        ctx.store.put(
            &store::stake_key(&args.token_mint, &args.user),
            store::encode(&account)?,
        )?;
    }

    Ok(UnstakeRequest {
        amount: args.amount,
        ready_at,
    })
}

/// Drop a pending unstake request. Returns the amount that was requested.
pub fn cancel_unstake(ctx: &EngineContext, args: &PositionArgs) -> Result<u64> {
    let mut account = ctx
        .stake_account(&args.token_mint, &args.user)?
        .ok_or_else(|| error!(StakingError::NoUnstakeRequest))?;

    let cancelled = earn_staking::cancel_unstake(&mut account)?;
    ctx.store.put(
        &store::stake_key(&args.token_mint, &args.user),
        store::encode(&account)?,
    )?;

    Ok(cancelled)
}
