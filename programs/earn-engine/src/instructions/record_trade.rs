use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use super::EngineContext;
use crate::composer::check_destinations;
use crate::errors::EarnError;
use crate::events::{EarnEvent, FeeCollected, RewardsDeposited};
use crate::math::{apply_bps, FeeDistribution};
use crate::state::*;
use crate::store;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTradeArgs {
    pub token_mint: Pubkey,
    pub trade_amount: u64,
    pub direction: TradeDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub fee: FeeDistribution,
    pub staking_deposit: RewardDeposit,
}

/// Collect fee from a trade and distribute it to all parties
pub fn record_trade(ctx: &EngineContext, args: &RecordTradeArgs) -> Result<TradeReceipt> {
    require!(args.trade_amount > 0, EarnError::InvalidAmount);
    let config = ctx.active_token_config(&args.token_mint)?;

    let total_fee = apply_bps(args.trade_amount, config.fee_basis_points)?;
    let fee = FeeDistribution::compute(total_fee, config.splits.weights())?;
    check_destinations(&config.bucket_owners(ctx.config.protocol_wallet), &fee)?;

    let mut treasury = ctx.treasury(&args.token_mint)?;
    let mut pool = ctx.staking_pool(&args.token_mint)?;

    treasury.record_fee(args.trade_amount, args.direction, &fee)?;
    let staking_deposit = if fee.staking > 0 {
        pool.distribute(fee.staking, ctx.now)?
    } else {
        RewardDeposit::default()
    };

    let ops = vec![
        store::put_op(store::treasury_key(&args.token_mint), &treasury)?,
        store::put_op(store::staking_pool_key(&args.token_mint), &pool)?,
    ];
    ctx.commit_with_stats(ops, |stats| {
        stats.total_fees_processed = stats
            .total_fees_processed
            .checked_add(fee.total)
            .ok_or(EarnError::Overflow)?;
        stats.total_earn_collected = stats
            .total_earn_collected
            .checked_add(fee.earn)
            .ok_or(EarnError::Overflow)?;
        Ok(())
    })?;

    ctx.events.emit(EarnEvent::FeeCollected(FeeCollected {
        token_mint: args.token_mint,
        trade_amount: args.trade_amount,
        total_fee: fee.total,
        earn_amount: fee.earn,
        creator_amount: fee.creator,
        buyback_amount: fee.buyback,
        staking_amount: fee.staking,
        timestamp: ctx.now,
    }));
    if staking_deposit.deposited > 0 {
        ctx.events.emit(EarnEvent::RewardsDeposited(RewardsDeposited {
            token_mint: args.token_mint,
            amount: staking_deposit.deposited,
            allocated: staking_deposit.allocated,
            parked: staking_deposit.parked,
            timestamp: ctx.now,
        }));
    }

    log::info!(
        "Fee collected: {} (Earn: {}, Creator: {}, Buyback: {}, Staking: {})",
        fee.total,
        fee.earn,
        fee.creator,
        fee.buyback,
        fee.staking
    );

    Ok(TradeReceipt { fee, staking_deposit })
}
