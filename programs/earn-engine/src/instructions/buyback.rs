use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use super::EngineContext;
use crate::errors::EarnError;
use crate::events::{BuybackExecuted, EarnEvent};
use crate::store;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteBuybackArgs {
    pub token_mint: Pubkey,
    /// Treasury balance spent on the buyback
    pub amount: u64,
    /// Tokens bought back and burned
    #[serde(default)]
    pub tokens_burned: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuybackReceipt {
    pub amount_spent: u64,
    pub tokens_burned: u64,
    pub treasury_balance_after: u64,
}

/// Record a buyback paid from the treasury. Permissionless once the
/// threshold is met and the cooldown has passed.
pub fn execute_buyback(ctx: &EngineContext, args: &ExecuteBuybackArgs) -> Result<BuybackReceipt> {
    require!(args.amount > 0, EarnError::InvalidAmount);
    ctx.token_config(&args.token_mint)?;
    let mut treasury = ctx.treasury(&args.token_mint)?;

    require!(
        treasury.buyback_balance >= treasury.buyback_threshold,
        EarnError::BelowBuybackThreshold
    );
    require!(
        args.amount <= treasury.buyback_balance,
        EarnError::InsufficientBalance
    );
    if treasury.last_buyback != 0 {
        let ready_at = treasury
            .last_buyback
            .saturating_add(ctx.config.buyback_cooldown_secs as i64);
        require!(ctx.now >= ready_at, EarnError::BuybackCooldown);
    }

    treasury.spend_buyback(args.amount, args.tokens_burned, ctx.now)?;
    ctx.store.put(
        &store::treasury_key(&args.token_mint),
        store::encode(&treasury)?,
    )?;

    ctx.events.emit(EarnEvent::BuybackExecuted(BuybackExecuted {
        token_mint: args.token_mint,
        amount_spent: args.amount,
        tokens_burned: args.tokens_burned,
        treasury_balance_after: treasury.buyback_balance,
        timestamp: ctx.now,
    }));

    if args.tokens_burned > 0 {
        log::info!(
            "Buyback executed: {} spent, {} tokens burned",
            args.amount,
            args.tokens_burned
        );
    } else {
        log::info!("Buyback executed: {} spent (no tokens to burn yet)", args.amount);
    }

    Ok(BuybackReceipt {
        amount_spent: args.amount,
        tokens_burned: args.tokens_burned,
        treasury_balance_after: treasury.buyback_balance,
    })
}
