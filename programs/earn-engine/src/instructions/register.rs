use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use super::EngineContext;
use crate::errors::EarnError;
use crate::events::{EarnEvent, TokenRegistered};
use crate::state::*;
use crate::store::{self, BatchOp};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterArgs {
    pub token_mint: Pubkey,
    pub creator: Pubkey,
    pub fee_basis_points: u16,
    /// Configured defaults when omitted
    #[serde(default)]
    pub splits: Option<FeeSplits>,
    #[serde(default)]
    pub destinations: FeeDestinations,
    #[serde(default)]
    pub min_stake_amount: u64,
    #[serde(default)]
    pub cooldown_seconds: u32,
}

/// Register a new token with Earn Protocol
/// Creates: TokenConfig, Treasury, StakingPool
pub fn register(ctx: &EngineContext, args: &RegisterArgs) -> Result<TokenConfig> {
    let config = ctx.config;

    // Validate fee
    require!(
        args.fee_basis_points >= config.min_fee_bps && args.fee_basis_points <= config.max_fee_bps,
        EarnError::FeeOutOfBounds
    );

    let splits = args.splits.unwrap_or(config.default_splits);
    splits.validate(config.min_earn_cut_bps)?;

    let destinations = match config.program_id {
        Some(program_id) => args
            .destinations
            .or(FeeDestinations::program_derived(&program_id, &args.token_mint)),
        None => args.destinations,
    };
    for destination in [destinations.buyback, destinations.staking].into_iter().flatten() {
        require_keys_neq!(destination, args.creator, EarnError::InvalidDestination);
    }

    if let Some(existing) = store::load::<TokenConfig>(ctx.store, &store::token_config_key(&args.token_mint))? {
        if existing.creator != args.creator {
            ctx.events.security_alert(
                "registration_takeover",
                Some(args.token_mint),
                format!(
                    "{} tried to re-register a token owned by {}",
                    args.creator, existing.creator
                ),
                ctx.now,
            );
        }
        return err!(EarnError::TokenAlreadyRegistered);
    }

    let token_config = TokenConfig {
        token_mint: args.token_mint,
        creator: args.creator,
        fee_basis_points: args.fee_basis_points,
        splits,
        destinations,
        is_active: true,
        created_at: ctx.now,
    };
    let treasury = Treasury::new(args.token_mint, config.buyback_threshold);
    let pool = earn_staking::create_pool(
        args.token_mint,
        args.min_stake_amount,
        args.cooldown_seconds,
        ctx.now,
    );

    let ops: Vec<BatchOp> = vec![
        store::put_op(store::token_config_key(&args.token_mint), &token_config)?,
        store::put_op(store::treasury_key(&args.token_mint), &treasury)?,
        store::put_op(store::staking_pool_key(&args.token_mint), &pool)?,
    ];
    // Records and master stats land together
    ctx.commit_with_stats(ops, |stats| {
        stats.total_tokens_registered = stats
            .total_tokens_registered
            .checked_add(1)
            .ok_or(EarnError::Overflow)?;
        Ok(())
    })?;

    ctx.events.emit(EarnEvent::TokenRegistered(TokenRegistered {
        token_mint: args.token_mint,
        creator: args.creator,
        fee_basis_points: args.fee_basis_points,
        earn_cut_bps: splits.earn_cut_bps,
        creator_cut_bps: splits.creator_cut_bps,
        buyback_cut_bps: splits.buyback_cut_bps,
        staking_cut_bps: splits.staking_cut_bps,
        timestamp: ctx.now,
    }));

    log::info!("Token registered: {}", args.token_mint);
    log::info!("Creator: {}", args.creator);
    log::info!(
        "Fee: {}bps (Earn: {}, Creator: {}, Buyback: {}, Staking: {})",
        args.fee_basis_points,
        splits.earn_cut_bps,
        splits.creator_cut_bps,
        splits.buyback_cut_bps,
        splits.staking_cut_bps
    );

    Ok(token_config)
}
