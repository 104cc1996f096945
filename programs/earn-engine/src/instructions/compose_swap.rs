use anchor_lang::prelude::*;

use super::EngineContext;
use crate::composer::{ComposeSwapRequest, FeeTerms};
use crate::errors::EarnError;

/// Validated inputs for a composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreparedSwap {
    pub slippage_bps: u16,
    pub terms: FeeTerms,
}

/// Everything that can be rejected without talking to the router or RPC.
pub fn prepare_swap(ctx: &EngineContext, request: &ComposeSwapRequest) -> Result<PreparedSwap> {
    require!(request.amount > 0, EarnError::InvalidAmount);
    let config = ctx.active_token_config(&request.token_mint)?;

    require!(
        request.input_mint != request.output_mint
            && (request.token_mint == request.input_mint || request.token_mint == request.output_mint),
        EarnError::InvalidTokenPair
    );

    let slippage_bps = request
        .slippage_bps
        .unwrap_or(ctx.config.default_slippage_bps);
    require!(
        slippage_bps <= ctx.config.max_slippage_bps,
        EarnError::SlippageTooHigh
    );

    let weights = config.splits.weights();
    let owners = config.bucket_owners(ctx.config.protocol_wallet);
    for (owner, weight) in owners.iter().zip(weights) {
        if weight > 0 && owner.is_none() {
            return err!(EarnError::DestinationNotProvisioned);
        }
    }

    Ok(PreparedSwap {
        slippage_bps,
        terms: FeeTerms {
            fee_basis_points: config.fee_basis_points,
            weights,
            owners,
        },
    })
}
