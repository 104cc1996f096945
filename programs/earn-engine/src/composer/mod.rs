//! Swap + fee transaction composition.
//!
//! The swap comes from an external router. Fee transfers are spliced in
//! after the swap body and ahead of any cleanup, and the result is
//! recompiled against the same lookup tables with a fresh blockhash.

pub mod fees;
pub mod message;
pub mod router;
pub mod rpc;
pub mod wire;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::hash::Hash;
use anchor_lang::solana_program::instruction::Instruction;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::EarnError;
use crate::math::{apply_bps, FeeDistribution};

pub use fees::{check_destinations, fee_transfer_instructions};
pub use message::{MessageFormat, TransactionPlan};
pub use router::{JupiterRouter, Quote, QuoteRequest, SwapInstructions, SwapRouter};
pub use rpc::{resolve_lookup_tables, ChainRpc, JsonRpcClient};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeSwapRequest {
    /// Registered token; must be one of the two legs
    pub token_mint: Pubkey,
    pub user: Pubkey,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    #[serde(default)]
    pub slippage_bps: Option<u16>,
    /// Reject quotes paying out less than this
    #[serde(default)]
    pub min_output_amount: Option<u64>,
}

/// What the fee on a swap looks like for one registered token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeTerms {
    pub fee_basis_points: u16,
    pub weights: [u16; 4],
    pub owners: [Option<Pubkey>; 4],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedSwap {
    /// Unsigned transaction, base64
    pub transaction: String,
    pub format: MessageFormat,
    pub fee: FeeDistribution,
    /// False when the router's transaction is returned untouched
    pub fees_included: bool,
    pub fee_instruction_count: usize,
    pub quoted_output: u64,
    pub min_output: u64,
    pub route_labels: Vec<String>,
    pub blockhash: String,
    /// Re-request after this unix timestamp
    pub expires_at: i64,
}

pub struct Composer {
    router: Arc<dyn SwapRouter>,
    rpc: Arc<dyn ChainRpc>,
    upstream_timeout: Duration,
    blockhash_validity_secs: u64,
}

/// Wire bytes and metadata of a finished transaction.
struct Built {
    bytes: Vec<u8>,
    format: MessageFormat,
    blockhash: Hash,
    fees_included: bool,
}

impl Composer {
    pub fn new(
        router: Arc<dyn SwapRouter>,
        rpc: Arc<dyn ChainRpc>,
        upstream_timeout: Duration,
        blockhash_validity_secs: u64,
    ) -> Self {
        Self {
            router,
            rpc,
            upstream_timeout,
            blockhash_validity_secs,
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.upstream_timeout, call)
            .await
            .map_err(|_| error!(EarnError::UpstreamTimeout))?
    }

    pub async fn compose(
        &self,
        request: &ComposeSwapRequest,
        slippage_bps: u16,
        terms: &FeeTerms,
        now: i64,
    ) -> Result<ComposedSwap> {
        let quote = self
            .bounded(self.router.quote(&QuoteRequest {
                input_mint: request.input_mint,
                output_mint: request.output_mint,
                amount: request.amount,
                slippage_bps,
            }))
            .await?;

        // Fees are built for the requested output mint
        if quote.input_mint != request.input_mint
            || quote.output_mint != request.output_mint
            || quote.in_amount != request.amount
        {
            log::warn!(
                "[composer] Router quoted {} {} -> {}, requested {} {} -> {}",
                quote.in_amount,
                quote.input_mint,
                quote.output_mint,
                request.amount,
                request.input_mint,
                request.output_mint
            );
            return err!(EarnError::MalformedUpstreamResponse);
        }

        if let Some(min) = request.min_output_amount {
            if quote.out_amount < min {
                log::info!(
                    "[composer] Quote {} below requested minimum {}",
                    quote.out_amount,
                    min
                );
                return err!(EarnError::SlippageExceeded);
            }
        }

        // Fee always comes out of the output leg
        let fee_total = apply_bps(quote.out_amount, terms.fee_basis_points)?;
        let fee = FeeDistribution::compute(fee_total, terms.weights)?;
        let fee_ixs = fee_transfer_instructions(&request.user, &request.output_mint, &terms.owners, &fee)?;
        let fee_instruction_count = fee_ixs.len();

        let built = match self
            .bounded(self.router.swap_instructions(&quote, &request.user))
            .await
        {
            Ok(parts) => self.build_from_parts(&quote, &request.user, parts, fee_ixs).await?,
            Err(e) => {
                log::info!(
                    "[composer] Swap instructions unavailable ({}), using assembled transaction",
                    e
                );
                self.build_from_assembled(&quote, &request.user, fee_ixs).await?
            }
        };

        if !built.fees_included {
            log::warn!(
                "[composer] Returning swap for {} without fee collection ({} in fees not included)",
                request.user,
                fee.total
            );
        }

        Ok(ComposedSwap {
            transaction: base64::engine::general_purpose::STANDARD.encode(&built.bytes),
            format: built.format,
            fee,
            fees_included: built.fees_included,
            fee_instruction_count: if built.fees_included { fee_instruction_count } else { 0 },
            quoted_output: quote.out_amount,
            min_output: quote.other_amount_threshold,
            route_labels: quote.route_labels.clone(),
            blockhash: built.blockhash.to_string(),
            expires_at: now.saturating_add(self.blockhash_validity_secs as i64),
        })
    }

    /// Decomposed path: build a v0 message from the router's instruction list.
    async fn build_from_parts(
        &self,
        quote: &Quote,
        user: &Pubkey,
        parts: SwapInstructions,
        fee_ixs: Vec<Instruction>,
    ) -> Result<Built> {
        let tables = match self
            .bounded(resolve_lookup_tables(self.rpc.as_ref(), &parts.lookup_table_addresses))
            .await
        {
            Ok(tables) => tables,
            Err(e) => {
                log::warn!("[composer] Lookup table resolution failed: {}", e);
                let bytes = self.bounded(self.router.swap_transaction(quote, user)).await?;
                return unmodified(bytes);
            }
        };

        let plan = TransactionPlan::v0(*user, parts.assemble(fee_ixs), tables);
        self.finish(&plan).await
    }

    /// Assembled path: decompile the router's transaction and splice fees in.
    async fn build_from_assembled(&self, quote: &Quote, user: &Pubkey, fee_ixs: Vec<Instruction>) -> Result<Built> {
        let bytes = self.bounded(self.router.swap_transaction(quote, user)).await?;
        let message = wire::decode_transaction(&bytes)?;

        let table_keys = TransactionPlan::required_tables(&message);
        let tables = match self
            .bounded(resolve_lookup_tables(self.rpc.as_ref(), &table_keys))
            .await
        {
            Ok(tables) => tables,
            Err(e) => {
                log::warn!("[composer] Lookup table resolution failed: {}", e);
                return unmodified(bytes);
            }
        };

        let mut plan = TransactionPlan::decompile(&message, &tables)?;
        require_keys_eq!(plan.payer, *user, EarnError::MalformedUpstreamResponse);
        let cleanup = plan.trailing_cleanup_count();
        plan.insert_before_cleanup(fee_ixs, cleanup);
        self.finish(&plan).await
    }

    async fn finish(&self, plan: &TransactionPlan) -> Result<Built> {
        let blockhash = self.bounded(self.rpc.get_latest_blockhash()).await?;
        let message = plan.compile(blockhash)?;
        Ok(Built {
            bytes: wire::encode_unsigned(&message),
            format: plan.format,
            blockhash,
            fees_included: true,
        })
    }
}

fn unmodified(bytes: Vec<u8>) -> Result<Built> {
    let message = wire::decode_transaction(&bytes)?;
    Ok(Built {
        format: MessageFormat::from(&message),
        blockhash: *message.recent_blockhash(),
        bytes,
        fees_included: false,
    })
}
