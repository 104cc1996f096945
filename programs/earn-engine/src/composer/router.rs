use std::str::FromStr;
use std::time::Duration;

use anchor_lang::error::Error;
use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use async_trait::async_trait;
use base64::Engine as _;
use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::EarnError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
}

/// A priced route. `raw` is handed back to the router verbatim when the
/// swap is built.
#[derive(Clone, Debug, PartialEq)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output after slippage
    pub other_amount_threshold: u64,
    pub slippage_bps: u16,
    pub price_impact_pct: String,
    pub route_labels: Vec<String>,
    pub raw: serde_json::Value,
}

/// The swap split into its parts, so fee transfers can be placed between
/// the swap and its cleanup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SwapInstructions {
    pub compute_budget: Vec<Instruction>,
    pub setup: Vec<Instruction>,
    pub swap: Option<Instruction>,
    pub cleanup: Option<Instruction>,
    pub other: Vec<Instruction>,
    pub lookup_table_addresses: Vec<Pubkey>,
}

impl SwapInstructions {
    /// compute budget, setup, swap, `fees`, cleanup, other
    pub fn assemble(self, fees: Vec<Instruction>) -> Vec<Instruction> {
        let mut out = self.compute_budget;
        out.extend(self.setup);
        out.extend(self.swap);
        out.extend(fees);
        out.extend(self.cleanup);
        out.extend(self.other);
        out
    }
}

#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote>;

    async fn swap_instructions(&self, quote: &Quote, user: &Pubkey) -> Result<SwapInstructions>;

    /// Fully assembled (unsigned) transaction bytes for `quote`.
    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<Vec<u8>>;
}

/// Jupiter Metis v1 client.
pub struct JupiterRouter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl JupiterRouter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<serde_json::Value> {
        let request = match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        };
        let resp = request.timeout(self.timeout).send().await.map_err(|e| {
            log::warn!("[jupiter] {} request failed: {}", what, e);
            upstream_error(&e)
        })?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.map_err(|e| {
            log::warn!("[jupiter] {} returned an unreadable body: {}", what, e);
            upstream_error(&e)
        })?;

        if !status.is_success() {
            let msg = body
                .get("error")
                .and_then(|v| v.as_str())
                .or_else(|| body.get("message").and_then(|v| v.as_str()))
                .unwrap_or("Unknown error");
            log::warn!("[jupiter] {} failed ({}): {}", what, status, msg);
            if is_route_error(msg) {
                return err!(EarnError::InsufficientLiquidity);
            }
            return err!(EarnError::UpstreamUnavailable);
        }
        Ok(body)
    }

    fn swap_body(quote: &Quote, user: &Pubkey) -> serde_json::Value {
        serde_json::json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        })
    }
}

#[async_trait]
impl SwapRouter for JupiterRouter {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&restrictIntermediateTokens=true",
            self.base_url, request.input_mint, request.output_mint, request.amount, request.slippage_bps
        );
        info!(
            "[jupiter] Getting quote: {} {} -> {}",
            request.amount, request.input_mint, request.output_mint
        );

        let body = self.send(self.client.get(&url), "quote").await?;
        parse_quote(body)
    }

    async fn swap_instructions(&self, quote: &Quote, user: &Pubkey) -> Result<SwapInstructions> {
        let url = format!("{}/swap-instructions", self.base_url);
        let body = self
            .send(self.client.post(&url).json(&Self::swap_body(quote, user)), "swap-instructions")
            .await?;
        parse_swap_instructions(&body)
    }

    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<Vec<u8>> {
        let url = format!("{}/swap", self.base_url);
        let body = self
            .send(self.client.post(&url).json(&Self::swap_body(quote, user)), "swap")
            .await?;

        let encoded = body
            .get("swapTransaction")
            .and_then(|v| v.as_str())
            .ok_or(EarnError::MalformedUpstreamResponse)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| error!(EarnError::MalformedUpstreamResponse))
    }
}

fn upstream_error(e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        error!(EarnError::UpstreamTimeout)
    } else if e.is_decode() {
        error!(EarnError::MalformedUpstreamResponse)
    } else {
        error!(EarnError::UpstreamUnavailable)
    }
}

/// Whether an upstream error message means "no route".
pub fn is_route_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("could_not_find_any_route")
        || lower.contains("no route")
        || lower.contains("route not found")
        || lower.contains("no_routes_found")
}

fn amount_field(body: &serde_json::Value, field: &str) -> Result<u64> {
    let value = body.get(field).ok_or(EarnError::MalformedUpstreamResponse)?;
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_u64())
        .ok_or_else(|| error!(EarnError::MalformedUpstreamResponse))
}

fn pubkey_field(body: &serde_json::Value, field: &str) -> Result<Pubkey> {
    body.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Pubkey::from_str(s).ok())
        .ok_or_else(|| error!(EarnError::MalformedUpstreamResponse))
}

pub fn parse_quote(body: serde_json::Value) -> Result<Quote> {
    let out_amount = amount_field(&body, "outAmount")?;
    let route_plan = body.get("routePlan").and_then(|v| v.as_array());
    if out_amount == 0 || route_plan.map_or(true, |r| r.is_empty()) {
        return err!(EarnError::InsufficientLiquidity);
    }

    let route_labels = route_plan
        .into_iter()
        .flatten()
        .filter_map(|r| r.pointer("/swapInfo/label").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect();
    let slippage_bps = body
        .get("slippageBps")
        .and_then(|v| v.as_u64())
        .and_then(|v| u16::try_from(v).ok())
        .ok_or(EarnError::MalformedUpstreamResponse)?;

    Ok(Quote {
        input_mint: pubkey_field(&body, "inputMint")?,
        output_mint: pubkey_field(&body, "outputMint")?,
        in_amount: amount_field(&body, "inAmount")?,
        out_amount,
        other_amount_threshold: amount_field(&body, "otherAmountThreshold")?,
        slippage_bps,
        price_impact_pct: body
            .get("priceImpactPct")
            .and_then(|v| v.as_str())
            .unwrap_or("0")
            .to_string(),
        route_labels,
        raw: body,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccount {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstruction {
    program_id: String,
    accounts: Vec<RawAccount>,
    data: String,
}

impl RawInstruction {
    fn into_instruction(self) -> Result<Instruction> {
        let key = |s: &str| Pubkey::from_str(s).map_err(|_| error!(EarnError::MalformedUpstreamResponse));
        let accounts = self
            .accounts
            .iter()
            .map(|a| {
                Ok(AccountMeta {
                    pubkey: key(&a.pubkey)?,
                    is_signer: a.is_signer,
                    is_writable: a.is_writable,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Instruction {
            program_id: key(&self.program_id)?,
            accounts,
            data: base64::engine::general_purpose::STANDARD
                .decode(&self.data)
                .map_err(|_| error!(EarnError::MalformedUpstreamResponse))?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSwapInstructions {
    #[serde(default)]
    compute_budget_instructions: Vec<RawInstruction>,
    #[serde(default)]
    setup_instructions: Vec<RawInstruction>,
    swap_instruction: Option<RawInstruction>,
    cleanup_instruction: Option<RawInstruction>,
    #[serde(default)]
    other_instructions: Vec<RawInstruction>,
    #[serde(default)]
    address_lookup_table_addresses: Vec<String>,
}

pub fn parse_swap_instructions(body: &serde_json::Value) -> Result<SwapInstructions> {
    let raw: RawSwapInstructions = serde_json::from_value(body.clone()).map_err(|e| {
        log::warn!("[jupiter] Unexpected swap-instructions shape: {}", e);
        error!(EarnError::MalformedUpstreamResponse)
    })?;

    let all = |list: Vec<RawInstruction>| {
        list.into_iter()
            .map(RawInstruction::into_instruction)
            .collect::<Result<Vec<_>>>()
    };
    let swap = raw
        .swap_instruction
        .ok_or(EarnError::MalformedUpstreamResponse)?
        .into_instruction()?;

    Ok(SwapInstructions {
        compute_budget: all(raw.compute_budget_instructions)?,
        setup: all(raw.setup_instructions)?,
        swap: Some(swap),
        cleanup: raw.cleanup_instruction.map(RawInstruction::into_instruction).transpose()?,
        other: all(raw.other_instructions)?,
        lookup_table_addresses: raw
            .address_lookup_table_addresses
            .iter()
            .map(|s| Pubkey::from_str(s).map_err(|_| error!(EarnError::MalformedUpstreamResponse)))
            .collect::<Result<Vec<_>>>()?,
    })
}
