#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::hash::Hash;
use async_trait::async_trait;
use parking_lot::Mutex;

use earn_engine::composer::{ChainRpc, Quote, QuoteRequest, SwapInstructions, SwapRouter};
use earn_engine::store::MemoryStore;
use earn_engine::time::ManualTime;
use earn_engine::{EarnEngine, EarnError, EngineConfig, FeeSplits, RegisterArgs};

pub const START: i64 = 1_700_000_000;

/// Router returning canned responses and counting every call.
#[derive(Default)]
pub struct MockRouter {
    pub out_amount: u64,
    pub parts: Option<SwapInstructions>,
    pub assembled: Option<Vec<u8>>,
    /// Quote fails with this error instead
    pub quote_error: Option<EarnError>,
    /// Quote never answers within any sane timeout
    pub stall: bool,
    /// Quote names this output mint instead of the requested one
    pub quoted_output_mint: Option<Pubkey>,
    pub calls: AtomicUsize,
}

impl MockRouter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapRouter for MockRouter {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        if let Some(e) = self.quote_error {
            return Err(e.into());
        }
        Ok(Quote {
            input_mint: request.input_mint,
            output_mint: self.quoted_output_mint.unwrap_or(request.output_mint),
            in_amount: request.amount,
            out_amount: self.out_amount,
            other_amount_threshold: self.out_amount - self.out_amount * request.slippage_bps as u64 / 10_000,
            slippage_bps: request.slippage_bps,
            price_impact_pct: "0".to_string(),
            route_labels: vec!["Mock".to_string()],
            raw: serde_json::json!({}),
        })
    }

    async fn swap_instructions(&self, _quote: &Quote, _user: &Pubkey) -> Result<SwapInstructions> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.parts
            .clone()
            .ok_or_else(|| error!(EarnError::UpstreamUnavailable))
    }

    async fn swap_transaction(&self, _quote: &Quote, _user: &Pubkey) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.assembled
            .clone()
            .ok_or_else(|| error!(EarnError::UpstreamUnavailable))
    }
}

pub struct MockRpc {
    pub accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    pub blockhash: Hash,
    pub calls: AtomicUsize,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            blockhash: Hash::new_unique(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockRpc {
    pub fn with_table(self, key: Pubkey, addresses: &[Pubkey]) -> Self {
        self.accounts.lock().insert(key, lookup_table_data(addresses));
        self
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().get(address).cloned())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.blockhash)
    }
}

/// Account bytes of an active address lookup table.
pub fn lookup_table_data(addresses: &[Pubkey]) -> Vec<u8> {
    let mut data = Vec::new();
    // ProgramState::LookupTable
    data.extend_from_slice(&1u32.to_le_bytes());
    // deactivation_slot, last_extended_slot, start index, no authority
    data.extend_from_slice(&u64::MAX.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.push(0);
    data.push(0);
    data.resize(56, 0);
    for address in addresses {
        data.extend_from_slice(address.as_ref());
    }
    data
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        protocol_wallet: Some(Pubkey::new_unique()),
        program_id: Some(Pubkey::new_unique()),
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub engine: EarnEngine,
    pub time: Arc<ManualTime>,
    pub router: Arc<MockRouter>,
    pub rpc: Arc<MockRpc>,
    pub store: Arc<MemoryStore>,
}

pub fn harness_with(config: EngineConfig, router: MockRouter, rpc: MockRpc) -> Harness {
    let time = Arc::new(ManualTime::new(START));
    let router = Arc::new(router);
    let rpc = Arc::new(rpc);
    let store = Arc::new(MemoryStore::new());
    let engine = EarnEngine::with_time_source(
        config,
        store.clone(),
        router.clone(),
        rpc.clone(),
        time.clone(),
    )
    .unwrap();
    Harness {
        engine,
        time,
        router,
        rpc,
        store,
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), MockRouter::default(), MockRpc::default())
}

/// fee=300bps, weights 1000/1000/5000/3000
pub fn scenario_registration(mint: Pubkey, creator: Pubkey) -> RegisterArgs {
    RegisterArgs {
        token_mint: mint,
        creator,
        fee_basis_points: 300,
        splits: Some(FeeSplits {
            earn_cut_bps: 1000,
            creator_cut_bps: 1000,
            buyback_cut_bps: 5000,
            staking_cut_bps: 3000,
        }),
        destinations: Default::default(),
        min_stake_amount: 0,
        cooldown_seconds: 0,
    }
}
