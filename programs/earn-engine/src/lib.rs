//! Earn Engine
//!
//! Tokenomics-as-a-Service for memecoins, off chain:
//! - Fee collection on trades, split between protocol, creator, buyback
//!   and staking
//! - Staking rewards (accounting lives in `earn_staking`)
//! - Buyback bookkeeping
//! - Swap transactions with the fee transfers already inside
//!
//! Every mutating call goes through the operation ledger, so a request
//! retried with the same idempotency key runs its side effects once.

use std::sync::Arc;

use anchor_lang::error::Error;
use anchor_lang::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub mod composer;
pub mod config;
pub mod errors;
pub mod events;
pub mod instructions;
pub mod ledger;
pub mod math;
pub mod state;
pub mod store;
pub mod time;

pub use composer::{ComposeSwapRequest, ComposedSwap};
pub use config::EngineConfig;
pub use errors::{classify, is_retryable, EarnError, ErrorClass};
pub use events::EarnEvent;
pub use instructions::*;
pub use math::FeeDistribution;
pub use state::*;

use composer::{ChainRpc, Composer, JsonRpcClient, JupiterRouter, SwapRouter};
use earn_staking::{ClaimReceipt, StakeReceipt, UnstakeReceipt};
use events::{EventLog, SwapComposed};
use ledger::OperationLedger;
use store::{KeyValueStore, MemoryStore, TokenLocks};
use time::{SystemTime, TimeSource};

/// Result of a mutating call together with its ledger record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation<T> {
    pub record: OperationRecord,
    pub result: T,
    /// True when the stored outcome was returned without re-executing
    pub replayed: bool,
}

enum Begin<T> {
    Replay(Operation<T>),
    Run(OperationRecord),
}

pub struct EarnEngine {
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    time: Arc<dyn TimeSource>,
    locks: TokenLocks,
    ledger: OperationLedger,
    events: EventLog,
    composer: Composer,
}

impl EarnEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        router: Arc<dyn SwapRouter>,
        rpc: Arc<dyn ChainRpc>,
    ) -> Result<Self> {
        Self::with_time_source(config, store, router, rpc, Arc::new(SystemTime))
    }

    /// In-memory store, Jupiter router and JSON-RPC client from `config`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let router = JupiterRouter::new(
            config.jupiter_api_url.clone(),
            config.jupiter_api_key.clone(),
            config.upstream_timeout(),
        );
        let rpc = JsonRpcClient::new(config.rpc_url.clone(), config.upstream_timeout());
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(router),
            Arc::new(rpc),
        )
    }

    pub fn with_time_source(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        router: Arc<dyn SwapRouter>,
        rpc: Arc<dyn ChainRpc>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;
        if config.protocol_wallet.is_none() {
            log::warn!("No protocol wallet configured; tokens with a nonzero earn cut cannot collect fees");
        }

        let composer = Composer::new(
            router,
            rpc,
            config.upstream_timeout(),
            config.blockhash_validity_secs,
        );
        Ok(Self {
            ledger: OperationLedger::new(store.clone()),
            locks: TokenLocks::default(),
            events: EventLog::default(),
            config,
            store,
            time,
            composer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn context(&self, now: i64) -> instructions::EngineContext<'_> {
        instructions::EngineContext {
            config: &self.config,
            store: self.store.as_ref(),
            events: &self.events,
            now,
        }
    }

    // ── Ledger plumbing ───────────────────────────────────────────────

    fn begin<T: DeserializeOwned>(
        &self,
        kind: OperationKind,
        idempotency_key: Option<&str>,
        payload: &impl Serialize,
        token_mint: Pubkey,
        now: i64,
    ) -> Result<Begin<T>> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            log::error!("Unserializable {} payload: {}", kind.as_str(), e);
            error!(EarnError::InternalInvariantViolation)
        })?;

        let (record, is_new) = match self.ledger.get_or_create(idempotency_key, kind, &payload, now) {
            Ok(created) => created,
            Err(e) => {
                if e == Error::from(EarnError::IdempotencyKeyConflict) {
                    self.events.security_alert(
                        "idempotency_conflict",
                        Some(token_mint),
                        format!(
                            "Key {} reused for a different {} request",
                            idempotency_key.unwrap_or_default(),
                            kind.as_str()
                        ),
                        now,
                    );
                }
                return Err(e);
            }
        };

        if !is_new {
            return replay(record).map(Begin::Replay);
        }
        let record = self.ledger.transition(
            &record.operation_id,
            OperationStatus::Processing,
            ledger::Transition::default(),
            now,
        )?;
        Ok(Begin::Run(record))
    }

    fn finish<T: Serialize>(&self, record: OperationRecord, outcome: Result<T>) -> Result<Operation<T>> {
        let now = self.time.now();
        match outcome {
            Ok(result) => {
                let encoded = serde_json::to_string(&result).map_err(|e| {
                    log::error!("Unserializable {} result: {}", record.kind.as_str(), e);
                    error!(EarnError::InternalInvariantViolation)
                })?;
                let record = self.ledger.complete(&record.operation_id, encoded, now)?;
                Ok(Operation {
                    record,
                    result,
                    replayed: false,
                })
            }
            Err(e) => {
                if classify(&e) == ErrorClass::Invariant {
                    self.events.security_alert(
                        "invariant_violation",
                        None,
                        format!("{} failed: {}", record.kind.as_str(), e),
                        now,
                    );
                }
                self.ledger.fail(&record.operation_id, &e, now)?;
                Err(e)
            }
        }
    }

    /// Run a synchronous, per-token mutation through the ledger.
    fn execute<P, T, F>(
        &self,
        kind: OperationKind,
        idempotency_key: Option<&str>,
        token_mint: Pubkey,
        args: &P,
        handler: F,
    ) -> Result<Operation<T>>
    where
        P: Serialize,
        T: Serialize + DeserializeOwned,
        F: FnOnce(&instructions::EngineContext, &P) -> Result<T>,
    {
        let now = self.time.now();
        let record = match self.begin(kind, idempotency_key, args, token_mint, now)? {
            Begin::Replay(operation) => return Ok(operation),
            Begin::Run(record) => record,
        };

        let outcome = self
            .locks
            .with(&token_mint, || handler(&self.context(now), args));
        self.finish(record, outcome)
    }

    // ── Mutations ─────────────────────────────────────────────────────

    /// Register a new token. Creates its config, treasury and staking pool.
    pub fn register(&self, args: RegisterArgs, idempotency_key: Option<&str>) -> Result<Operation<TokenConfig>> {
        self.execute(
            OperationKind::Register,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::register,
        )
    }

    /// Collect and split the fee on one trade.
    pub fn record_trade(&self, args: RecordTradeArgs, idempotency_key: Option<&str>) -> Result<Operation<TradeReceipt>> {
        self.execute(
            OperationKind::RecordTrade,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::record_trade,
        )
    }

    pub fn stake(&self, args: StakeArgs, idempotency_key: Option<&str>) -> Result<Operation<StakeReceipt>> {
        self.execute(
            OperationKind::Stake,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::stake,
        )
    }

    pub fn unstake(&self, args: UnstakeArgs, idempotency_key: Option<&str>) -> Result<Operation<UnstakeReceipt>> {
        self.execute(
            OperationKind::Unstake,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::unstake,
        )
    }

    pub fn claim(&self, args: PositionArgs, idempotency_key: Option<&str>) -> Result<Operation<ClaimReceipt>> {
        self.execute(
            OperationKind::Claim,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::claim,
        )
    }

    pub fn request_unstake(
        &self,
        args: UnstakeArgs,
        idempotency_key: Option<&str>,
    ) -> Result<Operation<UnstakeRequest>> {
        self.execute(
            OperationKind::RequestUnstake,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::request_unstake,
        )
    }

    pub fn cancel_unstake(&self, args: PositionArgs, idempotency_key: Option<&str>) -> Result<Operation<u64>> {
        self.execute(
            OperationKind::CancelUnstake,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::cancel_unstake,
        )
    }

    pub fn deposit_rewards(
        &self,
        args: DepositRewardsArgs,
        idempotency_key: Option<&str>,
    ) -> Result<Operation<RewardDeposit>> {
        self.execute(
            OperationKind::DepositRewards,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::deposit_rewards,
        )
    }

    pub fn execute_buyback(
        &self,
        args: ExecuteBuybackArgs,
        idempotency_key: Option<&str>,
    ) -> Result<Operation<BuybackReceipt>> {
        self.execute(
            OperationKind::ExecuteBuyback,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::execute_buyback,
        )
    }

    pub fn set_token_active(
        &self,
        args: SetTokenActiveArgs,
        idempotency_key: Option<&str>,
    ) -> Result<Operation<TokenConfig>> {
        self.execute(
            OperationKind::SetTokenActive,
            idempotency_key,
            args.token_mint,
            &args,
            instructions::set_token_active,
        )
    }

    /// Quote a swap and return it as one unsigned transaction that also pays
    /// the token's fee shares out of the output.
    ///
    /// Validation happens before any network call. The whole composition is
    /// bounded by `operation_timeout_secs`; on timeout the operation fails
    /// with a retryable error.
    pub async fn compose_swap(
        &self,
        request: ComposeSwapRequest,
        idempotency_key: Option<&str>,
    ) -> Result<Operation<ComposedSwap>> {
        let now = self.time.now();
        let record = match self.begin(
            OperationKind::ComposeSwap,
            idempotency_key,
            &request,
            request.token_mint,
            now,
        )? {
            Begin::Replay(operation) => return Ok(operation),
            Begin::Run(record) => record,
        };

        let outcome = match instructions::prepare_swap(&self.context(now), &request) {
            Ok(prepared) => {
                let compose = self
                    .composer
                    .compose(&request, prepared.slippage_bps, &prepared.terms, now);
                match tokio::time::timeout(self.config.operation_timeout(), compose).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        log::warn!(
                            "Compose for {} exceeded {}s",
                            request.token_mint,
                            self.config.operation_timeout_secs
                        );
                        err!(EarnError::OperationTimedOut)
                    }
                }
            }
            Err(e) => Err(e),
        };

        let operation = self.finish(record, outcome)?;
        self.events.emit(EarnEvent::SwapComposed(SwapComposed {
            token_mint: request.token_mint,
            user: request.user,
            quoted_output: operation.result.quoted_output,
            total_fee: operation.result.fee.total,
            fees_included: operation.result.fees_included,
            timestamp: now,
        }));
        Ok(operation)
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub fn get_operation(&self, operation_id: &str) -> Result<OperationRecord> {
        self.ledger.get(operation_id)
    }

    pub fn token_config(&self, mint: &Pubkey) -> Result<Option<TokenConfig>> {
        store::load(self.store.as_ref(), &store::token_config_key(mint))
    }

    pub fn treasury(&self, mint: &Pubkey) -> Result<Option<Treasury>> {
        store::load(self.store.as_ref(), &store::treasury_key(mint))
    }

    pub fn staking_pool(&self, mint: &Pubkey) -> Result<Option<StakingPool>> {
        store::load(self.store.as_ref(), &store::staking_pool_key(mint))
    }

    pub fn stake_account(&self, mint: &Pubkey, owner: &Pubkey) -> Result<Option<StakeAccount>> {
        store::load(self.store.as_ref(), &store::stake_key(mint, owner))
    }

    /// Rewards `owner` could claim right now; zero without a position.
    pub fn pending_rewards(&self, mint: &Pubkey, owner: &Pubkey) -> Result<u64> {
        let pool = self
            .staking_pool(mint)?
            .ok_or_else(|| error!(EarnError::TokenNotRegistered))?;
        match self.stake_account(mint, owner)? {
            Some(account) => earn_staking::pending_rewards(&pool, &account),
            None => Ok(0),
        }
    }

    /// Every open position in a token's pool.
    pub fn stake_accounts(&self, mint: &Pubkey) -> Result<Vec<StakeAccount>> {
        self.store
            .scan_prefix(&store::stake_prefix(mint))?
            .iter()
            .map(|(_, bytes)| store::decode(bytes))
            .collect()
    }

    pub fn protocol_stats(&self) -> Result<ProtocolStats> {
        Ok(store::load(self.store.as_ref(), &store::protocol_stats_key())?.unwrap_or_default())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EarnEvent> {
        self.events.subscribe()
    }

    // ── Maintenance ───────────────────────────────────────────────────

    /// Fail operations left non-terminal longer than the operation timeout.
    pub fn expire_stale_operations(&self) -> Result<usize> {
        self.ledger
            .expire_stale(self.time.now(), self.config.operation_timeout_secs)
    }

    /// Drop terminal operations older than the retention horizon.
    pub fn purge_operations(&self) -> Result<usize> {
        self.ledger
            .purge(self.time.now(), self.config.operation_retention_secs)
    }
}

fn replay<T: DeserializeOwned>(record: OperationRecord) -> Result<Operation<T>> {
    match record.status {
        OperationStatus::Completed => {
            let raw = record.result.as_deref().unwrap_or("null");
            let result = serde_json::from_str(raw).map_err(|e| {
                log::error!("Stored result of {} is unreadable: {}", record.operation_id, e);
                error!(EarnError::StorageFailure)
            })?;
            Ok(Operation {
                record,
                result,
                replayed: true,
            })
        }
        OperationStatus::Failed => match &record.error {
            Some(stored) => Err(stored.to_error()),
            None => err!(EarnError::InternalInvariantViolation),
        },
        OperationStatus::Pending | OperationStatus::Processing => err!(EarnError::OperationInProgress),
    }
}
