pub mod admin;
pub mod buyback;
pub mod claim;
pub mod compose_swap;
pub mod deposit_rewards;
pub mod record_trade;
pub mod register;
pub mod stake;
pub mod unstake;

pub use admin::*;
pub use buyback::*;
pub use claim::*;
pub use compose_swap::*;
pub use deposit_rewards::*;
pub use record_trade::*;
pub use register::*;
pub use stake::*;
pub use unstake::*;

use anchor_lang::prelude::*;

use crate::config::EngineConfig;
use crate::errors::EarnError;
use crate::events::EventLog;
use crate::state::{ProtocolStats, StakeAccount, StakingPool, TokenConfig, Treasury};
use crate::store::{self, BatchOp, KeyValueStore};

/// Everything a handler may touch. Handlers for one token run under that
/// token's lock, so reads and the final batch write see no interleaving.
pub struct EngineContext<'a> {
    pub config: &'a EngineConfig,
    pub store: &'a dyn KeyValueStore,
    pub events: &'a EventLog,
    pub now: i64,
}

impl EngineContext<'_> {
    pub fn token_config(&self, mint: &Pubkey) -> Result<TokenConfig> {
        store::load(self.store, &store::token_config_key(mint))?
            .ok_or_else(|| error!(EarnError::TokenNotRegistered))
    }

    /// Registered and collecting fees.
    pub fn active_token_config(&self, mint: &Pubkey) -> Result<TokenConfig> {
        let config = self.token_config(mint)?;
        require!(config.is_active, EarnError::TokenNotActive);
        Ok(config)
    }

    pub fn treasury(&self, mint: &Pubkey) -> Result<Treasury> {
        store::load(self.store, &store::treasury_key(mint))?
            .ok_or_else(|| error!(EarnError::TokenNotRegistered))
    }

    pub fn staking_pool(&self, mint: &Pubkey) -> Result<StakingPool> {
        store::load(self.store, &store::staking_pool_key(mint))?
            .ok_or_else(|| error!(EarnError::TokenNotRegistered))
    }

    pub fn stake_account(&self, mint: &Pubkey, owner: &Pubkey) -> Result<Option<StakeAccount>> {
        store::load(self.store, &store::stake_key(mint, owner))
    }

    /// Write `ops` and the stats update `f` as one batch, so a failure
    /// leaves neither behind.
    pub fn commit_with_stats(
        &self,
        ops: Vec<BatchOp>,
        mut f: impl FnMut(&mut ProtocolStats) -> Result<()>,
    ) -> Result<ProtocolStats> {
        store::commit_with_update(
            self.store,
            ops,
            &store::protocol_stats_key(),
            |current: Option<ProtocolStats>| {
                let mut stats = current.unwrap_or_default();
                f(&mut stats)?;
                Ok(stats)
            },
        )
    }
}
