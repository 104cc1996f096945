use std::str::FromStr;
use std::time::Duration;

use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::EarnError;
use crate::state::FeeSplits;

/// Jupiter Metis v1 (requires API key)
pub const JUPITER_API: &str = "https://api.jup.ag/swap/v1";
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Engine settings. Every field has a default so a partial TOML file is enough.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Owner of the protocol (earn) fee destination
    #[serde(with = "pubkey_opt")]
    pub protocol_wallet: Option<Pubkey>,

    /// Program whose PDAs hold buyback and staking fees when a token gives none
    #[serde(with = "pubkey_opt")]
    pub program_id: Option<Pubkey>,

    pub min_fee_bps: u16,
    pub max_fee_bps: u16,
    pub min_earn_cut_bps: u16,
    pub default_splits: FeeSplits,

    pub default_slippage_bps: u16,
    pub max_slippage_bps: u16,

    pub upstream_timeout_ms: u64,
    pub operation_timeout_secs: u64,
    pub blockhash_validity_secs: u64,
    pub operation_retention_secs: u64,

    /// Minimum treasury balance before a buyback may run
    pub buyback_threshold: u64,
    pub buyback_cooldown_secs: u64,

    pub jupiter_api_url: String,
    pub jupiter_api_key: Option<String>,
    pub rpc_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol_wallet: None,
            program_id: None,
            min_fee_bps: 10,
            max_fee_bps: 1000,
            min_earn_cut_bps: 1000,
            default_splits: FeeSplits::default(),
            default_slippage_bps: 50,
            max_slippage_bps: 5000,
            upstream_timeout_ms: 15_000,
            operation_timeout_secs: 60,
            blockhash_validity_secs: 45,
            operation_retention_secs: 86_400,
            buyback_threshold: 100_000_000,
            buyback_cooldown_secs: 3600,
            jupiter_api_url: JUPITER_API.to_string(),
            jupiter_api_key: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| {
            log::error!("Invalid engine config: {}", e);
            error!(EarnError::InvalidConfig)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SOLANA_RPC_URL`, `JUPITER_API_URL`, `JUPITER_API_KEY` and
    /// `EARN_PROTOCOL_WALLET` from the environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    pub(crate) fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = var("SOLANA_RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(url) = var("JUPITER_API_URL") {
            self.jupiter_api_url = url;
        }
        if let Some(key) = var("JUPITER_API_KEY") {
            self.jupiter_api_key = Some(key);
        }
        if let Some(wallet) = var("EARN_PROTOCOL_WALLET") {
            let wallet = Pubkey::from_str(wallet.trim()).map_err(|_| {
                log::error!("EARN_PROTOCOL_WALLET is not a valid pubkey");
                error!(EarnError::InvalidConfig)
            })?;
            self.protocol_wallet = Some(wallet);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        require!(
            self.min_fee_bps <= self.max_fee_bps && self.max_fee_bps as u64 <= crate::math::BPS_DENOMINATOR,
            EarnError::InvalidConfig
        );
        require!(
            self.default_slippage_bps <= self.max_slippage_bps
                && self.max_slippage_bps as u64 <= crate::math::BPS_DENOMINATOR,
            EarnError::InvalidConfig
        );
        self.default_splits
            .validate(self.min_earn_cut_bps)
            .map_err(|_| error!(EarnError::InvalidConfig))?;
        require!(self.upstream_timeout_ms > 0, EarnError::InvalidConfig);
        // A composed transaction must expire before the operation that built it does.
        require!(
            self.blockhash_validity_secs < self.operation_timeout_secs,
            EarnError::InvalidConfig
        );
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Base58 strings in config files instead of raw byte arrays.
mod pubkey_opt {
    use std::str::FromStr;

    use anchor_lang::prelude::Pubkey;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Pubkey>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(key) => serializer.serialize_some(&key.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Pubkey>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| Pubkey::from_str(s.trim()).map_err(de::Error::custom))
            .transpose()
    }
}
