use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::EarnError;
use crate::math::BPS_DENOMINATOR;

/// Seeds for TokenConfig records
pub const TOKEN_CONFIG_SEED: &[u8] = b"config";

/// How a token's fee is divided, in basis points of the fee.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplits {
    /// Earn Protocol's cut of fees (1000 = 10%)
    pub earn_cut_bps: u16,

    /// Creator's cut of fees (2000 = 20%)
    pub creator_cut_bps: u16,

    /// Buyback allocation (3500 = 35%)
    pub buyback_cut_bps: u16,

    /// Staking rewards allocation (3500 = 35%)
    pub staking_cut_bps: u16,
}

impl Default for FeeSplits {
    fn default() -> Self {
        Self {
            earn_cut_bps: 1000,
            creator_cut_bps: 2000,
            buyback_cut_bps: 3500,
            staking_cut_bps: 3500,
        }
    }
}

impl FeeSplits {
    /// Weights in bucket order: earn, creator, buyback, staking.
    pub fn weights(&self) -> [u16; 4] {
        [
            self.earn_cut_bps,
            self.creator_cut_bps,
            self.buyback_cut_bps,
            self.staking_cut_bps,
        ]
    }

    /// Validate that cuts sum to 100% and the earn floor is met
    pub fn validate(&self, min_earn_cut_bps: u16) -> Result<()> {
        let sum: u64 = self.weights().iter().map(|w| *w as u64).sum();
        require!(sum == BPS_DENOMINATOR, EarnError::InvalidFeeSplits);
        require!(
            self.earn_cut_bps >= min_earn_cut_bps,
            EarnError::EarnCutBelowFloor
        );
        Ok(())
    }
}

/// Owners of the token accounts that receive the buyback and staking shares.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDestinations {
    pub buyback: Option<Pubkey>,
    pub staking: Option<Pubkey>,
}

impl FeeDestinations {
    /// The program's treasury and staking pool PDAs for `token_mint`.
    pub fn program_derived(program_id: &Pubkey, token_mint: &Pubkey) -> Self {
        let (treasury, _) = Pubkey::find_program_address(
            &[super::TREASURY_SEED, token_mint.as_ref()],
            program_id,
        );
        let (staking_pool, _) = Pubkey::find_program_address(
            &[super::STAKING_POOL_SEED, token_mint.as_ref()],
            program_id,
        );
        Self {
            buyback: Some(treasury),
            staking: Some(staking_pool),
        }
    }

    /// Fill any missing destination from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            buyback: self.buyback.or(fallback.buyback),
            staking: self.staking.or(fallback.staking),
        }
    }
}

/// Configuration for a token registered with Earn Protocol
/// Store key: ["config", token_mint]
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// The SPL token mint address
    pub token_mint: Pubkey,

    /// Creator wallet that receives creator cut. Immutable after registration.
    pub creator: Pubkey,

    /// Fee charged on trades in basis points (200 = 2%)
    pub fee_basis_points: u16,

    pub splits: FeeSplits,

    pub destinations: FeeDestinations,

    /// Whether the token is actively collecting fees
    pub is_active: bool,

    /// Unix timestamp when registered
    pub created_at: i64,
}

impl TokenConfig {
    /// Owner for each fee bucket (earn, creator, buyback, staking), in order.
    pub fn bucket_owners(&self, protocol_wallet: Option<Pubkey>) -> [Option<Pubkey>; 4] {
        [
            protocol_wallet,
            Some(self.creator),
            self.destinations.buyback,
            self.destinations.staking,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_splits_are_valid() {
        FeeSplits::default().validate(1000).unwrap();
    }

    #[test]
    fn splits_must_sum_and_meet_floor() {
        let short = FeeSplits {
            staking_cut_bps: 3499,
            ..FeeSplits::default()
        };
        assert_eq!(short.validate(1000).unwrap_err(), EarnError::InvalidFeeSplits.into());

        let low_earn = FeeSplits {
            earn_cut_bps: 500,
            creator_cut_bps: 2500,
            ..FeeSplits::default()
        };
        assert_eq!(low_earn.validate(1000).unwrap_err(), EarnError::EarnCutBelowFloor.into());
    }

    #[test]
    fn program_derived_destinations_are_deterministic() {
        let program_id = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let first = FeeDestinations::program_derived(&program_id, &mint);
        let second = FeeDestinations::program_derived(&program_id, &mint);

        assert_eq!(first, second);
        assert_ne!(first.buyback, first.staking);

        let explicit = Pubkey::new_unique();
        let merged = FeeDestinations {
            buyback: Some(explicit),
            staking: None,
        }
        .or(first);
        assert_eq!(merged.buyback, Some(explicit));
        assert_eq!(merged.staking, first.staking);
    }
}
