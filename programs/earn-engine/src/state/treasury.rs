use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::EarnError;
use crate::math::FeeDistribution;

/// Seeds
pub const TREASURY_SEED: &[u8] = b"treasury";
pub const EARN_MASTER_SEED: &[u8] = b"earn_master";

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// Per-token fee ledger
/// Store key: ["treasury", token_mint]
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    /// The token this treasury belongs to
    pub token_mint: Pubkey,

    /// Total fees collected lifetime (in token's smallest unit)
    pub total_fees_collected: u64,

    /// Total fees owed to Earn Protocol
    pub earn_earnings: u64,

    /// Total fees owed to the creator
    pub creator_earnings: u64,

    /// Current balance available for buybacks
    pub buyback_balance: u64,

    /// Lifetime buyback deposits
    pub total_buyback_deposits: u64,

    /// Total amount used for buybacks lifetime
    pub total_buybacks_executed: u64,

    /// Total tokens burned from buybacks
    pub total_burned: u64,

    /// Unix timestamp of last buyback execution
    pub last_buyback: i64,

    /// Minimum balance threshold to trigger buyback
    pub buyback_threshold: u64,

    pub buy_volume: u64,
    pub sell_volume: u64,
    pub trade_count: u64,
}

impl Treasury {
    pub fn new(token_mint: Pubkey, buyback_threshold: u64) -> Self {
        Self {
            token_mint,
            buyback_threshold,
            ..Self::default()
        }
    }

    /// Credit one trade's fee. The staking share is handled by the pool.
    pub fn record_fee(
        &mut self,
        trade_amount: u64,
        direction: TradeDirection,
        fee: &FeeDistribution,
    ) -> Result<()> {
        self.total_fees_collected = self
            .total_fees_collected
            .checked_add(fee.total)
            .ok_or(EarnError::Overflow)?;
        self.earn_earnings = self
            .earn_earnings
            .checked_add(fee.earn)
            .ok_or(EarnError::Overflow)?;
        self.creator_earnings = self
            .creator_earnings
            .checked_add(fee.creator)
            .ok_or(EarnError::Overflow)?;
        self.buyback_balance = self
            .buyback_balance
            .checked_add(fee.buyback)
            .ok_or(EarnError::Overflow)?;
        self.total_buyback_deposits = self
            .total_buyback_deposits
            .checked_add(fee.buyback)
            .ok_or(EarnError::Overflow)?;

        let volume = match direction {
            TradeDirection::Buy => &mut self.buy_volume,
            TradeDirection::Sell => &mut self.sell_volume,
        };
        *volume = volume.checked_add(trade_amount).ok_or(EarnError::Overflow)?;
        self.trade_count = self.trade_count.checked_add(1).ok_or(EarnError::Overflow)?;

        self.check_buyback_balance()
    }

    /// Spend `amount` of the buyback balance.
    pub fn spend_buyback(&mut self, amount: u64, tokens_burned: u64, now: i64) -> Result<()> {
        self.buyback_balance = self
            .buyback_balance
            .checked_sub(amount)
            .ok_or(EarnError::InsufficientBalance)?;
        self.total_buybacks_executed = self
            .total_buybacks_executed
            .checked_add(amount)
            .ok_or(EarnError::Overflow)?;
        self.total_burned = self
            .total_burned
            .checked_add(tokens_burned)
            .ok_or(EarnError::Overflow)?;
        self.last_buyback = now;

        self.check_buyback_balance()
    }

    /// buyback_balance = deposits - executed
    pub fn check_buyback_balance(&self) -> Result<()> {
        let expected = self
            .total_buyback_deposits
            .checked_sub(self.total_buybacks_executed);
        if expected != Some(self.buyback_balance) {
            log::error!(
                "Buyback balance drift for {}: balance {}, deposits {}, executed {}",
                self.token_mint,
                self.buyback_balance,
                self.total_buyback_deposits,
                self.total_buybacks_executed
            );
            return err!(EarnError::InternalInvariantViolation);
        }
        Ok(())
    }
}

/// Earn Protocol master ledger
/// Store key: ["earn_master"]
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    /// Total number of tokens registered
    pub total_tokens_registered: u32,

    /// Total fees collected across all tokens
    pub total_fees_processed: u64,

    /// Protocol share of those fees
    pub total_earn_collected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fee(total: u64) -> FeeDistribution {
        FeeDistribution::compute(total, [1000, 2000, 3500, 3500]).unwrap()
    }

    #[test]
    fn record_fee_tracks_volume_and_buckets() {
        let mut treasury = Treasury::new(Pubkey::new_unique(), 100);
        treasury.record_fee(10_000, TradeDirection::Buy, &fee(1_000)).unwrap();
        treasury.record_fee(5_000, TradeDirection::Sell, &fee(500)).unwrap();

        assert_eq!(treasury.total_fees_collected, 1_500);
        assert_eq!(treasury.earn_earnings, 150);
        assert_eq!(treasury.creator_earnings, 300);
        assert_eq!(treasury.buyback_balance, 525);
        assert_eq!(treasury.buy_volume, 10_000);
        assert_eq!(treasury.sell_volume, 5_000);
        assert_eq!(treasury.trade_count, 2);
    }

    #[test]
    fn spend_keeps_balance_equation() {
        let mut treasury = Treasury::new(Pubkey::new_unique(), 0);
        treasury.record_fee(0, TradeDirection::Buy, &fee(1_000)).unwrap();

        treasury.spend_buyback(200, 42, 9).unwrap();
        assert_eq!(treasury.buyback_balance, 150);
        assert_eq!(treasury.total_buybacks_executed, 200);
        assert_eq!(treasury.total_burned, 42);
        assert_eq!(treasury.last_buyback, 9);

        assert_eq!(
            treasury.spend_buyback(151, 0, 10).unwrap_err(),
            EarnError::InsufficientBalance.into()
        );
    }

    #[test]
    fn drift_is_reported() {
        let mut treasury = Treasury::new(Pubkey::new_unique(), 0);
        treasury.buyback_balance = 1;
        assert_eq!(
            treasury.check_buyback_balance().unwrap_err(),
            EarnError::InternalInvariantViolation.into()
        );
    }
}
