use anchor_lang::prelude::*;

use super::RewardIndex;
use crate::errors::StakingError;

/// Individual user's stake in a pool
/// Store key: ["stake", mint, owner]
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StakeAccount {
    /// Owner of this stake account
    pub owner: Pubkey,

    /// Token mint of the pool this stake belongs to
    pub token_mint: Pubkey,

    /// Amount of tokens staked
    pub staked_amount: u64,

    /// Snapshot of the pool index at last settlement
    pub reward_per_token_paid: RewardIndex,

    /// Rewards settled but not yet claimed
    pub pending_rewards: u64,

    /// Timestamp when tokens were first staked
    pub staked_at: i64,

    /// Timestamp of last payout
    pub last_claim_at: i64,

    /// Timestamp when unstake was requested (for cooldown)
    pub unstake_requested_at: i64,

    /// Amount requested to unstake (during cooldown)
    pub unstake_amount: u64,
}

impl StakeAccount {
    pub fn new(owner: Pubkey, token_mint: Pubkey, index: RewardIndex, now: i64) -> Self {
        Self {
            owner,
            token_mint,
            reward_per_token_paid: index,
            staked_at: now,
            ..Self::default()
        }
    }

    /// Rewards earned since the last settlement.
    pub fn earned(&self, index: RewardIndex) -> Result<u64> {
        index.earned_since(self.reward_per_token_paid, self.staked_amount)
    }

    /// Settled plus unsettled rewards at `index`.
    pub fn claimable(&self, index: RewardIndex) -> Result<u64> {
        let earned = self.earned(index)?;
        self.pending_rewards
            .checked_add(earned)
            .ok_or_else(|| error!(StakingError::Overflow))
    }

    /// Move earned rewards into `pending_rewards` and checkpoint at `index`.
    /// Returns the amount newly settled.
    pub fn settle(&mut self, index: RewardIndex) -> Result<u64> {
        let earned = self.earned(index)?;
        self.pending_rewards = self
            .pending_rewards
            .checked_add(earned)
            .ok_or(StakingError::Overflow)?;
        self.reward_per_token_paid = index;
        Ok(earned)
    }

    /// Pay out everything settled so far.
    pub fn take_pending(&mut self, now: i64) -> u64 {
        let paid = std::mem::take(&mut self.pending_rewards);
        if paid > 0 {
            self.last_claim_at = now;
        }
        paid
    }

    pub fn has_unstake_request(&self) -> bool {
        self.unstake_requested_at != 0
    }

    /// Check if cooldown period has passed
    pub fn can_unstake(&self, cooldown_seconds: u32, current_time: i64) -> bool {
        if cooldown_seconds == 0 {
            return true;
        }

        if !self.has_unstake_request() {
            return false;
        }

        current_time >= self.unstake_requested_at + (cooldown_seconds as i64)
    }

    pub fn clear_unstake_request(&mut self) {
        self.unstake_requested_at = 0;
        self.unstake_amount = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_moves_earned_into_pending() {
        let mut account = StakeAccount::new(Pubkey::new_unique(), Pubkey::new_unique(), RewardIndex::ZERO, 0);
        account.staked_amount = 50;

        let index = RewardIndex::ZERO.accrue(100, 100).unwrap();
        assert_eq!(account.claimable(index).unwrap(), 50);

        assert_eq!(account.settle(index).unwrap(), 50);
        assert_eq!(account.pending_rewards, 50);
        assert_eq!(account.reward_per_token_paid, index);
        assert_eq!(account.claimable(index).unwrap(), 50);
    }

    #[test]
    fn cooldown_requires_request_then_time() {
        let mut account = StakeAccount::default();
        assert!(account.can_unstake(0, 10));
        assert!(!account.can_unstake(60, 10));

        account.unstake_requested_at = 100;
        assert!(!account.can_unstake(60, 159));
        assert!(account.can_unstake(60, 160));
    }
}
