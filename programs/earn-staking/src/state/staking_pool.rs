use anchor_lang::prelude::*;

use super::{RewardIndex, StakeAccount};
use crate::errors::StakingError;

/// Per-token staking pool
/// Store key: ["staking_pool", mint]
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StakingPool {
    /// Token mint that can be staked in this pool
    pub token_mint: Pubkey,

    /// Total tokens currently staked
    pub total_staked: u64,

    /// Accumulated reward per staked token
    pub reward_per_token_stored: RewardIndex,

    /// Rewards folded into the index over the pool's lifetime
    pub total_rewards_distributed: u64,

    /// Rewards paid out through claim or unstake
    pub total_rewards_claimed: u64,

    /// Rewards deposited while nothing was staked, waiting for the next deposit
    pub unallocated_rewards: u64,

    /// Number of unique stakers
    pub staker_count: u32,

    /// Minimum stake amount (prevents dust attacks)
    pub min_stake_amount: u64,

    /// Cooldown period in seconds before unstaking (0 = no cooldown)
    pub cooldown_seconds: u32,

    /// Whether the pool is paused
    pub paused: bool,

    /// Pool creation timestamp
    pub created_at: i64,

    /// Last timestamp when the pool was mutated
    pub last_update_time: i64,
}

/// Outcome of feeding rewards into a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RewardDeposit {
    /// Amount passed in by the caller
    pub deposited: u64,
    /// Amount credited to stakers (includes any parked backlog merged in)
    pub allocated: u64,
    /// Amount parked because nothing was staked
    pub parked: u64,
}

impl StakingPool {
    pub fn new(token_mint: Pubkey, min_stake_amount: u64, cooldown_seconds: u32, now: i64) -> Self {
        Self {
            token_mint,
            min_stake_amount,
            cooldown_seconds,
            created_at: now,
            last_update_time: now,
            ..Self::default()
        }
    }

    /// Credit `amount` to current stakers in O(1).
    ///
    /// With nothing staked the amount is parked in `unallocated_rewards`; the
    /// backlog rides along with the first deposit that finds stakers.
    pub fn distribute(&mut self, amount: u64, now: i64) -> Result<RewardDeposit> {
        let mut deposit = RewardDeposit {
            deposited: amount,
            ..RewardDeposit::default()
        };

        if self.total_staked == 0 {
            self.unallocated_rewards = self
                .unallocated_rewards
                .checked_add(amount)
                .ok_or(StakingError::Overflow)?;
            deposit.parked = amount;
        } else {
            let allocated = amount
                .checked_add(self.unallocated_rewards)
                .ok_or(StakingError::Overflow)?;
            if allocated > 0 {
                self.reward_per_token_stored = self
                    .reward_per_token_stored
                    .accrue(allocated, self.total_staked)?;
                self.total_rewards_distributed = self
                    .total_rewards_distributed
                    .checked_add(allocated)
                    .ok_or(StakingError::Overflow)?;
            }
            self.unallocated_rewards = 0;
            deposit.allocated = allocated;
        }

        self.last_update_time = now;
        Ok(deposit)
    }

    /// Settled plus unsettled rewards for `account`, without mutating anything.
    pub fn claimable(&self, account: &StakeAccount) -> Result<u64> {
        require_keys_eq!(account.token_mint, self.token_mint, StakingError::InvalidPool);
        account.claimable(self.reward_per_token_stored)
    }

    /// Outstanding rewards plus everything already paid may never exceed what
    /// was distributed.
    pub fn check_conservation(&self, outstanding: u64) -> Result<()> {
        let owed = (outstanding as u128) + (self.total_rewards_claimed as u128);
        if owed > self.total_rewards_distributed as u128 {
            log::error!(
                "Reward conservation violated for {}: owed {} > distributed {}",
                self.token_mint,
                owed,
                self.total_rewards_distributed
            );
            return err!(StakingError::RewardAccountingViolation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> StakingPool {
        StakingPool::new(Pubkey::new_unique(), 0, 0, 0)
    }

    #[test]
    fn deposit_without_stakers_is_parked() {
        let mut pool = pool();
        let deposit = pool.distribute(500, 1).unwrap();

        assert_eq!(deposit.parked, 500);
        assert_eq!(deposit.allocated, 0);
        assert_eq!(pool.unallocated_rewards, 500);
        assert_eq!(pool.total_rewards_distributed, 0);
        assert_eq!(pool.reward_per_token_stored, RewardIndex::ZERO);
    }

    #[test]
    fn parked_rewards_merge_into_next_deposit() {
        let mut pool = pool();
        pool.distribute(500, 1).unwrap();
        pool.total_staked = 100;

        let deposit = pool.distribute(300, 2).unwrap();

        assert_eq!(deposit.allocated, 800);
        assert_eq!(pool.unallocated_rewards, 0);
        assert_eq!(pool.total_rewards_distributed, 800);
        assert_eq!(pool.reward_per_token_stored.raw(), 8 * RewardIndex::SCALE);
    }

    #[test]
    fn conservation_check_flags_overpayment() {
        let mut pool = pool();
        pool.total_staked = 10;
        pool.distribute(100, 1).unwrap();
        pool.total_rewards_claimed = 40;

        assert!(pool.check_conservation(60).is_ok());
        assert_eq!(
            pool.check_conservation(61).unwrap_err(),
            StakingError::RewardAccountingViolation.into()
        );
    }
}
