use anchor_lang::prelude::*;

use crate::errors::StakingError;

/// Cumulative reward per staked unit, fixed point with [`RewardIndex::SCALE`]
/// fractional units. Only ever moves forward.
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct RewardIndex(u128);

impl RewardIndex {
    /// Precision multiplier for reward calculations (1e18)
    pub const SCALE: u128 = 1_000_000_000_000_000_000;

    pub const ZERO: Self = Self(0);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Index after spreading `amount` evenly over `total_staked` units.
    ///
    /// The per-unit increase is floored, so the index never credits more than
    /// was deposited.
    pub fn accrue(self, amount: u64, total_staked: u64) -> Result<Self> {
        require!(total_staked > 0, StakingError::RewardAccountingViolation);

        let increase = (amount as u128)
            .checked_mul(Self::SCALE)
            .ok_or(StakingError::Overflow)?
            / total_staked as u128;

        let next = self.0.checked_add(increase).ok_or(StakingError::Overflow)?;
        Ok(Self(next))
    }

    /// Rewards owed to `stake` units that held since `checkpoint`.
    pub fn earned_since(self, checkpoint: Self, stake: u64) -> Result<u64> {
        let delta = self
            .0
            .checked_sub(checkpoint.0)
            .ok_or(StakingError::RewardAccountingViolation)?;

        let earned = (stake as u128)
            .checked_mul(delta)
            .ok_or(StakingError::Overflow)?
            / Self::SCALE;

        u64::try_from(earned).map_err(|_| error!(StakingError::Overflow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accrue_spreads_amount_per_unit() {
        let index = RewardIndex::ZERO.accrue(1_000, 100).unwrap();
        assert_eq!(index.raw(), 10 * RewardIndex::SCALE);
        assert_eq!(index.earned_since(RewardIndex::ZERO, 100).unwrap(), 1_000);
        assert_eq!(index.earned_since(RewardIndex::ZERO, 33).unwrap(), 330);
    }

    #[test]
    fn accrue_floors_instead_of_overcrediting() {
        let index = RewardIndex::ZERO.accrue(1, 3).unwrap();
        let per_holder = index.earned_since(RewardIndex::ZERO, 1).unwrap();
        assert_eq!(per_holder, 0);
        assert_eq!(index.earned_since(RewardIndex::ZERO, 3).unwrap(), 0);
    }

    #[test]
    fn accrue_rejects_empty_pool() {
        let err = RewardIndex::ZERO.accrue(10, 0).unwrap_err();
        assert_eq!(err, StakingError::RewardAccountingViolation.into());
    }

    #[test]
    fn checkpoint_ahead_of_index_is_a_violation() {
        let checkpoint = RewardIndex::from_raw(5);
        let err = RewardIndex::from_raw(4).earned_since(checkpoint, 1).unwrap_err();
        assert_eq!(err, StakingError::RewardAccountingViolation.into());
    }

    #[test]
    fn handles_full_u64_deposit() {
        let index = RewardIndex::ZERO.accrue(u64::MAX, 1).unwrap();
        assert_eq!(index.earned_since(RewardIndex::ZERO, 1).unwrap(), u64::MAX);
    }
}
