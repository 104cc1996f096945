use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::EarnError;

/// 100% in basis points
pub const BPS_DENOMINATOR: u64 = 10_000;

/// `floor(amount * bps / 10000)` with a u128 intermediate.
pub fn apply_bps(amount: u64, bps: u16) -> Result<u64> {
    let scaled = (amount as u128) * (bps as u128) / (BPS_DENOMINATOR as u128);
    u64::try_from(scaled).map_err(|_| error!(EarnError::Overflow))
}

/// Split `total` by `weights` (summing to 10000) into shares that add up to
/// exactly `total`. Every share but the last is floored; the last takes the
/// remainder.
pub fn split(total: u64, weights: &[u16]) -> Result<Vec<u64>> {
    let weight_sum: u64 = weights.iter().map(|w| *w as u64).sum();
    require!(
        !weights.is_empty() && weight_sum == BPS_DENOMINATOR,
        EarnError::InvalidFeeSplits
    );

    let mut shares = Vec::with_capacity(weights.len());
    let mut allocated: u64 = 0;
    for weight in &weights[..weights.len() - 1] {
        let share = apply_bps(total, *weight)?;
        allocated = allocated.checked_add(share).ok_or(EarnError::Overflow)?;
        shares.push(share);
    }

    // Remainder to last bucket
    let last = total
        .checked_sub(allocated)
        .ok_or(EarnError::InternalInvariantViolation)?;
    shares.push(last);

    Ok(shares)
}

/// A fee broken into its four destinations. Never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDistribution {
    pub total: u64,
    pub earn: u64,
    pub creator: u64,
    pub buyback: u64,
    pub staking: u64,
}

impl FeeDistribution {
    /// Split `total` using weights ordered earn, creator, buyback, staking.
    pub fn compute(total: u64, weights: [u16; 4]) -> Result<Self> {
        let shares = split(total, &weights)?;
        let distribution = Self {
            total,
            earn: shares[0],
            creator: shares[1],
            buyback: shares[2],
            staking: shares[3],
        };
        distribution.verify()?;
        Ok(distribution)
    }

    pub fn verify(&self) -> Result<()> {
        let sum = self.earn as u128 + self.creator as u128 + self.buyback as u128 + self.staking as u128;
        if sum != self.total as u128 {
            log::error!(
                "Fee shares {} do not sum to total fee {}",
                sum,
                self.total
            );
            return err!(EarnError::InternalInvariantViolation);
        }
        Ok(())
    }

    /// Shares in bucket order: earn, creator, buyback, staking.
    pub fn buckets(&self) -> [u64; 4] {
        [self.earn, self.creator, self.buyback, self.staking]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scenario_split_is_exact() {
        let fee = apply_bps(1_000_000_000, 300).unwrap();
        assert_eq!(fee, 30_000_000);

        let dist = FeeDistribution::compute(fee, [1000, 1000, 5000, 3000]).unwrap();
        assert_eq!(dist.buckets(), [3_000_000, 3_000_000, 15_000_000, 9_000_000]);
    }

    #[test]
    fn last_bucket_absorbs_remainder() {
        assert_eq!(split(10, &[3333, 3333, 3334]).unwrap(), vec![3, 3, 4]);
        assert_eq!(split(1, &[5000, 5000]).unwrap(), vec![0, 1]);
        assert_eq!(split(0, &[1000, 2000, 3500, 3500]).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn rejects_weights_not_summing_to_full() {
        assert_eq!(
            split(100, &[5000, 4999]).unwrap_err(),
            EarnError::InvalidFeeSplits.into()
        );
        assert_eq!(split(100, &[]).unwrap_err(), EarnError::InvalidFeeSplits.into());
    }

    #[test]
    fn max_amount_does_not_overflow() {
        assert_eq!(apply_bps(u64::MAX, 10_000).unwrap(), u64::MAX);
        let shares = split(u64::MAX, &[2500, 2500, 2500, 2500]).unwrap();
        assert_eq!(shares.iter().map(|s| *s as u128).sum::<u128>(), u64::MAX as u128);
    }

    #[test]
    fn verify_flags_broken_distribution() {
        let broken = FeeDistribution {
            total: 10,
            earn: 1,
            creator: 1,
            buyback: 1,
            staking: 1,
        };
        assert_eq!(
            broken.verify().unwrap_err(),
            EarnError::InternalInvariantViolation.into()
        );
    }

    fn weights() -> impl Strategy<Value = Vec<u16>> {
        // Random cut points over [0, 10000] give weights summing to exactly 10000.
        prop::collection::vec(0u16..=10_000, 0..6).prop_map(|mut cuts| {
            cuts.push(0);
            cuts.push(10_000);
            cuts.sort_unstable();
            cuts.windows(2).map(|w| w[1] - w[0]).collect()
        })
    }

    proptest! {
        #[test]
        fn split_partitions_total_exactly(total in any::<u64>(), weights in weights()) {
            let shares = split(total, &weights).unwrap();
            prop_assert_eq!(shares.len(), weights.len());
            prop_assert_eq!(shares.iter().map(|s| *s as u128).sum::<u128>(), total as u128);

            for (share, weight) in shares.iter().zip(&weights).take(weights.len() - 1) {
                prop_assert_eq!(*share, apply_bps(total, *weight).unwrap());
            }
        }
    }
}
