use anchor_lang::prelude::*;

#[error_code(offset = 6100)]
pub enum StakingError {
    #[msg("Stake amount is below minimum")]
    StakeBelowMinimum,

    #[msg("Insufficient staked balance")]
    InsufficientStake,

    #[msg("Cooldown period has not passed")]
    CooldownNotPassed,

    #[msg("No rewards to claim")]
    NoRewardsToClaim,

    #[msg("Pool is paused")]
    PoolPaused,

    #[msg("Invalid pool for this token")]
    InvalidPool,

    #[msg("Arithmetic overflow")]
    Overflow,

    #[msg("Must request unstake before cooldown")]
    MustRequestUnstake,

    #[msg("Already requested unstake")]
    AlreadyRequestedUnstake,

    #[msg("No unstake request pending")]
    NoUnstakeRequest,

    #[msg("Invalid amount")]
    InvalidAmount,

    #[msg("Reward accounting invariant violated")]
    RewardAccountingViolation,
}
