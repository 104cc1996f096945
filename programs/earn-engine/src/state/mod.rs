pub mod operation;
pub mod token_config;
pub mod treasury;

pub use operation::*;
pub use token_config::*;
pub use treasury::*;

pub use earn_staking::state::{RewardDeposit, RewardIndex, StakeAccount, StakingPool};

/// Seeds for staking records
pub const STAKING_POOL_SEED: &[u8] = b"staking_pool";
pub const STAKE_SEED: &[u8] = b"stake";
