pub mod reward_index;
pub mod staking_pool;
pub mod stake_account;

pub use reward_index::*;
pub use staking_pool::*;
pub use stake_account::*;
