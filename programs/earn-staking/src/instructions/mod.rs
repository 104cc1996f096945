pub mod cancel_unstake;
pub mod claim;
pub mod create_pool;
pub mod deposit_rewards;
pub mod request_unstake;
pub mod stake;
pub mod unstake;

pub use claim::ClaimReceipt;
pub use stake::StakeReceipt;
pub use unstake::UnstakeReceipt;
