use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Emitted when a new token is registered with Earn Protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistered {
    pub token_mint: Pubkey,
    pub creator: Pubkey,
    pub fee_basis_points: u16,
    pub earn_cut_bps: u16,
    pub creator_cut_bps: u16,
    pub buyback_cut_bps: u16,
    pub staking_cut_bps: u16,
    pub timestamp: i64,
}

/// Emitted when fees are collected and distributed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCollected {
    pub token_mint: Pubkey,
    pub trade_amount: u64,
    pub total_fee: u64,
    pub earn_amount: u64,
    pub creator_amount: u64,
    pub buyback_amount: u64,
    pub staking_amount: u64,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsDeposited {
    pub token_mint: Pubkey,
    pub amount: u64,
    pub allocated: u64,
    pub parked: u64,
    pub timestamp: i64,
}

/// Emitted when a user stakes tokens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staked {
    pub user: Pubkey,
    pub token_mint: Pubkey,
    pub amount: u64,
    pub new_total_staked: u64,
    pub pool_total_staked: u64,
    pub timestamp: i64,
}

/// Emitted when a user unstakes tokens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unstaked {
    pub user: Pubkey,
    pub token_mint: Pubkey,
    pub amount: u64,
    pub rewards_claimed: u64,
    pub remaining_stake: u64,
    pub timestamp: i64,
}

/// Emitted when rewards are claimed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsClaimed {
    pub user: Pubkey,
    pub token_mint: Pubkey,
    pub amount: u64,
    pub timestamp: i64,
}

/// Emitted when a buyback is executed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuybackExecuted {
    pub token_mint: Pubkey,
    pub amount_spent: u64,
    pub tokens_burned: u64,
    pub treasury_balance_after: u64,
    pub timestamp: i64,
}

/// Emitted when token config is updated
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdated {
    pub token_mint: Pubkey,
    pub updater: Pubkey,
    pub field: String,
    pub old_value: u64,
    pub new_value: u64,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapComposed {
    pub token_mint: Pubkey,
    pub user: Pubkey,
    pub quoted_output: u64,
    pub total_fee: u64,
    pub fees_included: bool,
    pub timestamp: i64,
}

/// Emitted on any suspicious activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub alert_type: String,
    pub token_mint: Option<Pubkey>,
    pub details: String,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EarnEvent {
    TokenRegistered(TokenRegistered),
    FeeCollected(FeeCollected),
    RewardsDeposited(RewardsDeposited),
    Staked(Staked),
    Unstaked(Unstaked),
    RewardsClaimed(RewardsClaimed),
    BuybackExecuted(BuybackExecuted),
    ConfigUpdated(ConfigUpdated),
    SwapComposed(SwapComposed),
    SecurityAlert(SecurityAlert),
}

const EVENT_CAPACITY: usize = 1024;

/// Fan-out of committed state changes. Sending never blocks; slow
/// subscribers lag and skip.
pub struct EventLog {
    sender: broadcast::Sender<EarnEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }
}

impl EventLog {
    pub fn subscribe(&self) -> broadcast::Receiver<EarnEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EarnEvent) {
        match &event {
            EarnEvent::SecurityAlert(alert) => {
                log::warn!("Security alert [{}]: {}", alert.alert_type, alert.details)
            }
            other => log::debug!("event: {:?}", other),
        }
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn security_alert(&self, alert_type: &str, token_mint: Option<Pubkey>, details: String, timestamp: i64) {
        self.emit(EarnEvent::SecurityAlert(SecurityAlert {
            alert_type: alert_type.to_string(),
            token_mint,
            details,
            timestamp,
        }));
    }
}
