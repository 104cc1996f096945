use anchor_lang::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::StoredError;

pub const OPERATION_SEED: &[u8] = b"op";
pub const IDEMPOTENCY_SEED: &[u8] = b"idem";

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Register,
    RecordTrade,
    Stake,
    Unstake,
    Claim,
    RequestUnstake,
    CancelUnstake,
    DepositRewards,
    ExecuteBuyback,
    SetTokenActive,
    ComposeSwap,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::RecordTrade => "record_trade",
            Self::Stake => "stake",
            Self::Unstake => "unstake",
            Self::Claim => "claim",
            Self::RequestUnstake => "request_unstake",
            Self::CancelUnstake => "cancel_unstake",
            Self::DepositRewards => "deposit_rewards",
            Self::ExecuteBuyback => "execute_buyback",
            Self::SetTokenActive => "set_token_active",
            Self::ComposeSwap => "compose_swap",
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// pending -> processing -> {completed | failed}; pending may also fail
    /// directly (timeout before work started).
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

/// One mutating call, tracked from submission to outcome.
/// Store key: ["op", operation_id]
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: String,
    pub idempotency_key: Option<String>,
    pub kind: OperationKind,
    pub status: OperationStatus,

    /// blake3 over kind and the JSON request
    #[serde(skip)]
    pub payload_hash: [u8; 32],

    /// JSON snapshot of the request
    pub request: String,

    /// JSON result, set once completed
    pub result: Option<String>,

    pub error: Option<StoredError>,
    pub tx_signature: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OperationRecord {
    pub fn retryable(&self) -> bool {
        self.error.as_ref().map_or(false, |e| e.retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        use OperationStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));

        for terminal in [Completed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Processing, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
