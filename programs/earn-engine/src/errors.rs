use anchor_lang::error::{AnchorError, Error};
use anchor_lang::prelude::*;
use earn_staking::StakingError;
use serde::{Deserialize, Serialize};

#[error_code]
pub enum EarnError {
    #[msg("Invalid amount")]
    InvalidAmount,

    #[msg("Fee basis points outside the allowed range")]
    FeeOutOfBounds,

    #[msg("Fee splits must sum to 10000 basis points (100%)")]
    InvalidFeeSplits,

    #[msg("Earn cut is below the protocol floor")]
    EarnCutBelowFloor,

    #[msg("Slippage exceeds the allowed maximum")]
    SlippageTooHigh,

    #[msg("Fee destination cannot be the creator")]
    InvalidDestination,

    #[msg("Stake amount is below minimum")]
    StakeBelowMinimum,

    #[msg("Invalid engine configuration")]
    InvalidConfig,

    #[msg("Token is not registered")]
    TokenNotRegistered,

    #[msg("Token is already registered")]
    TokenAlreadyRegistered,

    #[msg("Token is not active")]
    TokenNotActive,

    #[msg("Unauthorized")]
    Unauthorized,

    #[msg("Fee destination account is not provisioned")]
    DestinationNotProvisioned,

    #[msg("Registered token is neither leg of the swap")]
    InvalidTokenPair,

    #[msg("Idempotency key reused with a different payload")]
    IdempotencyKeyConflict,

    #[msg("Illegal operation status transition")]
    InvalidStatusTransition,

    #[msg("Operation not found")]
    OperationNotFound,

    #[msg("Treasury balance below buyback threshold")]
    BelowBuybackThreshold,

    #[msg("Buyback cooldown has not elapsed")]
    BuybackCooldown,

    #[msg("Insufficient balance for operation")]
    InsufficientBalance,

    #[msg("No swap route with enough liquidity")]
    InsufficientLiquidity,

    #[msg("Quoted output is below the requested minimum")]
    SlippageExceeded,

    #[msg("Upstream service unavailable")]
    UpstreamUnavailable,

    #[msg("Upstream service timed out")]
    UpstreamTimeout,

    #[msg("Malformed upstream response")]
    MalformedUpstreamResponse,

    #[msg("Address lookup table could not be resolved")]
    LookupTableUnavailable,

    #[msg("Operation with this idempotency key is still in progress")]
    OperationInProgress,

    #[msg("Operation timed out")]
    OperationTimedOut,

    #[msg("Storage backend failure")]
    StorageFailure,

    #[msg("Internal invariant violated")]
    InternalInvariantViolation,

    #[msg("Arithmetic overflow")]
    Overflow,
}

/// How a caller should react to an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Bad shape or bounds. Never retried.
    Validation,
    /// Final for this request.
    Terminal,
    /// Final, but the caller may retry with adjusted input.
    Adjustable,
    /// Transient; the same request may succeed later.
    Retryable,
    /// A broken accounting invariant. Must never happen.
    Invariant,
}

pub fn error_code(err: &Error) -> Option<u32> {
    match err {
        Error::AnchorError(e) => Some(e.error_code_number),
        Error::ProgramError(_) => None,
    }
}

pub fn classify(err: &Error) -> ErrorClass {
    let Some(code) = error_code(err) else {
        return ErrorClass::Invariant;
    };

    let validation = [
        u32::from(EarnError::InvalidAmount),
        u32::from(EarnError::FeeOutOfBounds),
        u32::from(EarnError::InvalidFeeSplits),
        u32::from(EarnError::EarnCutBelowFloor),
        u32::from(EarnError::SlippageTooHigh),
        u32::from(EarnError::InvalidDestination),
        u32::from(EarnError::StakeBelowMinimum),
        u32::from(EarnError::InvalidConfig),
        u32::from(StakingError::InvalidAmount),
        u32::from(StakingError::StakeBelowMinimum),
    ];
    let adjustable = [
        u32::from(EarnError::InsufficientLiquidity),
        u32::from(EarnError::SlippageExceeded),
        u32::from(StakingError::InsufficientStake),
    ];
    let retryable = [
        u32::from(EarnError::UpstreamUnavailable),
        u32::from(EarnError::UpstreamTimeout),
        u32::from(EarnError::MalformedUpstreamResponse),
        u32::from(EarnError::LookupTableUnavailable),
        u32::from(EarnError::OperationInProgress),
        u32::from(EarnError::OperationTimedOut),
        u32::from(EarnError::StorageFailure),
    ];
    let invariant = [
        u32::from(EarnError::InternalInvariantViolation),
        u32::from(EarnError::Overflow),
        u32::from(StakingError::Overflow),
        u32::from(StakingError::RewardAccountingViolation),
    ];

    if validation.contains(&code) {
        ErrorClass::Validation
    } else if adjustable.contains(&code) {
        ErrorClass::Adjustable
    } else if retryable.contains(&code) {
        ErrorClass::Retryable
    } else if invariant.contains(&code) {
        ErrorClass::Invariant
    } else {
        ErrorClass::Terminal
    }
}

pub fn is_retryable(err: &Error) -> bool {
    classify(err) == ErrorClass::Retryable
}

/// Error outcome persisted on a failed operation so replays can return it.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredError {
    pub code: u32,
    pub name: String,
    pub message: String,
    pub retryable: bool,
}

impl StoredError {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::AnchorError(e) => Self {
                code: e.error_code_number,
                name: e.error_name.clone(),
                message: e.error_msg.clone(),
                retryable: is_retryable(err),
            },
            Error::ProgramError(e) => Self {
                code: u32::from(EarnError::InternalInvariantViolation),
                name: "ProgramError".to_string(),
                message: e.to_string(),
                retryable: false,
            },
        }
    }

    /// Rebuild an error that compares equal to the one originally stored.
    pub fn to_error(&self) -> Error {
        Error::from(AnchorError {
            error_name: self.name.clone(),
            error_code_number: self.code,
            error_msg: self.message.clone(),
            error_origin: None,
            compared_values: None,
        })
    }
}
