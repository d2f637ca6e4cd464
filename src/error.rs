use crate::{
    chain::{
        ChainError,
        ContractError,
    },
    primitives::TxHash,
    signer::CredentialError,
    tx::{
        RevertKind,
        RevertReason,
    },
};

use std::{
    fmt::Debug,
    time::Duration,
};
use thiserror::Error;

/// Every failure an engine operation can surface to its caller.
///
/// Nothing is retried inside the engine. Variants that leave the outcome of a
/// state-changing transaction ambiguous ([`EngineError::Timeout`],
/// [`EngineError::Confirmation`]) must not be retried blindly by the caller
/// either.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Signing credential error")]
    Credential(#[from] CredentialError),
    #[error("Transaction submission failed: {message}")]
    Submission {
        message: String,
        revert: Option<RevertReason>,
    },
    #[error("Nonce conflict while submitting transaction: {message}")]
    NonceConflict { message: String },
    #[error("Transaction reverted: {reason}")]
    Reverted {
        transaction_hash: Option<TxHash>,
        reason: RevertReason,
    },
    #[error("Transaction {transaction_hash} not confirmed within {waited:?}")]
    Timeout {
        transaction_hash: TxHash,
        waited: Duration,
    },
    #[error("Lost track of transaction {transaction_hash} while awaiting its receipt")]
    Confirmation {
        transaction_hash: TxHash,
        #[source]
        source: ChainError,
    },
    #[error("No {expected:?} event in receipt of transaction {transaction_hash}")]
    NoMatchingEvent {
        transaction_hash: TxHash,
        expected: Vec<String>,
    },
    #[error("No `{event}` history found for token {token_id}")]
    MissingHistory { token_id: u64, event: String },
    #[error("Post-condition violated: {0}")]
    PostCondition(String),
    #[error("Chain client error")]
    Chain(#[from] ChainError),
    #[error("Contract interface error")]
    Contract(#[from] ContractError),
    #[error("Event `{event}` has no argument `{arg}` of the expected type")]
    UnexpectedEventShape { event: String, arg: String },
    #[error("Unexpected return data from `{method}`")]
    UnexpectedReturn { method: String },
    #[error("{what} exceeds u64")]
    ValueOutOfRange { what: &'static str },
    #[error("Update payload contains no fields")]
    EmptyUpdate,
    #[error("Field `{field}` cannot be cleared; an empty value keeps the stored one")]
    EmptyFieldValue { field: &'static str },
    #[error("Block timestamp {0} is out of range")]
    InvalidTimestamp(u64),
}

pub type EngineResult<T = ()> = std::result::Result<T, EngineError>;

impl EngineError {
    /// The classified revert sub-kind, for reverted calls and submissions.
    pub fn revert_kind(&self) -> Option<RevertKind> {
        match self {
            EngineError::Reverted { reason, .. } => Some(reason.kind),
            EngineError::Submission {
                revert: Some(reason),
                ..
            } => Some(reason.kind),
            _ => None,
        }
    }

    /// Whether the failure happened before the chain accepted anything and may
    /// succeed with a freshly built request.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Submission { revert, .. } => revert.is_none(),
            EngineError::NonceConflict { .. } => true,
            EngineError::Chain(err) => err.is_transient(),
            _ => false,
        }
    }
}
