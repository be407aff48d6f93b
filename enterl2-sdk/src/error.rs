//! Error types for the Enter L2 SDK
//!
//! Every public operation returns one of these as a typed result. Only
//! transient poll-tick failures inside the confirmation and bridge loops are
//! swallowed (logged and retried until the deadline).

use ethers::types::{Address, H256, U256};
use std::time::Duration;
use thiserror::Error;

use crate::types::{BridgeStatus, TransactionRecord};

/// Failure of a collaborator call (transport, decoding, node error).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// Endpoint unreachable or returned a non-success HTTP status
    #[error("Network error: {0}")]
    Network(String),

    /// Node answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Node { code: i64, message: String },

    /// Response could not be decoded
    #[error("Failed to decode RPC response: {0}")]
    Decode(String),

    /// Operation not offered by this collaborator
    #[error("Unsupported RPC operation: {0}")]
    Unsupported(String),
}

/// Payment validation failures. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Sender and recipient are the same address: {0:?}")]
    SameAddress(Address),

    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    #[error("Invalid token address '{0}'")]
    InvalidToken(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: U256, available: U256 },

    /// Wallet registry could not be reached
    #[error("Wallet lookup failed: {0}")]
    WalletLookupFailed(RpcError),

    /// Balance read failed; the chain collaborator could not be reached
    #[error("Balance unavailable: {0}")]
    BalanceUnavailable(RpcError),
}

/// Fee estimation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Fee quote collaborator unreachable. Surfaced, not retried.
    #[error("Fee quote unavailable: {0}")]
    QuoteUnavailable(RpcError),

    #[error("Unsupported fee token: {0:?}")]
    UnsupportedFeeToken(Address),
}

/// Submission and confirmation tracking failures.
#[derive(Error, Debug, Clone)]
pub enum TrackingError {
    /// Initial submission rejected; never retried
    #[error("Transaction submission failed: {0}")]
    SubmissionFailed(RpcError),

    /// On-chain revert. Terminal.
    #[error("Transaction {hash:?} failed on-chain")]
    TransactionFailed {
        hash: H256,
        record: Box<TransactionRecord>,
    },

    /// Deadline exceeded while tracking. The outcome on chain is unknown.
    #[error("Timed out after {waited:?} waiting for transaction {hash:?}; outcome unknown")]
    Timeout { hash: H256, waited: Duration },

    /// Tracking was abandoned by the caller
    #[error("Tracking of transaction {0:?} was cancelled")]
    Cancelled(H256),
}

impl TrackingError {
    /// True when the transaction may still complete on chain
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, TrackingError::Timeout { .. } | TrackingError::Cancelled(_))
    }
}

/// Bridge correlation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Destination event with no matching pending operation
    #[error("Orphan destination event for correlation id {correlation_id} (tx {destination_tx_hash:?})")]
    OrphanEvent {
        correlation_id: String,
        destination_tx_hash: H256,
    },

    /// A second, different destination hash for an already completed operation
    #[error("Operation {id} already completed with {existing:?}, refusing {incoming:?}")]
    ConflictingDestination {
        id: String,
        existing: H256,
        incoming: H256,
    },

    #[error("Operation {id} is already {status}")]
    AlreadyFinalized { id: String, status: BridgeStatus },

    #[error("Unknown bridge operation {0}")]
    UnknownOperation(String),
}

/// Payment-request URL parsing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentRequestError {
    #[error("Invalid payment request URL: {0}")]
    InvalidUrl(String),

    #[error("Payment request must use enterl2://pay, got {0}")]
    WrongScheme(String),

    #[error("Payment request is missing required parameter '{0}'")]
    MissingParameter(&'static str),
}

/// Top-level SDK error.
#[derive(Error, Debug, Clone)]
pub enum SdkError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    PaymentRequest(#[from] PaymentRequestError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The session was disconnected
    #[error("Client not connected")]
    NotConnected,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SdkError>;
