//! Client SDK for the Enter L2 payment network.
//!
//! Builds, validates and submits payments with merchant fee delegation,
//! tracks confirmations, and correlates the two legs of L1/L2 bridge
//! transfers. Chain access, signing and wallet metadata go through the
//! collaborator traits in [`chain`]; [`rpc`] and [`signer`] provide JSON-RPC
//! and local-key implementations.
//!
//! ```no_run
//! use enterl2_sdk::{SdkConfig, Session, TransactionIntent};
//!
//! # async fn run() -> enterl2_sdk::Result<()> {
//! let config = SdkConfig::from_env()?;
//! let session = Session::connect_with_private_key(config, "0x...").await?;
//! let intent = TransactionIntent::payment(
//!     format!("{:?}", session.address()),
//!     "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
//!     "2000000",
//! );
//! let record = session.payments().send_payment(&intent).await?;
//! println!("confirmed in block {:?}", record.block_number);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod fees;
pub mod payment_request;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod tracker;
pub mod types;
pub mod units;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use bridge::{BridgeCorrelator, CorrelationKey, DestinationOutcome, SourceLeg};
pub use builder::{SignedTransaction, TransactionBuilder, UnsignedTransaction};
pub use chain::{ChainRpc, EventFilter, EventTopic, NoWalletRegistry, TransactionSigner, WalletRegistry};
pub use config::{Network, SdkConfig, TokenInfo, TokenTable};
pub use error::{
    BridgeError, FeeError, PaymentRequestError, Result, RpcError, SdkError, TrackingError, ValidationError,
};
pub use events::{EventBroadcaster, SdkEvent, Subscription};
pub use fees::FeeEstimator;
pub use payment_request::{create_payment_request, parse_payment_request, PaymentRequest};
pub use rpc::{ContractWalletRegistry, HttpChainRpc};
pub use session::{BridgeService, Collaborators, PaymentService, Session};
pub use signer::LocalKeySigner;
pub use tracker::ConfirmationTracker;
pub use types::{
    BridgeDirection, BridgeOperation, BridgeStatus, FeeEstimate, NetworkInfo, TransactionIntent, TransactionKind,
    TransactionRecord, TransactionStatus, TransactionType, WalletInfo, WalletType, NATIVE_TOKEN,
};
pub use units::{format_units, parse_units};
pub use validator::{PaymentValidator, ValidatedIntent};
