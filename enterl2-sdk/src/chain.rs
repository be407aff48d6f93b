//! Collaborator interfaces: chain RPC, signer and wallet registry
//!
//! The SDK core only talks to these traits. [`crate::rpc::HttpChainRpc`] and
//! [`crate::signer::LocalKeySigner`] are the bundled implementations.

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::builder::{SignedTransaction, UnsignedTransaction};
use crate::error::RpcError;
use crate::events::Subscription;
use crate::types::{GasQuote, ResolvedIntent, WalletInfo};

/// Transaction as seen by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: U256,
    pub block_number: Option<u64>,
}

/// Execution receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReceipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    /// 1 = success, 0 = reverted
    pub status: Option<u64>,
    pub gas_used: Option<U256>,
}

impl ChainReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(1)
    }
}

/// Transfer observed on the L2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub tx_hash: H256,
    pub from: Address,
    pub to: Address,
    pub token: Address,
    pub amount: U256,
    pub fee_payer: Address,
}

/// Deposit credited on the L2 (destination leg of an L1 to L2 bridge)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositFinalized {
    pub tx_hash: H256,
    pub source_tx_hash: H256,
    pub beneficiary: Address,
    pub token: Address,
    pub amount: U256,
}

/// Withdrawal released on the L1 (destination leg of an L2 to L1 bridge)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFinalized {
    pub tx_hash: H256,
    pub nonce: H256,
    pub recipient: Address,
    pub token: Address,
    pub amount: U256,
}

/// Events delivered by a chain subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEvent {
    Payment(PaymentEvent),
    DepositFinalized(DepositFinalized),
    WithdrawalFinalized(WithdrawalFinalized),
}

/// Which event family a subscription delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Payments,
    DepositsFinalized,
    WithdrawalsFinalized,
}

/// Optional narrowing of a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events whose recipient / beneficiary is this address
    pub recipient: Option<Address>,
    /// First block to scan; latest when unset
    pub from_block: Option<u64>,
}

/// Node access for one chain (the L2, or the L1 for bridging)
#[async_trait]
pub trait ChainRpc: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Balance of the native asset (`token == None`) or an ERC-20 token
    async fn get_balance(&self, address: Address, token: Option<Address>) -> Result<U256, RpcError>;

    async fn get_transaction(&self, hash: H256) -> Result<Option<ChainTransaction>, RpcError>;

    async fn get_receipt(&self, hash: H256) -> Result<Option<ChainReceipt>, RpcError>;

    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Current price per gas unit in the native asset
    async fn gas_price(&self) -> Result<U256, RpcError>;

    /// Gas limit and price for executing `intent`
    async fn suggest_fee(&self, intent: &ResolvedIntent) -> Result<GasQuote, RpcError>;

    /// Convert a native-asset amount into `fee_token` units.
    /// `Ok(None)` means the token is not accepted for fees.
    async fn convert_fee(&self, fee_token: Address, native_amount: U256) -> Result<Option<U256>, RpcError>;

    /// Next nonce for `address`, including pending transactions
    async fn get_nonce(&self, address: Address) -> Result<U256, RpcError>;

    /// Broadcast a signed transaction, returning its hash
    async fn submit(&self, transaction: &SignedTransaction) -> Result<H256, RpcError>;

    async fn subscribe(&self, topic: EventTopic, filter: EventFilter) -> Result<Subscription<ChainEvent>, RpcError>;
}

/// Signs canonical transactions. Keys never leave the implementation.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign(&self, transaction: &UnsignedTransaction) -> Result<SignedTransaction, String>;
}

/// Read-only smart-wallet metadata
#[async_trait]
pub trait WalletRegistry: Send + Sync {
    /// `Ok(None)` for addresses that are not registered smart wallets
    async fn get_wallet_info(&self, address: Address) -> Result<Option<WalletInfo>, RpcError>;
}

/// Registry for deployments without smart wallets: every address is unregistered
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWalletRegistry;

#[async_trait]
impl WalletRegistry for NoWalletRegistry {
    async fn get_wallet_info(&self, _address: Address) -> Result<Option<WalletInfo>, RpcError> {
        Ok(None)
    }
}

impl ChainEvent {
    /// Recipient side of the event, used for subscription filters
    pub fn recipient(&self) -> Address {
        match self {
            ChainEvent::Payment(e) => e.to,
            ChainEvent::DepositFinalized(e) => e.beneficiary,
            ChainEvent::WithdrawalFinalized(e) => e.recipient,
        }
    }

    pub fn tx_hash(&self) -> H256 {
        match self {
            ChainEvent::Payment(e) => e.tx_hash,
            ChainEvent::DepositFinalized(e) => e.tx_hash,
            ChainEvent::WithdrawalFinalized(e) => e.tx_hash,
        }
    }
}

impl EventFilter {
    pub fn recipient(address: Address) -> Self {
        Self {
            recipient: Some(address),
            from_block: None,
        }
    }

    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.recipient.map_or(true, |r| r == event.recipient())
    }
}
