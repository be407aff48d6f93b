//! Core data model: wallets, intents, records and bridge operations

use chrono::{DateTime, Utc};
use ethers::types::{Address, H160, H256, U256};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::config::{Network, TokenTable};
use crate::error::ValidationError;
use crate::units;

/// Token address standing for the chain's native gas asset
pub const NATIVE_TOKEN: Address = H160([0u8; 20]);

// =====================================================
// Wallets
// =====================================================

/// Wallet type as registered by the wallet factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    /// Receives funds, never pays network fees
    Consumer,
    /// May pay fees on behalf of consumer counterparties
    Merchant,
}

impl WalletType {
    /// Decode the on-chain numeric tag. Unknown tags are rejected, not defaulted.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(WalletType::Consumer),
            1 => Some(WalletType::Merchant),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            WalletType::Consumer => 0,
            WalletType::Merchant => 1,
        }
    }
}

/// Smart-wallet metadata served by the wallet registry. Read-only to the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub address: Address,
    pub wallet_type: WalletType,
    pub owner: Address,
    pub whitelist_enabled: bool,
    pub daily_limit: U256,
    pub operators: Vec<Address>,
}

// =====================================================
// Transactions
// =====================================================

/// What a caller wants to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
    Deposit,
    Withdrawal,
}

/// Record type as reported by the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    Deposit,
    Withdrawal,
    NameRegistration,
    Staking,
}

impl TransactionType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TransactionType::Transfer),
            1 => Some(TransactionType::Deposit),
            2 => Some(TransactionType::Withdrawal),
            3 => Some(TransactionType::NameRegistration),
            4 => Some(TransactionType::Staking),
            _ => None,
        }
    }
}

impl From<TransactionKind> for TransactionType {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Payment => TransactionType::Transfer,
            TransactionKind::Deposit => TransactionType::Deposit,
            TransactionKind::Withdrawal => TransactionType::Withdrawal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// A payment or bridge request as supplied by the caller.
///
/// Fields are kept as text so validation can report exactly which input was
/// malformed. `amount` is an integer in the token's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub kind: TransactionKind,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub token: Option<String>,
    pub description: Option<String>,
    /// Merchant counterparty that settles the fee for a consumer sender
    pub fee_payer: Option<String>,
    /// Withdrawal nonce issued at request time (withdrawals only)
    pub bridge_nonce: Option<H256>,
}

impl TransactionIntent {
    pub fn payment(from: impl Into<String>, to: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::Payment,
            from: from.into(),
            to: to.into(),
            amount: amount.into(),
            token: None,
            description: None,
            fee_payer: None,
            bridge_nonce: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_fee_payer(mut self, fee_payer: impl Into<String>) -> Self {
        self.fee_payer = Some(fee_payer.into());
        self
    }

    /// Replace the amount with a human decimal value converted exactly
    pub fn with_human_amount(mut self, amount: &str, decimals: u8) -> Result<Self, ValidationError> {
        self.amount = units::parse_units(amount, decimals)?.to_string();
        Ok(self)
    }

    /// Replace the amount with a decimal value in the intent's token, using
    /// the decimals the token table declares for it
    pub fn with_token_amount(mut self, amount: &str, tokens: &TokenTable) -> Result<Self, ValidationError> {
        let token = match self.token.as_deref() {
            Some(t) => Some(units::parse_token(t)?),
            None => None,
        };
        self.amount = tokens.parse_amount(token.as_ref(), amount)?.to_string();
        Ok(self)
    }

    /// Syntactic checks (addresses, amount, token) producing typed values.
    ///
    /// Order matches the payment validator: addresses first, then amount,
    /// then token. Sender and recipient must differ for payments only.
    pub fn resolve(&self) -> Result<ResolvedIntent, ValidationError> {
        let from = units::parse_address(&self.from)?;
        let to = units::parse_address(&self.to)?;
        // bridging to one's own address on the other chain is the normal case
        if self.kind == TransactionKind::Payment && from == to {
            return Err(ValidationError::SameAddress(from));
        }

        let amount = units::parse_base_units(&self.amount)?;

        let token = match self.token.as_deref() {
            Some(t) => Some(units::parse_token(t)?),
            None => None,
        };

        let fee_payer = match self.fee_payer.as_deref() {
            Some(f) => Some(units::parse_address(f)?),
            None => None,
        };

        Ok(ResolvedIntent {
            kind: self.kind,
            from,
            to,
            amount,
            token,
            description: self.description.clone(),
            fee_payer,
            bridge_nonce: self.bridge_nonce,
        })
    }
}

/// A syntactically valid intent with typed fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIntent {
    pub kind: TransactionKind,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub token: Option<Address>,
    pub description: Option<String>,
    pub fee_payer: Option<Address>,
    pub bridge_nonce: Option<H256>,
}

/// Snapshot of the connected L2 network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    pub network: Network,
    pub chain_id: u64,
    pub block_number: u64,
    pub gas_price: U256,
}

/// Gas quote from the chain's fee-suggestion interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasQuote {
    pub gas_limit: U256,
    pub gas_price: U256,
}

/// Resolved fee for one transaction. Recomputed per transaction, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub gas_limit: U256,
    pub gas_price: U256,
    /// Fee in `fee_token` units
    pub total_fee: U256,
    pub fee_payer: Address,
    /// [`NATIVE_TOKEN`] when the fee is paid in the gas asset
    pub fee_token: Address,
}

impl FeeEstimate {
    /// True when someone other than `sender` settles the fee
    pub fn is_delegated(&self, sender: &Address) -> bool {
        self.fee_payer != *sender
    }
}

/// Client-side view of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: H256,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub token: Option<Address>,
    pub fee: U256,
    pub fee_payer: Address,
    pub fee_token: Address,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub timestamp: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl TransactionRecord {
    /// Move to `next`. Returns false (and changes nothing) once terminal.
    pub fn transition(&mut self, next: TransactionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// =====================================================
// Bridge
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BridgeDirection {
    /// L1 to L2
    Deposit,
    /// L2 to L1
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    Pending,
    Completed,
    Failed,
}

/// One logical cross-chain transfer (source leg plus destination leg).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeOperation {
    /// Correlation id shared by both legs
    pub id: String,
    pub direction: BridgeDirection,
    pub status: BridgeStatus,
    pub token_address: Address,
    pub amount: U256,
    pub beneficiary: Address,
    pub source_tx_hash: H256,
    pub destination_tx_hash: Option<H256>,
    pub timestamp: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

impl BridgeOperation {
    pub fn is_terminal(&self) -> bool {
        self.status != BridgeStatus::Pending
    }
}
