//! Canonical unsigned transactions
//!
//! A validated intent plus its fee estimate becomes an [`UnsignedTransaction`]
//! whose payload is a fixed ABI encoding: the same inputs always produce the
//! same bytes, so signatures are reproducible.

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, RecoveryMessage, Signature, H256, U256};
use ethers::utils::{id, keccak256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chain::ChainRpc;
use crate::error::RpcError;
use crate::types::{FeeEstimate, ResolvedIntent, TransactionKind, TransactionType, NATIVE_TOKEN};

/// Leading byte of every encoded payload
pub const PAYLOAD_VERSION: u8 = 0x01;

const ERC20_TRANSFER: &str = "transfer(address,uint256)";
const BRIDGE_DEPOSIT: &str = "deposit(address,uint256,address)";
const BRIDGE_WITHDRAW: &str = "withdraw(address,uint256,address,bytes32)";

/// Transaction ready for signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: U256,
    pub kind: TransactionKind,
    pub from: Address,
    /// Call target: the recipient, the token contract or the bridge contract
    pub to: Address,
    /// Economic recipient of `amount`
    pub recipient: Address,
    pub amount: U256,
    pub token: Option<Address>,
    /// Native value attached to the call
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub fee_payer: Address,
    pub fee_token: Address,
    pub max_fee: U256,
    pub description: Option<String>,
    pub bridge_nonce: Option<H256>,
}

impl UnsignedTransaction {
    /// Deterministic byte encoding
    pub fn payload(&self) -> Vec<u8> {
        let tokens = [
            Token::Uint(U256::from(self.chain_id)),
            Token::Uint(self.nonce),
            Token::Uint(U256::from(kind_tag(self.kind))),
            Token::Address(self.from),
            Token::Address(self.to),
            Token::Address(self.recipient),
            Token::Uint(self.amount),
            Token::Address(self.token.unwrap_or(NATIVE_TOKEN)),
            Token::Uint(self.value),
            Token::Bytes(self.data.to_vec()),
            Token::Uint(self.gas_limit),
            Token::Uint(self.gas_price),
            Token::Address(self.fee_payer),
            Token::Address(self.fee_token),
            Token::Uint(self.max_fee),
            Token::String(self.description.clone().unwrap_or_default()),
            Token::FixedBytes(self.bridge_nonce.unwrap_or_default().as_bytes().to_vec()),
        ];

        let mut payload = vec![PAYLOAD_VERSION];
        payload.extend_from_slice(&abi::encode(&tokens));
        payload
    }

    /// Digest the signer signs
    pub fn signing_hash(&self) -> H256 {
        H256::from(keccak256(self.payload()))
    }

    pub fn tx_type(&self) -> TransactionType {
        self.kind.into()
    }
}

/// Unsigned transaction plus the signer's signature over its signing hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: UnsignedTransaction,
    pub signature: Signature,
}

impl SignedTransaction {
    pub fn new(transaction: UnsignedTransaction, signature: Signature) -> Self {
        Self {
            transaction,
            signature,
        }
    }

    /// Wire form: payload followed by the 65-byte signature
    pub fn raw(&self) -> Bytes {
        let mut raw = self.transaction.payload();
        raw.extend_from_slice(&self.signature.to_vec());
        Bytes::from(raw)
    }

    pub fn hash(&self) -> H256 {
        H256::from(keccak256(self.raw()))
    }

    /// Address that produced the signature
    pub fn recover_signer(&self) -> Result<Address, String> {
        let digest = self.transaction.signing_hash();
        self.signature
            .recover(RecoveryMessage::Hash(digest))
            .map_err(|e| format!("Failed to recover signer: {}", e))
    }
}

fn kind_tag(kind: TransactionKind) -> u8 {
    match kind {
        TransactionKind::Payment => 0,
        TransactionKind::Deposit => 1,
        TransactionKind::Withdrawal => 2,
    }
}

fn selector_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend_from_slice(&abi::encode(args));
    Bytes::from(data)
}

/// Call target, attached native value and calldata for an intent.
///
/// Native payments are plain value transfers, token payments call the
/// token's `transfer`, bridge legs call the bridge contract.
pub fn call_for(intent: &ResolvedIntent, bridge_contract: Address) -> (Address, U256, Bytes) {
    let native = intent.token.map_or(true, |t| t == NATIVE_TOKEN);
    let token = intent.token.unwrap_or(NATIVE_TOKEN);
    let value = if native { intent.amount } else { U256::zero() };

    match intent.kind {
        TransactionKind::Payment if native => (intent.to, intent.amount, Bytes::default()),
        TransactionKind::Payment => (
            token,
            U256::zero(),
            selector_call(
                ERC20_TRANSFER,
                &[Token::Address(intent.to), Token::Uint(intent.amount)],
            ),
        ),
        TransactionKind::Deposit => (
            bridge_contract,
            value,
            selector_call(
                BRIDGE_DEPOSIT,
                &[
                    Token::Address(token),
                    Token::Uint(intent.amount),
                    Token::Address(intent.to),
                ],
            ),
        ),
        TransactionKind::Withdrawal => (
            bridge_contract,
            value,
            selector_call(
                BRIDGE_WITHDRAW,
                &[
                    Token::Address(token),
                    Token::Uint(intent.amount),
                    Token::Address(intent.to),
                    Token::FixedBytes(intent.bridge_nonce.unwrap_or_default().as_bytes().to_vec()),
                ],
            ),
        ),
    }
}

/// Builds canonical transactions for one chain
pub struct TransactionBuilder {
    chain: Arc<dyn ChainRpc>,
    bridge_contract: Address,
}

impl TransactionBuilder {
    pub fn new(chain: Arc<dyn ChainRpc>, bridge_contract: Address) -> Self {
        Self {
            chain,
            bridge_contract,
        }
    }

    /// Fetch the sender's nonce and assemble
    pub async fn build(
        &self,
        intent: &ResolvedIntent,
        fee: &FeeEstimate,
    ) -> Result<UnsignedTransaction, RpcError> {
        let nonce = self.chain.get_nonce(intent.from).await?;
        Ok(assemble(
            self.chain.chain_id(),
            self.bridge_contract,
            intent,
            fee,
            nonce,
        ))
    }
}

/// Pure assembly; no I/O
pub fn assemble(
    chain_id: u64,
    bridge_contract: Address,
    intent: &ResolvedIntent,
    fee: &FeeEstimate,
    nonce: U256,
) -> UnsignedTransaction {
    let (to, value, data) = call_for(intent, bridge_contract);
    UnsignedTransaction {
        chain_id,
        nonce,
        kind: intent.kind,
        from: intent.from,
        to,
        recipient: intent.to,
        amount: intent.amount,
        token: intent.token,
        value,
        data,
        gas_limit: fee.gas_limit,
        gas_price: fee.gas_price,
        fee_payer: fee.fee_payer,
        fee_token: fee.fee_token,
        max_fee: fee.total_fee,
        description: intent.description.clone(),
        bridge_nonce: intent.bridge_nonce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{address, MockChain};

    fn intent() -> ResolvedIntent {
        ResolvedIntent {
            kind: TransactionKind::Payment,
            from: address(1),
            to: address(2),
            amount: U256::from(5_000_000u64),
            token: Some(address(9)),
            description: Some("coffee".into()),
            fee_payer: None,
            bridge_nonce: None,
        }
    }

    fn fee() -> FeeEstimate {
        FeeEstimate {
            gas_limit: U256::from(65_000u64),
            gas_price: U256::from(1_000_000_000u64),
            total_fee: U256::from(65_000_000_000_000u64),
            fee_payer: address(1),
            fee_token: NATIVE_TOKEN,
        }
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let a = assemble(42, address(7), &intent(), &fee(), U256::from(3u64));
        let b = assemble(42, address(7), &intent(), &fee(), U256::from(3u64));
        assert_eq!(a.payload(), b.payload());
        assert_eq!(a.signing_hash(), b.signing_hash());

        let c = assemble(42, address(7), &intent(), &fee(), U256::from(4u64));
        assert_ne!(a.signing_hash(), c.signing_hash());
    }

    #[test]
    fn test_token_payment_calls_transfer() {
        let tx = assemble(42, address(7), &intent(), &fee(), U256::zero());
        assert_eq!(tx.to, address(9));
        assert_eq!(tx.recipient, address(2));
        assert!(tx.value.is_zero());
        assert_eq!(&tx.data[..4], &id(ERC20_TRANSFER)[..]);
        assert_eq!(tx.data.len(), 4 + 64);
        assert_eq!(tx.payload()[0], PAYLOAD_VERSION);
    }

    #[test]
    fn test_native_payment_is_value_transfer() {
        let mut native = intent();
        native.token = None;
        let tx = assemble(42, address(7), &native, &fee(), U256::zero());
        assert_eq!(tx.to, address(2));
        assert_eq!(tx.value, native.amount);
        assert!(tx.data.is_empty());
    }

    #[test]
    fn test_withdrawal_targets_bridge() {
        let mut w = intent();
        w.kind = TransactionKind::Withdrawal;
        w.bridge_nonce = Some(H256::repeat_byte(0xab));
        let tx = assemble(42, address(7), &w, &fee(), U256::zero());
        assert_eq!(tx.to, address(7));
        assert_eq!(&tx.data[..4], &id(BRIDGE_WITHDRAW)[..]);
        assert_eq!(tx.tx_type(), TransactionType::Withdrawal);
    }

    #[tokio::test]
    async fn test_build_uses_chain_nonce() {
        let chain = Arc::new(MockChain::new());
        chain.set_nonce(address(1), U256::from(11u64));
        let builder = TransactionBuilder::new(chain.clone(), address(7));

        let tx = builder.build(&intent(), &fee()).await.unwrap();
        assert_eq!(tx.nonce, U256::from(11u64));
        assert_eq!(tx.chain_id, chain.chain_id());
    }
}
