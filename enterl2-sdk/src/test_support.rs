//! In-memory collaborators and fixtures shared by unit tests

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::builder::{self, SignedTransaction, UnsignedTransaction};
use crate::chain::{
    ChainEvent, ChainReceipt, ChainRpc, ChainTransaction, EventFilter, EventTopic, TransactionSigner,
    WalletRegistry,
};
use crate::error::RpcError;
use crate::events::Subscription;
use crate::fees::convert_at_rate;
use crate::signer::LocalKeySigner;
use crate::types::{
    FeeEstimate, GasQuote, ResolvedIntent, TransactionKind, WalletInfo, WalletType, NATIVE_TOKEN,
};

/// Well-known development key (anvil / hardhat account 0)
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_KEY_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

pub fn address(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn hex_address(address: Address) -> String {
    format!("{:?}", address)
}

fn wallet(n: u8, wallet_type: WalletType) -> WalletInfo {
    WalletInfo {
        address: address(n),
        wallet_type,
        owner: address(n.wrapping_add(0x80)),
        whitelist_enabled: false,
        daily_limit: U256::zero(),
        operators: vec![],
    }
}

pub fn consumer(n: u8) -> WalletInfo {
    wallet(n, WalletType::Consumer)
}

pub fn merchant(n: u8) -> WalletInfo {
    wallet(n, WalletType::Merchant)
}

pub fn receipt(hash: H256, block: u64, success: bool) -> ChainReceipt {
    ChainReceipt {
        transaction_hash: hash,
        block_number: Some(block),
        status: Some(if success { 1 } else { 0 }),
        gas_used: Some(U256::from(21_000u64)),
    }
}

pub fn sample_unsigned() -> UnsignedTransaction {
    let intent = ResolvedIntent {
        kind: TransactionKind::Payment,
        from: address(1),
        to: address(2),
        amount: U256::from(1_000u64),
        token: None,
        description: Some("sample".into()),
        fee_payer: None,
        bridge_nonce: None,
    };
    let fee = FeeEstimate {
        gas_limit: U256::from(21_000u64),
        gas_price: U256::from(1_000_000_000u64),
        total_fee: U256::from(21_000_000_000_000u64),
        fee_payer: address(1),
        fee_token: NATIVE_TOKEN,
    };
    builder::assemble(31337, Address::zero(), &intent, &fee, U256::zero())
}

pub async fn signed_sample() -> SignedTransaction {
    LocalKeySigner::from_private_key(TEST_KEY)
        .unwrap()
        .sign(&sample_unsigned())
        .await
        .unwrap()
}

#[derive(Default)]
struct Calls {
    balance: usize,
    fee_quote: usize,
    receipt: usize,
    block_number: usize,
    submit: usize,
}

struct MockState {
    nonces: HashMap<Address, U256>,
    balances: HashMap<(Address, Address), U256>,
    quote: GasQuote,
    fee_rates: HashMap<Address, U256>,
    block_number: u64,
    receipts: HashMap<H256, ChainReceipt>,
    submitted: Vec<SignedTransaction>,
    subscribers: Vec<(EventTopic, EventFilter, mpsc::Sender<ChainEvent>)>,
    fail_fee_quotes: bool,
    fail_balance_reads: bool,
    fail_submissions: bool,
    failing_polls: usize,
    auto_receipt: Option<bool>,
    calls: Calls,
}

/// Scriptable in-memory chain
pub struct MockChain {
    chain_id: u64,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::with_chain_id(31337)
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(MockState {
                nonces: HashMap::new(),
                balances: HashMap::new(),
                quote: GasQuote {
                    gas_limit: U256::from(65_000u64),
                    gas_price: U256::from(1_000_000_000u64),
                },
                fee_rates: HashMap::new(),
                block_number: 1,
                receipts: HashMap::new(),
                submitted: Vec::new(),
                subscribers: Vec::new(),
                fail_fee_quotes: false,
                fail_balance_reads: false,
                fail_submissions: false,
                failing_polls: 0,
                auto_receipt: None,
                calls: Calls::default(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_nonce(&self, address: Address, nonce: U256) {
        self.state().nonces.insert(address, nonce);
    }

    pub fn quote(&self) -> GasQuote {
        self.state().quote
    }

    pub fn set_fee_rate(&self, token: Address, units_per_native: U256) {
        self.state().fee_rates.insert(token, units_per_native);
    }

    pub fn fail_fee_quotes(&self, fail: bool) {
        self.state().fail_fee_quotes = fail;
    }

    pub fn fee_quote_calls(&self) -> usize {
        self.state().calls.fee_quote
    }

    pub fn set_balance(&self, address: Address, token: Option<Address>, amount: U256) {
        self.state()
            .balances
            .insert((address, token.unwrap_or(NATIVE_TOKEN)), amount);
    }

    pub fn balance_calls(&self) -> usize {
        self.state().calls.balance
    }

    pub fn fail_balance_reads(&self, fail: bool) {
        self.state().fail_balance_reads = fail;
    }

    pub fn set_block_number(&self, block: u64) {
        self.state().block_number = block;
    }

    pub fn set_receipt(&self, receipt: ChainReceipt) {
        self.state().receipts.insert(receipt.transaction_hash, receipt);
    }

    /// The next `n` transaction lookups fail with a network error
    pub fn fail_next_polls(&self, n: usize) {
        self.state().failing_polls = n;
    }

    pub fn receipt_calls(&self) -> usize {
        self.state().calls.receipt
    }

    pub fn block_number_calls(&self) -> usize {
        self.state().calls.block_number
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.state().fail_submissions = fail;
    }

    pub fn submit_calls(&self) -> usize {
        self.state().calls.submit
    }

    /// Give every submitted transaction a receipt in the current block,
    /// successful or reverted
    pub fn auto_receipt(&self, success: Option<bool>) {
        self.state().auto_receipt = success;
    }

    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.state().submitted.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|(_, _, tx)| !tx.is_closed());
        state.subscribers.len()
    }

    /// Deliver an event to matching subscriptions
    pub fn emit(&self, event: ChainEvent) {
        let topic = match event {
            ChainEvent::Payment(_) => EventTopic::Payments,
            ChainEvent::DepositFinalized(_) => EventTopic::DepositsFinalized,
            ChainEvent::WithdrawalFinalized(_) => EventTopic::WithdrawalsFinalized,
        };
        let mut state = self.state();
        state.subscribers.retain(|(_, _, tx)| !tx.is_closed());
        for (t, filter, tx) in state.subscribers.iter() {
            if *t == topic && filter.matches(&event) {
                let _ = tx.try_send(event.clone());
            }
        }
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: Address, token: Option<Address>) -> Result<U256, RpcError> {
        let mut state = self.state();
        state.calls.balance += 1;
        if state.fail_balance_reads {
            return Err(RpcError::Network("balance read refused".into()));
        }
        Ok(state
            .balances
            .get(&(address, token.unwrap_or(NATIVE_TOKEN)))
            .copied()
            .unwrap_or_default())
    }

    async fn get_transaction(&self, hash: H256) -> Result<Option<ChainTransaction>, RpcError> {
        let mut state = self.state();
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(RpcError::Network("connection reset".into()));
        }
        let block_number = state.receipts.get(&hash).and_then(|r| r.block_number);
        Ok(state
            .submitted
            .iter()
            .find(|s| s.hash() == hash)
            .map(|s| ChainTransaction {
                hash,
                from: s.transaction.from,
                to: Some(s.transaction.to),
                value: s.transaction.value,
                nonce: s.transaction.nonce,
                block_number,
            }))
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<ChainReceipt>, RpcError> {
        let mut state = self.state();
        state.calls.receipt += 1;
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let mut state = self.state();
        state.calls.block_number += 1;
        Ok(state.block_number)
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        let state = self.state();
        if state.fail_fee_quotes {
            return Err(RpcError::Network("fee oracle unreachable".into()));
        }
        Ok(state.quote.gas_price)
    }

    async fn suggest_fee(&self, _intent: &ResolvedIntent) -> Result<GasQuote, RpcError> {
        let mut state = self.state();
        state.calls.fee_quote += 1;
        if state.fail_fee_quotes {
            return Err(RpcError::Network("fee oracle unreachable".into()));
        }
        Ok(state.quote)
    }

    async fn convert_fee(&self, fee_token: Address, native_amount: U256) -> Result<Option<U256>, RpcError> {
        Ok(self
            .state()
            .fee_rates
            .get(&fee_token)
            .map(|rate| convert_at_rate(native_amount, *rate)))
    }

    async fn get_nonce(&self, address: Address) -> Result<U256, RpcError> {
        Ok(self.state().nonces.get(&address).copied().unwrap_or_default())
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<H256, RpcError> {
        let mut state = self.state();
        state.calls.submit += 1;
        if state.fail_submissions {
            return Err(RpcError::Node {
                code: -32000,
                message: "nonce too low".into(),
            });
        }
        let hash = transaction.hash();
        state.submitted.push(transaction.clone());
        if let Some(success) = state.auto_receipt {
            let block = state.block_number;
            state.receipts.insert(hash, receipt(hash, block, success));
        }
        Ok(hash)
    }

    async fn subscribe(&self, topic: EventTopic, filter: EventFilter) -> Result<Subscription<ChainEvent>, RpcError> {
        let mut state = self.state();
        let (tx, subscription) = Subscription::channel(
            format!("mock-{:?}-{}", topic, state.subscribers.len()),
            CancellationToken::new(),
        );
        state.subscribers.push((topic, filter, tx));
        Ok(subscription)
    }
}

/// Wallet registry backed by a map
pub struct MockRegistry {
    wallets: Mutex<HashMap<Address, WalletInfo>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            wallets: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, info: WalletInfo) {
        self.wallets.lock().unwrap().insert(info.address, info);
    }
}

#[async_trait]
impl WalletRegistry for MockRegistry {
    async fn get_wallet_info(&self, address: Address) -> Result<Option<WalletInfo>, RpcError> {
        Ok(self.wallets.lock().unwrap().get(&address).cloned())
    }
}
