//! JSON-RPC chain collaborator over HTTP
//!
//! Implements [`ChainRpc`] against a standard Ethereum JSON-RPC node and
//! [`WalletRegistry`] against the wallet factory contract. Event
//! subscriptions poll `eth_getLogs`.

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256, U64};
use ethers::utils::{id, keccak256};
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::builder::{self, SignedTransaction};
use crate::chain::{
    ChainEvent, ChainReceipt, ChainRpc, ChainTransaction, DepositFinalized, EventFilter, EventTopic,
    PaymentEvent, WalletRegistry, WithdrawalFinalized,
};
use crate::config::{SdkConfig, TokenTable};
use crate::error::RpcError;
use crate::events::Subscription;
use crate::fees::convert_at_rate;
use crate::types::{GasQuote, ResolvedIntent, WalletInfo, WalletType, NATIVE_TOKEN};

pub const PAYMENT_SENT_EVENT: &str = "PaymentSent(address,address,address,uint256,address)";
pub const DEPOSIT_FINALIZED_EVENT: &str = "DepositFinalized(bytes32,address,address,uint256)";
pub const WITHDRAWAL_FINALIZED_EVENT: &str = "WithdrawalFinalized(bytes32,address,address,uint256)";

const BALANCE_OF: &str = "balanceOf(address)";
const GET_WALLET_INFO: &str = "getWalletInfo(address)";

/// Extra headroom on estimated gas (percent)
const GAS_LIMIT_BUFFER_PCT: u64 = 20;

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: H256,
    from: Address,
    to: Option<Address>,
    value: U256,
    nonce: U256,
    block_number: Option<U64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: H256,
    block_number: Option<U64>,
    status: Option<U64>,
    gas_used: Option<U256>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: Option<U64>,
    pub transaction_hash: Option<H256>,
}

/// `topic0` of an event signature
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

fn topic_signature(topic: EventTopic) -> &'static str {
    match topic {
        EventTopic::Payments => PAYMENT_SENT_EVENT,
        EventTopic::DepositsFinalized => DEPOSIT_FINALIZED_EVENT,
        EventTopic::WithdrawalsFinalized => WITHDRAWAL_FINALIZED_EVENT,
    }
}

fn parse_quantity(value: &Value, what: &str) -> Result<U256, RpcError> {
    let hex_str = value
        .as_str()
        .ok_or_else(|| RpcError::Decode(format!("Invalid {} response", what)))?;
    U256::from_str_radix(hex_str.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::Decode(format!("Failed to parse {}: {}", what, e)))
}

fn topic_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

/// Decode a log of the given family into a typed event
pub fn decode_log(topic: EventTopic, log: &RpcLog) -> Result<ChainEvent, RpcError> {
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| RpcError::Decode("log without transaction hash".to_string()))?;
    if log.topics.len() < 3 || log.topics[0] != event_topic(topic_signature(topic)) {
        return Err(RpcError::Decode(format!("log is not a {:?} event", topic)));
    }

    let data_types = match topic {
        EventTopic::Payments => vec![ParamType::Address, ParamType::Uint(256), ParamType::Address],
        EventTopic::DepositsFinalized | EventTopic::WithdrawalsFinalized => {
            vec![ParamType::Address, ParamType::Uint(256)]
        }
    };
    let mut data = abi::decode(&data_types, &log.data)
        .map_err(|e| RpcError::Decode(format!("Failed to decode log data: {}", e)))?
        .into_iter();

    let token = data
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| RpcError::Decode("missing token".to_string()))?;
    let amount = data
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| RpcError::Decode("missing amount".to_string()))?;

    Ok(match topic {
        EventTopic::Payments => ChainEvent::Payment(PaymentEvent {
            tx_hash,
            from: topic_address(&log.topics[1]),
            to: topic_address(&log.topics[2]),
            token,
            amount,
            fee_payer: data
                .next()
                .and_then(Token::into_address)
                .ok_or_else(|| RpcError::Decode("missing fee payer".to_string()))?,
        }),
        EventTopic::DepositsFinalized => ChainEvent::DepositFinalized(DepositFinalized {
            tx_hash,
            source_tx_hash: log.topics[1],
            beneficiary: topic_address(&log.topics[2]),
            token,
            amount,
        }),
        EventTopic::WithdrawalsFinalized => ChainEvent::WithdrawalFinalized(WithdrawalFinalized {
            tx_hash,
            nonce: log.topics[1],
            recipient: topic_address(&log.topics[2]),
            token,
            amount,
        }),
    })
}

/// Decode the wallet factory's `getWalletInfo` return data
pub fn decode_wallet_info(address: Address, data: &[u8]) -> Result<Option<WalletInfo>, RpcError> {
    let tokens = abi::decode(
        &[
            ParamType::Bool,
            ParamType::Uint(8),
            ParamType::Address,
            ParamType::Bool,
            ParamType::Uint(256),
            ParamType::Array(Box::new(ParamType::Address)),
        ],
        data,
    )
    .map_err(|e| RpcError::Decode(format!("Failed to decode wallet info: {}", e)))?;

    let bad = || RpcError::Decode("malformed wallet info".to_string());
    let mut it = tokens.into_iter();

    let registered = it.next().and_then(Token::into_bool).ok_or_else(bad)?;
    if !registered {
        return Ok(None);
    }
    let tag = it.next().and_then(Token::into_uint).ok_or_else(bad)?;
    let wallet_type = u8::try_from(tag.low_u64())
        .ok()
        .filter(|_| tag <= U256::from(u8::MAX))
        .and_then(WalletType::from_tag)
        .ok_or_else(|| RpcError::Decode(format!("unknown wallet type tag {}", tag)))?;
    let owner = it.next().and_then(Token::into_address).ok_or_else(bad)?;
    let whitelist_enabled = it.next().and_then(Token::into_bool).ok_or_else(bad)?;
    let daily_limit = it.next().and_then(Token::into_uint).ok_or_else(bad)?;
    let operators = it
        .next()
        .and_then(Token::into_array)
        .ok_or_else(bad)?
        .into_iter()
        .map(|t| t.into_address().ok_or_else(bad))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(WalletInfo {
        address,
        wallet_type,
        owner,
        whitelist_enabled,
        daily_limit,
        operators,
    }))
}

/// Ethereum JSON-RPC client for one chain
#[derive(Clone)]
pub struct HttpChainRpc {
    client: reqwest::Client,
    url: String,
    chain_id: u64,
    bridge_contract: Address,
    emitters: HashMap<EventTopic, Address>,
    tokens: TokenTable,
    poll_interval: Duration,
}

impl HttpChainRpc {
    pub fn new(url: impl Into<String>, chain_id: u64, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            chain_id,
            bridge_contract: Address::zero(),
            emitters: HashMap::new(),
            tokens: TokenTable::builtin(),
            poll_interval: Duration::from_secs(2),
        })
    }

    /// L2 client from configuration
    pub fn l2(config: &SdkConfig) -> Result<Self, RpcError> {
        Ok(Self::new(&config.l2_rpc_url, config.chain_id, config.timeout)?
            .with_bridge_contract(config.contracts.bridge)
            .with_emitter(EventTopic::Payments, config.contracts.state_manager)
            .with_emitter(EventTopic::DepositsFinalized, config.contracts.bridge)
            .with_tokens(config.tokens.clone())
            .with_poll_interval(config.poll_interval))
    }

    /// L1 client from configuration, when an L1 endpoint is set
    pub fn l1(config: &SdkConfig) -> Result<Option<Self>, RpcError> {
        let Some(url) = config.l1_rpc_url.as_deref() else {
            return Ok(None);
        };
        Ok(Some(
            Self::new(url, config.l1_chain_id, config.timeout)?
                .with_bridge_contract(config.contracts.l1_bridge)
                .with_emitter(EventTopic::WithdrawalsFinalized, config.contracts.l1_bridge)
                .with_tokens(config.tokens.clone())
                .with_poll_interval(config.poll_interval),
        ))
    }

    pub fn with_bridge_contract(mut self, address: Address) -> Self {
        self.bridge_contract = address;
        self
    }

    /// Only accept `topic` logs emitted by `address` (zero means any)
    pub fn with_emitter(mut self, topic: EventTopic, address: Address) -> Self {
        if !address.is_zero() {
            self.emitters.insert(topic, address);
        }
        self
    }

    pub fn with_tokens(mut self, tokens: TokenTable) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id: 1,
        };

        log::debug!("[HttpChainRpc] {} to {} with params: {:?}", method, self.url, request.params);

        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RpcError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(RpcError::Network(format!(
                "HTTP {} from {}: {}",
                status,
                self.url,
                if body.is_empty() { "empty response" } else { &body }
            )));
        }

        let rpc_response: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| RpcError::Decode(format!("{} - body: {}", e, body)))?;

        if let Some(error) = rpc_response.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let params = json!([
            {
                "to": format!("{:?}", to),
                "data": format!("0x{}", hex::encode(data))
            },
            "latest"
        ]);
        let result = self.rpc_call("eth_call", params).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("Invalid eth_call response".to_string()))?;
        hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| RpcError::Decode(format!("Failed to decode eth_call result: {}", e)))
    }

    async fn estimate_gas(&self, from: Address, to: Address, data: &[u8], value: U256) -> Result<U256, RpcError> {
        let params = json!([
            {
                "from": format!("{:?}", from),
                "to": format!("{:?}", to),
                "data": format!("0x{}", hex::encode(data)),
                "value": format!("0x{:x}", value)
            }
        ]);
        let result = self.rpc_call("eth_estimateGas", params).await?;
        parse_quantity(&result, "gas estimate")
    }

    async fn get_logs(&self, topic: EventTopic, from_block: u64, to_block: u64) -> Result<Vec<RpcLog>, RpcError> {
        let mut filter = json!({
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "topics": [format!("{:?}", event_topic(topic_signature(topic)))],
        });
        if let Some(emitter) = self.emitters.get(&topic) {
            filter["address"] = json!(format!("{:?}", emitter));
        }
        let result = self.rpc_call("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("Failed to parse logs: {}", e)))
    }

    async fn poll_logs(
        self,
        topic: EventTopic,
        filter: EventFilter,
        mut next_block: u64,
        sender: mpsc::Sender<ChainEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let head = match self.block_number().await {
                Ok(head) => head,
                Err(e) => {
                    log::warn!("[HttpChainRpc] Head lookup failed: {}, retrying...", e);
                    continue;
                }
            };
            if head < next_block {
                continue;
            }

            let logs = match self.get_logs(topic, next_block, head).await {
                Ok(logs) => logs,
                Err(e) => {
                    log::warn!("[HttpChainRpc] eth_getLogs failed: {}, retrying...", e);
                    continue;
                }
            };

            for entry in logs {
                match decode_log(topic, &entry) {
                    Ok(event) if filter.matches(&event) => {
                        if sender.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("[HttpChainRpc] Skipping undecodable log: {}", e),
                }
            }
            next_block = head + 1;
        }
        log::debug!("[HttpChainRpc] {:?} subscription stopped", topic);
    }
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: Address, token: Option<Address>) -> Result<U256, RpcError> {
        match token.filter(|t| *t != NATIVE_TOKEN) {
            None => {
                let params = json!([format!("{:?}", address), "latest"]);
                let result = self.rpc_call("eth_getBalance", params).await?;
                parse_quantity(&result, "balance")
            }
            Some(token) => {
                let mut data = id(BALANCE_OF).to_vec();
                data.extend_from_slice(&abi::encode(&[Token::Address(address)]));
                let result = self.eth_call(token, &data).await?;
                if result.len() < 32 {
                    return Err(RpcError::Decode(format!(
                        "balanceOf returned {} bytes",
                        result.len()
                    )));
                }
                Ok(U256::from_big_endian(&result[..32]))
            }
        }
    }

    async fn get_transaction(&self, hash: H256) -> Result<Option<ChainTransaction>, RpcError> {
        let result = self
            .rpc_call("eth_getTransactionByHash", json!([format!("{:?}", hash)]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let tx: RpcTransaction = serde_json::from_value(result)
            .map_err(|e| RpcError::Decode(format!("Failed to parse transaction: {}", e)))?;
        Ok(Some(ChainTransaction {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            nonce: tx.nonce,
            block_number: tx.block_number.map(|b| b.as_u64()),
        }))
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<ChainReceipt>, RpcError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([format!("{:?}", hash)]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: RpcReceipt = serde_json::from_value(result)
            .map_err(|e| RpcError::Decode(format!("Failed to parse receipt: {}", e)))?;
        Ok(Some(ChainReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            status: receipt.status.map(|s| s.as_u64()),
            gas_used: receipt.gas_used,
        }))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&result, "block number")?.low_u64())
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        let result = self.rpc_call("eth_gasPrice", json!([])).await?;
        parse_quantity(&result, "gas price")
    }

    async fn suggest_fee(&self, intent: &ResolvedIntent) -> Result<GasQuote, RpcError> {
        let (to, value, data) = builder::call_for(intent, self.bridge_contract);
        let estimated = self.estimate_gas(intent.from, to, &data, value).await?;
        let gas_limit = estimated + estimated * GAS_LIMIT_BUFFER_PCT / 100;

        let gas_price = self.gas_price().await?;

        log::debug!(
            "[HttpChainRpc] Gas estimate: limit={} (estimated {}), price={}",
            gas_limit,
            estimated,
            gas_price
        );
        Ok(GasQuote { gas_limit, gas_price })
    }

    async fn convert_fee(&self, fee_token: Address, native_amount: U256) -> Result<Option<U256>, RpcError> {
        Ok(self
            .tokens
            .fee_rate(&fee_token)
            .map(|rate| convert_at_rate(native_amount, rate)))
    }

    async fn get_nonce(&self, address: Address) -> Result<U256, RpcError> {
        let params = json!([format!("{:?}", address), "pending"]);
        let result = self.rpc_call("eth_getTransactionCount", params).await?;
        parse_quantity(&result, "nonce")
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<H256, RpcError> {
        let params = json!([format!("0x{}", hex::encode(transaction.raw()))]);
        let result = self.rpc_call("eth_sendRawTransaction", params).await?;
        let hash: H256 = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("Invalid sendRawTransaction response".to_string()))?
            .parse()
            .map_err(|e| RpcError::Decode(format!("Failed to parse tx hash: {}", e)))?;

        if hash != transaction.hash() {
            log::warn!(
                "[HttpChainRpc] Node returned {:?}, expected {:?}",
                hash,
                transaction.hash()
            );
        }
        Ok(hash)
    }

    async fn subscribe(&self, topic: EventTopic, filter: EventFilter) -> Result<Subscription<ChainEvent>, RpcError> {
        let start = match filter.from_block {
            Some(block) => block,
            None => self.block_number().await? + 1,
        };

        let cancel = CancellationToken::new();
        let (sender, subscription) =
            Subscription::channel(format!("{:?}@{}", topic, start), cancel.clone());

        log::debug!("[HttpChainRpc] Subscribing to {:?} from block {}", topic, start);
        tokio::spawn(self.clone().poll_logs(topic, filter, start, sender, cancel));
        Ok(subscription)
    }
}

/// Wallet registry backed by the wallet factory contract
pub struct ContractWalletRegistry {
    rpc: HttpChainRpc,
    factory: Address,
}

impl ContractWalletRegistry {
    pub fn new(rpc: HttpChainRpc, factory: Address) -> Self {
        Self { rpc, factory }
    }
}

#[async_trait]
impl WalletRegistry for ContractWalletRegistry {
    async fn get_wallet_info(&self, address: Address) -> Result<Option<WalletInfo>, RpcError> {
        let mut data = id(GET_WALLET_INFO).to_vec();
        data.extend_from_slice(&abi::encode(&[Token::Address(address)]));
        let result = self.rpc.eth_call(self.factory, &data).await?;
        decode_wallet_info(address, &result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::address;

    fn log(topic: EventTopic, topics: Vec<H256>, data: Vec<Token>) -> RpcLog {
        let mut all = vec![event_topic(topic_signature(topic))];
        all.extend(topics);
        RpcLog {
            address: address(0xb1),
            topics: all,
            data: Bytes::from(abi::encode(&data)),
            block_number: Some(U64::from(7)),
            transaction_hash: Some(H256::repeat_byte(0xee)),
        }
    }

    fn padded(a: Address) -> H256 {
        H256::from(a)
    }

    #[test]
    fn test_decode_deposit_log() {
        let entry = log(
            EventTopic::DepositsFinalized,
            vec![H256::repeat_byte(1), padded(address(2))],
            vec![Token::Address(address(9)), Token::Uint(U256::from(500u64))],
        );
        let event = decode_log(EventTopic::DepositsFinalized, &entry).unwrap();
        assert_eq!(
            event,
            ChainEvent::DepositFinalized(DepositFinalized {
                tx_hash: H256::repeat_byte(0xee),
                source_tx_hash: H256::repeat_byte(1),
                beneficiary: address(2),
                token: address(9),
                amount: U256::from(500u64),
            })
        );
    }

    #[test]
    fn test_decode_payment_log() {
        let entry = log(
            EventTopic::Payments,
            vec![padded(address(1)), padded(address(2))],
            vec![
                Token::Address(address(9)),
                Token::Uint(U256::from(5u64)),
                Token::Address(address(1)),
            ],
        );
        let ChainEvent::Payment(payment) = decode_log(EventTopic::Payments, &entry).unwrap() else {
            panic!("expected payment");
        };
        assert_eq!(payment.from, address(1));
        assert_eq!(payment.to, address(2));
        assert_eq!(payment.fee_payer, address(1));
    }

    #[test]
    fn test_decode_rejects_wrong_topic() {
        let entry = log(
            EventTopic::DepositsFinalized,
            vec![H256::repeat_byte(1), padded(address(2))],
            vec![Token::Address(address(9)), Token::Uint(U256::one())],
        );
        assert!(decode_log(EventTopic::WithdrawalsFinalized, &entry).is_err());
    }

    #[test]
    fn test_decode_wallet_info() {
        let data = abi::encode(&[
            Token::Bool(true),
            Token::Uint(U256::from(1u8)),
            Token::Address(address(3)),
            Token::Bool(false),
            Token::Uint(U256::from(1_000u64)),
            Token::Array(vec![Token::Address(address(4))]),
        ]);
        let info = decode_wallet_info(address(1), &data).unwrap().unwrap();
        assert_eq!(info.wallet_type, WalletType::Merchant);
        assert_eq!(info.owner, address(3));
        assert_eq!(info.operators, vec![address(4)]);
    }

    #[test]
    fn test_decode_wallet_info_unregistered_and_bad_tag() {
        let encode = |registered: bool, tag: u64| {
            abi::encode(&[
                Token::Bool(registered),
                Token::Uint(U256::from(tag)),
                Token::Address(address(3)),
                Token::Bool(false),
                Token::Uint(U256::zero()),
                Token::Array(vec![]),
            ])
        };
        assert_eq!(decode_wallet_info(address(1), &encode(false, 0)).unwrap(), None);
        assert!(matches!(
            decode_wallet_info(address(1), &encode(true, 7)),
            Err(RpcError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x1a"), "x").unwrap(), U256::from(26u64));
        assert!(parse_quantity(&json!(26), "x").is_err());
        assert!(parse_quantity(&json!("0xzz"), "x").is_err());
    }

    #[test]
    fn test_event_topics_are_distinct() {
        let topics = [
            event_topic(PAYMENT_SENT_EVENT),
            event_topic(DEPOSIT_FINALIZED_EVENT),
            event_topic(WITHDRAWAL_FINALIZED_EVENT),
        ];
        assert_ne!(topics[0], topics[1]);
        assert_ne!(topics[1], topics[2]);
    }

    #[tokio::test]
    async fn test_convert_fee_uses_token_table() {
        let rpc = HttpChainRpc::new("http://localhost:8545", 1, Duration::from_secs(1)).unwrap();
        let native = U256::exp10(18);
        assert_eq!(rpc.convert_fee(NATIVE_TOKEN, native).await.unwrap(), Some(native));
        assert_eq!(rpc.convert_fee(address(9), native).await.unwrap(), None);
    }
}
