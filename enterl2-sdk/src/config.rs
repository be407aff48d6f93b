use ethers::types::{Address, U256};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

use crate::error::{SdkError, ValidationError};
use crate::types::NATIVE_TOKEN;
use crate::units;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const NETWORK: &str = "ENTERL2_NETWORK";
    pub const L2_RPC_URL: &str = "ENTERL2_L2_RPC_URL";
    pub const L1_RPC_URL: &str = "ENTERL2_L1_RPC_URL";
    pub const API_URL: &str = "ENTERL2_API_URL";
    pub const WS_URL: &str = "ENTERL2_WS_URL";
    pub const CHAIN_ID: &str = "ENTERL2_CHAIN_ID";
    pub const L1_CHAIN_ID: &str = "ENTERL2_L1_CHAIN_ID";
    pub const TIMEOUT_SECS: &str = "ENTERL2_TIMEOUT_SECS";
    pub const POLL_INTERVAL_SECS: &str = "ENTERL2_POLL_INTERVAL_SECS";
    pub const REQUIRED_CONFIRMATIONS: &str = "ENTERL2_REQUIRED_CONFIRMATIONS";
    pub const BRIDGE_TIMEOUT_SECS: &str = "ENTERL2_BRIDGE_TIMEOUT_SECS";
    pub const PRIVATE_KEY: &str = "ENTERL2_PRIVATE_KEY";
    pub const FEE_TOKEN: &str = "ENTERL2_FEE_TOKEN";
    pub const FEE_PAYER: &str = "ENTERL2_FEE_PAYER";
    pub const TOKENS_FILE: &str = "ENTERL2_TOKENS_FILE";
    // Contract addresses
    pub const STATE_MANAGER_ADDRESS: &str = "ENTERL2_STATE_MANAGER_ADDRESS";
    pub const BRIDGE_ADDRESS: &str = "ENTERL2_BRIDGE_ADDRESS";
    pub const L1_BRIDGE_ADDRESS: &str = "ENTERL2_L1_BRIDGE_ADDRESS";
    pub const WALLET_FACTORY_ADDRESS: &str = "ENTERL2_WALLET_FACTORY_ADDRESS";
    pub const NAME_REGISTRY_ADDRESS: &str = "ENTERL2_NAME_REGISTRY_ADDRESS";
    pub const PHONE_RESOLVER_ADDRESS: &str = "ENTERL2_PHONE_RESOLVER_ADDRESS";
    pub const STAKING_POOL_ADDRESS: &str = "ENTERL2_STAKING_POOL_ADDRESS";
    pub const USDC_ADDRESS: &str = "ENTERL2_USDC_ADDRESS";
    pub const USDT_ADDRESS: &str = "ENTERL2_USDT_ADDRESS";
}

/// Default values
pub mod defaults {
    pub const L2_RPC_URL: &str = "http://localhost:8545";
    pub const CHAIN_ID: u64 = 31337;
    pub const L1_CHAIN_ID: u64 = 1;
    pub const TIMEOUT_SECS: u64 = 30;
    pub const POLL_INTERVAL_SECS: u64 = 2;
    pub const REQUIRED_CONFIRMATIONS: u64 = 1;
    /// Cross-chain relays are slow; much longer than a single confirmation wait
    pub const BRIDGE_TIMEOUT_SECS: u64 = 30 * 60;
    pub const TOKENS_FILE: &str = "config/tokens.ron";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Local,
}

/// Deployed contract addresses. Unset entries are the zero address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContractAddresses {
    pub state_manager: Address,
    /// L2 side of the bridge (withdrawals start here)
    pub bridge: Address,
    /// L1 side of the bridge (deposits start here)
    pub l1_bridge: Address,
    pub wallet_factory: Address,
    pub name_registry: Address,
    pub phone_resolver: Address,
    pub staking_pool: Address,
    pub usdc: Address,
    pub usdt: Address,
}

// ---------------------------------------------------------------------------
// Token table
// ---------------------------------------------------------------------------

/// Token entry as stored in the RON file
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    /// Fee-token price: base units per 10^18 native units (string to avoid
    /// precision issues). Tokens without a rate are not accepted for fees.
    pub fee_rate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    pub fee_rate: Option<U256>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenTable {
    tokens: HashMap<Address, TokenInfo>,
}

impl TokenTable {
    pub fn from_entries(entries: Vec<TokenEntry>) -> Result<Self, String> {
        let mut tokens = HashMap::new();
        for entry in entries {
            let address = units::parse_token(&entry.address)
                .map_err(|e| format!("{}: {}", entry.symbol, e))?;
            if entry.decimals > units::MAX_DECIMALS {
                return Err(format!(
                    "{}: {} decimals exceeds the maximum of {}",
                    entry.symbol,
                    entry.decimals,
                    units::MAX_DECIMALS
                ));
            }
            let fee_rate = match entry.fee_rate {
                Some(rate) => Some(
                    U256::from_dec_str(rate.trim())
                        .map_err(|e| format!("{}: invalid fee_rate '{}': {}", entry.symbol, rate, e))?,
                ),
                None => None,
            };
            tokens.insert(
                address,
                TokenInfo {
                    symbol: entry.symbol.to_uppercase(),
                    address,
                    decimals: entry.decimals,
                    fee_rate,
                },
            );
        }
        Ok(Self { tokens })
    }

    /// Parse a RON list of [`TokenEntry`]
    pub fn from_ron(content: &str) -> Result<Self, String> {
        let entries: Vec<TokenEntry> =
            ron::from_str(content).map_err(|e| format!("Failed to parse token table: {}", e))?;
        Self::from_entries(entries)
    }

    /// Load from a RON file, falling back to the built-in table
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("[Config] No token table at {:?}, using built-in", path);
            return Self::builtin();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_ron(&content) {
                Ok(table) => {
                    log::info!("[Config] Loaded {} tokens from {:?}", table.len(), path);
                    table
                }
                Err(e) => {
                    log::error!("[Config] {}", e);
                    Self::builtin()
                }
            },
            Err(e) => {
                log::error!("[Config] Failed to read {:?}: {}", path, e);
                Self::builtin()
            }
        }
    }

    /// Native gas asset only
    pub fn builtin() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(
            NATIVE_TOKEN,
            TokenInfo {
                symbol: "ETH".to_string(),
                address: NATIVE_TOKEN,
                decimals: 18,
                fee_rate: Some(U256::exp10(18)),
            },
        );
        Self { tokens }
    }

    /// Add built-in entries the table does not define itself
    fn extend_builtin(&mut self) {
        for info in Self::builtin().tokens.into_values() {
            self.tokens.entry(info.address).or_insert(info);
        }
    }

    pub fn insert(&mut self, info: TokenInfo) {
        self.tokens.insert(info.address, info);
    }

    pub fn get(&self, address: &Address) -> Option<&TokenInfo> {
        self.tokens.get(address)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens
            .values()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Convert a decimal amount of `token` (native when None) to base units
    /// using the token's declared decimals.
    pub fn parse_amount(&self, token: Option<&Address>, amount: &str) -> Result<U256, ValidationError> {
        let address = token.copied().unwrap_or(NATIVE_TOKEN);
        let info = self
            .tokens
            .get(&address)
            .ok_or_else(|| ValidationError::InvalidToken(units::checksum(&address)))?;
        units::parse_units(amount, info.decimals)
    }

    pub fn fee_rate(&self, address: &Address) -> Option<U256> {
        self.tokens.get(address).and_then(|t| t.fee_rate)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SDK configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub network: Network,
    pub l2_rpc_url: String,
    pub l1_rpc_url: Option<String>,
    /// Backend API serving historical records
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub chain_id: u64,
    pub l1_chain_id: u64,
    /// Per-transaction confirmation deadline
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub required_confirmations: u64,
    /// Deadline for a bridge operation's destination leg
    pub bridge_timeout: Duration,
    pub contracts: ContractAddresses,
    pub fee_token: Address,
    pub default_fee_payer: Option<Address>,
    pub tokens: TokenTable,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self::local()
    }
}

impl SdkConfig {
    /// Local development node
    pub fn local() -> Self {
        Self {
            network: Network::Local,
            l2_rpc_url: defaults::L2_RPC_URL.to_string(),
            l1_rpc_url: None,
            api_url: None,
            ws_url: None,
            chain_id: defaults::CHAIN_ID,
            l1_chain_id: defaults::L1_CHAIN_ID,
            timeout: Duration::from_secs(defaults::TIMEOUT_SECS),
            poll_interval: Duration::from_secs(defaults::POLL_INTERVAL_SECS),
            required_confirmations: defaults::REQUIRED_CONFIRMATIONS,
            bridge_timeout: Duration::from_secs(defaults::BRIDGE_TIMEOUT_SECS),
            contracts: ContractAddresses::default(),
            fee_token: NATIVE_TOKEN,
            default_fee_payer: None,
            tokens: TokenTable::builtin(),
        }
    }

    /// Load from the process environment (and `.env` if present)
    pub fn from_env() -> Result<Self, SdkError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Unset variables keep their defaults;
    /// malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SdkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::local();

        if let Some(network) = get(env_vars::NETWORK) {
            config.network = network
                .parse()
                .map_err(|_| SdkError::Config(format!("{}: unknown network '{}'", env_vars::NETWORK, network)))?;
        }
        if let Some(url) = get(env_vars::L2_RPC_URL) {
            config.l2_rpc_url = url;
        }
        config.l1_rpc_url = get(env_vars::L1_RPC_URL);
        config.api_url = get(env_vars::API_URL);
        config.ws_url = get(env_vars::WS_URL);

        if let Some(v) = get(env_vars::CHAIN_ID) {
            config.chain_id = parse_number(env_vars::CHAIN_ID, &v)?;
        }
        if let Some(v) = get(env_vars::L1_CHAIN_ID) {
            config.l1_chain_id = parse_number(env_vars::L1_CHAIN_ID, &v)?;
        }
        if let Some(v) = get(env_vars::TIMEOUT_SECS) {
            config.timeout = Duration::from_secs(parse_number(env_vars::TIMEOUT_SECS, &v)?);
        }
        if let Some(v) = get(env_vars::POLL_INTERVAL_SECS) {
            config.poll_interval = Duration::from_secs(parse_number(env_vars::POLL_INTERVAL_SECS, &v)?);
        }
        if let Some(v) = get(env_vars::REQUIRED_CONFIRMATIONS) {
            config.required_confirmations = parse_number(env_vars::REQUIRED_CONFIRMATIONS, &v)?;
        }
        if let Some(v) = get(env_vars::BRIDGE_TIMEOUT_SECS) {
            config.bridge_timeout = Duration::from_secs(parse_number(env_vars::BRIDGE_TIMEOUT_SECS, &v)?);
        }

        let address = |name: &str| -> Result<Option<Address>, SdkError> {
            get(name)
                .map(|v| units::parse_address(&v).map_err(|e| SdkError::Config(format!("{}: {}", name, e))))
                .transpose()
        };

        if let Some(token) = address(env_vars::FEE_TOKEN)? {
            config.fee_token = token;
        }
        config.default_fee_payer = address(env_vars::FEE_PAYER)?;

        let contracts = &mut config.contracts;
        for (name, slot) in [
            (env_vars::STATE_MANAGER_ADDRESS, &mut contracts.state_manager),
            (env_vars::BRIDGE_ADDRESS, &mut contracts.bridge),
            (env_vars::L1_BRIDGE_ADDRESS, &mut contracts.l1_bridge),
            (env_vars::WALLET_FACTORY_ADDRESS, &mut contracts.wallet_factory),
            (env_vars::NAME_REGISTRY_ADDRESS, &mut contracts.name_registry),
            (env_vars::PHONE_RESOLVER_ADDRESS, &mut contracts.phone_resolver),
            (env_vars::STAKING_POOL_ADDRESS, &mut contracts.staking_pool),
            (env_vars::USDC_ADDRESS, &mut contracts.usdc),
            (env_vars::USDT_ADDRESS, &mut contracts.usdt),
        ] {
            if let Some(a) = address(name)? {
                *slot = a;
            }
        }

        let tokens_file = get(env_vars::TOKENS_FILE).unwrap_or_else(|| defaults::TOKENS_FILE.to_string());
        config.tokens = TokenTable::load(Path::new(&tokens_file));
        config.tokens.extend_builtin();

        if config.fee_token != NATIVE_TOKEN && config.tokens.fee_rate(&config.fee_token).is_none() {
            return Err(SdkError::Config(format!(
                "fee token {:?} has no fee_rate in the token table",
                config.fee_token
            )));
        }

        log::debug!(
            "[Config] network={} l2={} chain_id={}",
            config.network,
            config.l2_rpc_url,
            config.chain_id
        );
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SdkError> {
    value
        .parse()
        .map_err(|_| SdkError::Config(format!("{}: expected a number, got '{}'", name, value)))
}
