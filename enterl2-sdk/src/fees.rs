//! Fee estimation and fee-payer resolution
//!
//! Consumer wallets never pay network fees. The payer is decided by
//! [`resolve_fee_payer`]; the cost comes from the chain's fee suggestion,
//! converted into the configured fee token.

use ethers::types::{Address, U256};
use std::sync::Arc;

use crate::chain::ChainRpc;
use crate::error::FeeError;
use crate::types::{FeeEstimate, ResolvedIntent, TransactionKind, WalletInfo, WalletType, NATIVE_TOKEN};

pub const CONSUMER_RECEIVE_VIOLATION: &str = "consumer wallets may only receive from merchants";

/// Consumer recipients accept payments from merchants only.
///
/// Applies to payments; bridge legs move funds between one owner's accounts.
pub fn check_receive_policy(
    kind: TransactionKind,
    sender: Option<WalletType>,
    recipient: Option<WalletType>,
) -> Result<(), String> {
    if kind != TransactionKind::Payment {
        return Ok(());
    }
    match (recipient, sender) {
        (Some(WalletType::Consumer), Some(WalletType::Merchant)) => Ok(()),
        (Some(WalletType::Consumer), Some(WalletType::Consumer) | None) => {
            Err(CONSUMER_RECEIVE_VIOLATION.to_string())
        }
        (Some(WalletType::Merchant) | None, _) => Ok(()),
    }
}

/// Decide who settles the fee.
///
/// Consumer senders delegate to, in order: the fee payer named in the intent,
/// a merchant recipient, the configured default. Everyone else pays their own.
pub fn resolve_fee_payer(
    intent: &ResolvedIntent,
    sender: Option<&WalletInfo>,
    recipient: Option<&WalletInfo>,
    default_fee_payer: Option<Address>,
) -> Result<Address, FeeError> {
    let sender_type = sender.map(|w| w.wallet_type);
    let recipient_type = recipient.map(|w| w.wallet_type);

    check_receive_policy(intent.kind, sender_type, recipient_type)
        .map_err(FeeError::PolicyViolation)?;

    match sender_type {
        Some(WalletType::Consumer) => {
            let merchant_recipient = match recipient {
                Some(info) if info.wallet_type == WalletType::Merchant => Some(info.address),
                _ => None,
            };
            let payer = intent
                .fee_payer
                .or(merchant_recipient)
                .or(default_fee_payer)
                .ok_or_else(|| {
                    FeeError::PolicyViolation(
                        "consumer sender has no merchant fee payer".to_string(),
                    )
                })?;
            if payer == intent.from {
                return Err(FeeError::PolicyViolation(
                    "consumer wallets never pay their own fees".to_string(),
                ));
            }
            Ok(payer)
        }
        Some(WalletType::Merchant) | None => Ok(intent.from),
    }
}

pub struct FeeEstimator {
    chain: Arc<dyn ChainRpc>,
    fee_token: Address,
    default_fee_payer: Option<Address>,
}

impl FeeEstimator {
    pub fn new(chain: Arc<dyn ChainRpc>) -> Self {
        Self {
            chain,
            fee_token: NATIVE_TOKEN,
            default_fee_payer: None,
        }
    }

    /// Quote fees in `token` instead of the native gas asset
    pub fn with_fee_token(mut self, token: Address) -> Self {
        self.fee_token = token;
        self
    }

    pub fn with_default_fee_payer(mut self, payer: Option<Address>) -> Self {
        self.default_fee_payer = payer;
        self
    }

    pub async fn estimate(
        &self,
        intent: &ResolvedIntent,
        sender: Option<&WalletInfo>,
        recipient: Option<&WalletInfo>,
    ) -> Result<FeeEstimate, FeeError> {
        let fee_payer = resolve_fee_payer(intent, sender, recipient, self.default_fee_payer)?;

        let quote = self.chain.suggest_fee(intent).await.map_err(|e| {
            log::warn!("[FeeEstimator] Fee quote failed: {}", e);
            FeeError::QuoteUnavailable(e)
        })?;

        let native_fee = quote.gas_limit.saturating_mul(quote.gas_price);
        let total_fee = if self.fee_token == NATIVE_TOKEN {
            native_fee
        } else {
            self.chain
                .convert_fee(self.fee_token, native_fee)
                .await
                .map_err(FeeError::QuoteUnavailable)?
                .ok_or(FeeError::UnsupportedFeeToken(self.fee_token))?
        };

        log::debug!(
            "[FeeEstimator] gas_limit={} gas_price={} total_fee={} payer={:?} token={:?}",
            quote.gas_limit,
            quote.gas_price,
            total_fee,
            fee_payer,
            self.fee_token
        );

        Ok(FeeEstimate {
            gas_limit: quote.gas_limit,
            gas_price: quote.gas_price,
            total_fee,
            fee_payer,
            fee_token: self.fee_token,
        })
    }
}

/// Native amount expressed in a fee token, given the token's price as
/// base units per 10^18 native units. Rounds up so the payer never underpays.
pub fn convert_at_rate(native_amount: U256, units_per_native: U256) -> U256 {
    let one = U256::exp10(18);
    let scaled = native_amount.saturating_mul(units_per_native);
    let (quotient, remainder) = scaled.div_mod(one);
    if remainder.is_zero() {
        quotient
    } else {
        quotient + 1
    }
}
