//! Pre-submission payment validation
//!
//! Advisory only: the chain stays the authority, so a transaction that passes
//! here can still revert (for example when a balance changes in between).

use ethers::types::Address;
use std::sync::Arc;

use crate::chain::{ChainRpc, WalletRegistry};
use crate::error::ValidationError;
use crate::fees::check_receive_policy;
use crate::types::{ResolvedIntent, TransactionIntent, TransactionKind, WalletInfo};

/// A validated intent plus the wallet metadata read while validating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIntent {
    pub intent: ResolvedIntent,
    pub sender: Option<WalletInfo>,
    pub recipient: Option<WalletInfo>,
}

pub struct PaymentValidator {
    chain: Arc<dyn ChainRpc>,
    registry: Arc<dyn WalletRegistry>,
}

impl PaymentValidator {
    pub fn new(chain: Arc<dyn ChainRpc>, registry: Arc<dyn WalletRegistry>) -> Self {
        Self { chain, registry }
    }

    /// Run every check, stopping at the first failure:
    /// addresses, amount, token, wallet policy, then balance.
    pub async fn validate(
        &self,
        intent: &TransactionIntent,
        signer: Address,
    ) -> Result<ValidatedIntent, ValidationError> {
        let resolved = intent.resolve()?;

        let (sender, recipient) = self.wallets(&resolved).await?;

        check_receive_policy(
            resolved.kind,
            sender.as_ref().map(|w| w.wallet_type),
            recipient.as_ref().map(|w| w.wallet_type),
        )
        .map_err(ValidationError::PolicyViolation)?;

        if !may_spend(&resolved, sender.as_ref(), signer) {
            return Err(ValidationError::PolicyViolation(format!(
                "{:?} may not spend from {:?}",
                signer, resolved.from
            )));
        }

        // fees are excluded; they go to the resolved fee payer
        let available = self
            .chain
            .get_balance(resolved.from, resolved.token)
            .await
            .map_err(ValidationError::BalanceUnavailable)?;
        if available < resolved.amount {
            return Err(ValidationError::InsufficientBalance {
                required: resolved.amount,
                available,
            });
        }

        Ok(ValidatedIntent {
            intent: resolved,
            sender,
            recipient,
        })
    }

    /// Registry metadata for sender and recipient
    pub async fn wallets(
        &self,
        intent: &ResolvedIntent,
    ) -> Result<(Option<WalletInfo>, Option<WalletInfo>), ValidationError> {
        match intent.kind {
            // deposits originate on the L1 where there are no smart wallets
            TransactionKind::Deposit => Ok((None, None)),
            TransactionKind::Payment | TransactionKind::Withdrawal => Ok((
                self.wallet_info(intent.from).await?,
                self.wallet_info(intent.to).await?,
            )),
        }
    }

    async fn wallet_info(&self, address: Address) -> Result<Option<WalletInfo>, ValidationError> {
        self.registry
            .get_wallet_info(address)
            .await
            .map_err(ValidationError::WalletLookupFailed)
    }
}

/// The signer is the debited account itself, or the owner / an operator of
/// the debited smart wallet.
fn may_spend(intent: &ResolvedIntent, sender: Option<&WalletInfo>, signer: Address) -> bool {
    if intent.from == signer {
        return true;
    }
    match sender {
        Some(info) => info.owner == signer || info.operators.contains(&signer),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::test_support::{address, consumer, hex_address, merchant, MockChain, MockRegistry};
    use ethers::types::U256;

    const USDC: u8 = 9;

    fn setup() -> (Arc<MockChain>, Arc<MockRegistry>, PaymentValidator) {
        let chain = Arc::new(MockChain::new());
        let registry = Arc::new(MockRegistry::new());
        let validator = PaymentValidator::new(chain.clone(), registry.clone());
        (chain, registry, validator)
    }

    fn usdc_payment(from: Address, to: Address, amount: &str) -> TransactionIntent {
        TransactionIntent::payment(hex_address(from), hex_address(to), amount)
            .with_token(hex_address(address(USDC)))
    }

    #[tokio::test]
    async fn test_merchant_pays_consumer() {
        let (chain, registry, validator) = setup();
        let (m, c) = (merchant(1), consumer(2));
        registry.insert(m.clone());
        registry.insert(c.clone());
        chain.set_balance(m.address, Some(address(USDC)), U256::from(10_000_000u64));

        let validated = validator
            .validate(&usdc_payment(m.address, c.address, "5000000"), m.address)
            .await
            .unwrap();
        assert_eq!(validated.intent.amount, U256::from(5_000_000u64));
        assert_eq!(validated.sender, Some(m));
        assert_eq!(validated.recipient, Some(c));
    }

    #[tokio::test]
    async fn test_consumer_to_consumer_policy() {
        let (chain, registry, validator) = setup();
        let (a, b) = (consumer(1), consumer(2));
        registry.insert(a.clone());
        registry.insert(b.clone());
        chain.set_balance(a.address, Some(address(USDC)), U256::from(10_000_000u64));

        let err = validator
            .validate(&usdc_payment(a.address, b.address, "1"), a.address)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn test_insufficient_balance_ignores_fees() {
        let (chain, _registry, validator) = setup();
        chain.set_balance(address(1), Some(address(USDC)), U256::from(5_000_000u64));

        // exactly the amount is enough
        assert!(validator
            .validate(&usdc_payment(address(1), address(2), "5000000"), address(1))
            .await
            .is_ok());

        let err = validator
            .validate(&usdc_payment(address(1), address(2), "5000001"), address(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientBalance {
                required: U256::from(5_000_001u64),
                available: U256::from(5_000_000u64),
            }
        );
    }

    #[tokio::test]
    async fn test_syntax_errors_skip_io() {
        let (chain, _registry, validator) = setup();
        let intent = TransactionIntent::payment("0xabc", hex_address(address(2)), "1");
        assert!(matches!(
            validator.validate(&intent, address(1)).await,
            Err(ValidationError::InvalidAddress(_))
        ));
        assert_eq!(chain.balance_calls(), 0);
    }

    #[tokio::test]
    async fn test_operator_may_spend_from_wallet() {
        let (chain, registry, validator) = setup();
        let mut m = merchant(1);
        m.operators = vec![address(4)];
        registry.insert(m.clone());
        chain.set_balance(m.address, Some(address(USDC)), U256::from(10u64));

        let intent = usdc_payment(m.address, address(2), "10");
        assert!(validator.validate(&intent, address(4)).await.is_ok());
        assert!(matches!(
            validator.validate(&intent, address(5)).await,
            Err(ValidationError::PolicyViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_read_failure_surfaces() {
        let (chain, _registry, validator) = setup();
        chain.fail_balance_reads(true);
        let err = validator
            .validate(&usdc_payment(address(1), address(2), "1"), address(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::BalanceUnavailable(RpcError::Network(_))));
    }
}
