//! Local private-key signer
//!
//! Signs the canonical signing hash with an in-process ethers `LocalWallet`.

use async_trait::async_trait;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;

use crate::builder::{SignedTransaction, UnsignedTransaction};
use crate::chain::TransactionSigner;
use crate::config::env_vars;

pub struct LocalKeySigner {
    wallet: LocalWallet,
}

impl LocalKeySigner {
    /// Requires ENTERL2_PRIVATE_KEY
    pub fn from_env() -> Result<Self, String> {
        let private_key = std::env::var(env_vars::PRIVATE_KEY)
            .map_err(|_| format!("{} not set", env_vars::PRIVATE_KEY))?;

        Self::from_private_key(&private_key)
    }

    /// Create from a hex private key, with or without 0x
    pub fn from_private_key(private_key: &str) -> Result<Self, String> {
        let key_hex = private_key.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let key_bytes =
            hex::decode(key_hex).map_err(|e| format!("Invalid private key hex: {}", e))?;
        if key_bytes.len() != 32 {
            return Err(format!(
                "Invalid private key: expected 32 bytes, got {}",
                key_bytes.len()
            ));
        }

        let signing_key = SigningKey::from_bytes(key_bytes.as_slice().into())
            .map_err(|e| format!("Invalid private key: {}", e))?;

        let wallet = LocalWallet::from(signing_key);
        log::info!("[Signer] Loaded local key for {:?}", wallet.address());

        Ok(Self { wallet })
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign(&self, transaction: &UnsignedTransaction) -> Result<SignedTransaction, String> {
        let digest = transaction.signing_hash();
        let signature = self
            .wallet
            .sign_hash(digest)
            .map_err(|e| format!("Failed to sign transaction: {}", e))?;

        Ok(SignedTransaction::new(transaction.clone(), signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_unsigned, TEST_KEY, TEST_KEY_ADDRESS};

    #[test]
    fn test_from_private_key() {
        let signer = LocalKeySigner::from_private_key(TEST_KEY).unwrap();
        assert_eq!(signer.address(), TEST_KEY_ADDRESS.parse::<Address>().unwrap());

        let without_prefix = LocalKeySigner::from_private_key(&TEST_KEY[2..]).unwrap();
        assert_eq!(signer.address(), without_prefix.address());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(LocalKeySigner::from_private_key("0xnothex").is_err());
        assert!(LocalKeySigner::from_private_key("0xabcd").is_err());
    }

    #[tokio::test]
    async fn test_signature_recovers_to_signer() {
        let signer = LocalKeySigner::from_private_key(TEST_KEY).unwrap();
        let signed = signer.sign(&sample_unsigned()).await.unwrap();

        assert_eq!(signed.recover_signer().unwrap(), signer.address());
        // deterministic (RFC 6979)
        let again = signer.sign(&sample_unsigned()).await.unwrap();
        assert_eq!(signed.raw(), again.raw());
        assert_eq!(signed.hash(), again.hash());
    }
}
