use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers_core::types::Address;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_signers::LocalWallet;
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;

/// Signing abstraction used by the chain client.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address transactions are sent from.
    fn address(&self) -> Address;

    /// Sign a `TypedTransaction` and return the signed raw tx bytes.
    async fn sign_typed_transaction(&self, tx: &TypedTransaction) -> Result<Vec<u8>>;
}

/// Signer backed by a private key held in memory for the duration of one run.
pub struct LocalKeySigner {
    wallet: LocalWallet,
}

impl LocalKeySigner {
    /// Accepts the key with or without a `0x` prefix.
    pub fn from_secret(secret: &SecretString) -> Result<Self> {
        let key = secret.expose_secret();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let wallet = LocalWallet::from_str(key).context("invalid private key")?;
        Ok(Self { wallet })
    }
}

#[async_trait]
impl Signer for LocalKeySigner {
    fn address(&self) -> Address {
        ethers_signers::Signer::address(&self.wallet)
    }

    async fn sign_typed_transaction(&self, tx: &TypedTransaction) -> Result<Vec<u8>> {
        use ethers_signers::Signer;

        let sig = self.wallet.sign_transaction(tx).await.context("failed to sign tx")?;
        let raw = tx.rlp_signed(&sig);
        Ok(raw.to_vec())
    }
}
