//! Wallet abstraction for signing mint transactions
//!
//! The orchestrator only needs a public key and the ability to sign. A wallet
//! that lacks either disables minting (see [`crate::orchestrator::Readiness`]).

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::sync::Arc;

use crate::errors::{ChainError, ChainResult};

/// Signing capability of the connected wallet
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// `None` while no wallet is connected
    fn pubkey(&self) -> Option<Pubkey>;

    /// Whether single and batch signing are both available
    fn can_sign(&self) -> bool {
        self.pubkey().is_some()
    }

    /// Add the wallet's signature; other required signatures may already be present
    async fn sign_transaction(&self, transaction: &mut Transaction) -> ChainResult<()>;

    async fn sign_transactions(&self, transactions: &mut [Transaction]) -> ChainResult<()> {
        for tx in transactions.iter_mut() {
            self.sign_transaction(tx).await?;
        }
        Ok(())
    }
}

/// Wallet backed by a local keypair file
#[derive(Clone)]
pub struct KeypairWallet {
    keypair: Arc<Keypair>,
}

impl KeypairWallet {
    /// Load from a keypair file (JSON array or raw 64 bytes)
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path))?;

        let secret: Vec<u8> = if keypair_bytes.len() == 64 {
            keypair_bytes
        } else {
            serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?
        };

        if secret.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", secret.len());
        }
        if secret.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }

        let keypair = Keypair::try_from(secret.as_slice()).context("Invalid keypair bytes")?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }
}

impl std::fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("pubkey", &self.keypair.pubkey())
            .finish()
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn pubkey(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn sign_transaction(&self, transaction: &mut Transaction) -> ChainResult<()> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| ChainError::Signing(e.to_string()))
    }
}
