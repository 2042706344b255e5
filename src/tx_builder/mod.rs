//! Transaction construction for mints
//!
//! The orchestrator never builds instructions itself. It asks a
//! [`MintTransactionBuilder`] for:
//! - **setup**: creates the token mint and the payer's token account
//! - **mint**: the program's mint instruction, prefixed with the setup
//!   instructions when no confirmed setup exists
//!
//! Builders return transactions with a recent blockhash and every signature
//! except the wallet's already attached.

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, transaction::Transaction};

use crate::errors::ChainResult;
use crate::types::{SaleStateSnapshot, SetupState};

pub mod candy_machine;
pub mod instructions;

pub use candy_machine::CandyMachineTxBuilder;

/// Everything needed to build the mint transaction
#[derive(Debug, Clone, Copy)]
pub struct MintRequest<'a> {
    pub sale: &'a SaleStateSnapshot,
    pub payer: Pubkey,
    pub mint: &'a Keypair,
    /// Confirmed setup; when present the setup instructions are omitted
    pub setup: Option<&'a SetupState>,
    /// Gateway token for gatekeeper-protected sales
    pub gateway_token: Option<Pubkey>,
}

/// Built mint transaction and the metadata account it should create
#[derive(Debug, Clone)]
pub struct MintTransaction {
    pub transaction: Transaction,
    pub metadata: Pubkey,
}

#[async_trait]
pub trait MintTransactionBuilder: Send + Sync {
    /// Account-creation transaction for a split mint
    async fn build_setup(
        &self,
        sale: &SaleStateSnapshot,
        payer: &Pubkey,
        mint: &Keypair,
    ) -> ChainResult<Transaction>;

    async fn build_mint(&self, request: MintRequest<'_>) -> ChainResult<MintTransaction>;
}
