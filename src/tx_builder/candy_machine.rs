//! Builder for candy machine v2 mint transactions

use async_trait::async_trait;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::debug;

use super::instructions::{
    plan_mint_instruction, plan_set_collection_instruction, plan_setup_instructions,
    MINT_ACCOUNT_LEN,
};
use super::{MintRequest, MintTransaction, MintTransactionBuilder};
use crate::chain::addresses::metadata_address;
use crate::chain::ChainClient;
use crate::errors::{ChainError, ChainResult};
use crate::types::SaleStateSnapshot;

/// Builds mint transactions against a live cluster
///
/// Fetches a fresh blockhash and the mint account rent for every build.
pub struct CandyMachineTxBuilder {
    chain: Arc<dyn ChainClient>,
}

impl CandyMachineTxBuilder {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    async fn setup_instructions(&self, payer: &Pubkey, mint: &Pubkey) -> ChainResult<Vec<Instruction>> {
        let rent = self
            .chain
            .rent_exempt_minimum(MINT_ACCOUNT_LEN as usize)
            .await?;
        plan_setup_instructions(payer, mint, rent)
    }

    /// Attach the blockhash and the mint keypair's signature
    async fn finish(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        mint: Option<&Keypair>,
    ) -> ChainResult<Transaction> {
        let blockhash = self.chain.latest_blockhash().await?;
        let mut tx = Transaction::new_with_payer(instructions, Some(payer));
        tx.message.recent_blockhash = blockhash;

        if let Some(mint) = mint {
            tx.try_partial_sign(&[mint], blockhash)
                .map_err(|e| ChainError::Signing(format!("mint keypair: {e}")))?;
        }

        Ok(tx)
    }
}

impl std::fmt::Debug for CandyMachineTxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandyMachineTxBuilder")
            .field("endpoint", &self.chain.endpoint())
            .finish()
    }
}

#[async_trait]
impl MintTransactionBuilder for CandyMachineTxBuilder {
    async fn build_setup(
        &self,
        _sale: &SaleStateSnapshot,
        payer: &Pubkey,
        mint: &Keypair,
    ) -> ChainResult<Transaction> {
        let instructions = self.setup_instructions(payer, &mint.pubkey()).await?;
        self.finish(&instructions, payer, Some(mint)).await
    }

    async fn build_mint(&self, request: MintRequest<'_>) -> ChainResult<MintTransaction> {
        let mint = request.mint.pubkey();
        let config = &request.sale.config;

        let mut instructions = match request.setup {
            Some(_) => Vec::new(),
            None => self.setup_instructions(&request.payer, &mint).await?,
        };
        let needs_mint_signature = request.setup.is_none();

        instructions.push(plan_mint_instruction(
            config,
            &request.payer,
            &mint,
            request.gateway_token.as_ref(),
        )?);

        if config.has_collection_authority() {
            if let Some(collection_mint) = config.collection_mint {
                instructions.push(plan_set_collection_instruction(
                    config,
                    &request.payer,
                    &mint,
                    &collection_mint,
                ));
            }
        }

        debug!(
            %mint,
            instructions = instructions.len(),
            with_setup = needs_mint_signature,
            "Mint transaction planned"
        );

        let transaction = self
            .finish(
                &instructions,
                &request.payer,
                needs_mint_signature.then_some(request.mint),
            )
            .await?;

        Ok(MintTransaction {
            transaction,
            metadata: metadata_address(&mint),
        })
    }
}
