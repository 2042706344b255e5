//! [`ChainClient`] backed by the nonblocking Solana RPC client

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    sysvar, transaction::Transaction,
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::addresses::{associated_token_address, collection_pda, CANDY_MACHINE_PROGRAM_ID};
use super::layout::{
    decode_clock_timestamp, decode_collection_pda, decode_mint_decimals, CandyMachineAccount,
    DEFAULT_TOKEN_DECIMALS,
};
use super::{ChainClient, SignatureStatus};
use crate::errors::{ChainError, ChainResult};
use crate::types::ConsistencyLevel;

pub struct RpcChainClient {
    client: RpcClient,
    endpoint: String,
    /// Used when a token-priced sale points at a mint account that cannot be read
    fallback_token_decimals: u8,
}

impl RpcChainClient {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                url.to_string(),
                timeout,
                CommitmentConfig::confirmed(),
            ),
            endpoint: url.to_string(),
            fallback_token_decimals: DEFAULT_TOKEN_DECIMALS,
        }
    }

    pub fn with_fallback_token_decimals(mut self, decimals: u8) -> Self {
        self.fallback_token_decimals = decimals;
        self
    }

    async fn get_account_data(
        &self,
        address: &Pubkey,
        level: ConsistencyLevel,
    ) -> ChainResult<Option<(Pubkey, Vec<u8>)>> {
        let account = self
            .client
            .get_account_with_commitment(address, level.commitment())
            .await
            .map_err(|e| ChainError::from_read_error(&e, &address.to_string()))?
            .value;

        Ok(account.map(|a| (a.owner, a.data)))
    }
}

fn payment_decimals(mint_data: Option<&[u8]>, fallback: u8) -> ChainResult<u8> {
    match mint_data {
        Some(data) => decode_mint_decimals(data),
        None => Ok(fallback),
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_sale(
        &self,
        address: &Pubkey,
        level: ConsistencyLevel,
    ) -> ChainResult<CandyMachineAccount> {
        let (owner, data) =
            self.get_account_data(address, level)
                .await?
                .ok_or_else(|| ChainError::AccountNotFound {
                    address: address.to_string(),
                })?;

        if owner != CANDY_MACHINE_PROGRAM_ID {
            return Err(ChainError::Decode(format!(
                "{address} is owned by {owner}, not the candy machine program"
            )));
        }

        let mut account = CandyMachineAccount::decode(*address, &data)?;

        if let Some(token_mint) = account.token_mint {
            let mint = self.get_account_data(&token_mint, level).await?;
            if mint.is_none() {
                warn!(
                    %token_mint,
                    decimals = self.fallback_token_decimals,
                    "Payment mint missing, using configured decimals"
                );
            }
            account.token_decimals = payment_decimals(
                mint.as_ref().map(|(_, data)| data.as_slice()),
                self.fallback_token_decimals,
            )?;
        }

        debug!(
            items_available = account.items_available,
            items_redeemed = account.items_redeemed,
            "Sale account fetched"
        );

        Ok(account)
    }

    async fn fetch_collection_mint(
        &self,
        sale: &Pubkey,
        level: ConsistencyLevel,
    ) -> ChainResult<Option<Pubkey>> {
        match self.get_account_data(&collection_pda(sale), level).await? {
            Some((_, data)) => decode_collection_pda(&data).map(Some),
            None => Ok(None),
        }
    }

    async fn account_exists(&self, address: &Pubkey, level: ConsistencyLevel) -> ChainResult<bool> {
        Ok(self.get_account_data(address, level).await?.is_some())
    }

    async fn token_balance(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
        level: ConsistencyLevel,
    ) -> ChainResult<u64> {
        let token_account = associated_token_address(owner, mint);

        match self
            .client
            .get_token_account_balance_with_commitment(&token_account, level.commitment())
            .await
        {
            Ok(response) => response
                .value
                .amount
                .parse::<u64>()
                .map_err(|e| ChainError::Decode(format!("token amount: {e}"))),
            Err(e) => {
                let err = ChainError::from_read_error(&e, &token_account.to_string());
                if err.is_account_not_found() {
                    debug!(%token_account, "No whitelist token account");
                    Ok(0)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn native_balance(&self, owner: &Pubkey, level: ConsistencyLevel) -> ChainResult<u64> {
        self.client
            .get_balance_with_commitment(owner, level.commitment())
            .await
            .map(|r| r.value)
            .map_err(|e| ChainError::from_read_error(&e, &owner.to_string()))
    }

    async fn unix_timestamp(&self) -> ChainResult<i64> {
        let (_, data) = self
            .get_account_data(&sysvar::clock::id(), ConsistencyLevel::Confirmed)
            .await?
            .ok_or_else(|| ChainError::AccountNotFound {
                address: sysvar::clock::id().to_string(),
            })?;

        decode_clock_timestamp(&data)
    }

    async fn latest_blockhash(&self) -> ChainResult<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| ChainError::from_client_error(&e))
    }

    async fn rent_exempt_minimum(&self, data_len: usize) -> ChainResult<u64> {
        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(|e| ChainError::from_client_error(&e))
    }

    #[instrument(skip(self, transaction), fields(endpoint = %self.endpoint))]
    async fn submit_transaction(&self, transaction: &Transaction) -> ChainResult<Signature> {
        self.client
            .send_transaction(transaction)
            .await
            .map_err(|e| ChainError::from_client_error(&e))
    }

    async fn signature_status(&self, signature: &Signature) -> ChainResult<Option<SignatureStatus>> {
        let statuses = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| ChainError::from_client_error(&e))?
            .value;

        Ok(statuses.into_iter().next().flatten().map(|status| {
            let level = match status.confirmation_status {
                Some(TransactionConfirmationStatus::Processed) => ConsistencyLevel::Processed,
                Some(TransactionConfirmationStatus::Confirmed) => ConsistencyLevel::Confirmed,
                Some(TransactionConfirmationStatus::Finalized) => ConsistencyLevel::Finalized,
                // Older nodes: rooted transactions report no confirmation count
                None if status.confirmations.is_none() => ConsistencyLevel::Finalized,
                None => ConsistencyLevel::Processed,
            };
            SignatureStatus {
                level,
                err: status.err,
            }
        }))
    }
}
