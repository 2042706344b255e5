//! Chain access for the mint client
//!
//! [`ChainClient`] is the seam to the blockchain: account reads, balances,
//! submission and signature status. [`RpcChainClient`] implements it on top
//! of the nonblocking `solana_client` RPC client; tests use an in-memory mock.

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};

use crate::errors::{custom_program_code, ChainResult};
use crate::types::ConsistencyLevel;

pub mod addresses;
pub mod layout;
pub mod rpc;

pub use layout::CandyMachineAccount;
pub use rpc::RpcChainClient;

/// Commitment status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    /// Highest consistency level the transaction has reached
    pub level: ConsistencyLevel,
    /// Execution error, if the transaction failed on chain
    pub err: Option<TransactionError>,
}

impl SignatureStatus {
    pub fn confirmed_at(level: ConsistencyLevel) -> Self {
        Self { level, err: None }
    }

    pub fn failed(err: TransactionError) -> Self {
        Self {
            level: ConsistencyLevel::Processed,
            err: Some(err),
        }
    }

    /// Custom program error code carried by a failed instruction
    pub fn program_error_code(&self) -> Option<u32> {
        self.err.as_ref().and_then(custom_program_code)
    }
}

/// Asynchronous access to the chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// RPC endpoint, for error messages
    fn endpoint(&self) -> &str;

    /// Fetch and decode the sale account
    async fn fetch_sale(
        &self,
        address: &Pubkey,
        level: ConsistencyLevel,
    ) -> ChainResult<CandyMachineAccount>;

    /// Collection mint recorded in the sale's collection PDA, if the PDA exists
    async fn fetch_collection_mint(
        &self,
        sale: &Pubkey,
        level: ConsistencyLevel,
    ) -> ChainResult<Option<Pubkey>>;

    async fn account_exists(&self, address: &Pubkey, level: ConsistencyLevel) -> ChainResult<bool>;

    /// Balance of `owner`'s associated token account for `mint`; zero when the account is missing
    async fn token_balance(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
        level: ConsistencyLevel,
    ) -> ChainResult<u64>;

    async fn native_balance(&self, owner: &Pubkey, level: ConsistencyLevel) -> ChainResult<u64>;

    /// Cluster time in unix seconds
    async fn unix_timestamp(&self) -> ChainResult<i64>;

    async fn latest_blockhash(&self) -> ChainResult<Hash>;

    async fn rent_exempt_minimum(&self, data_len: usize) -> ChainResult<u64>;

    async fn submit_transaction(&self, transaction: &Transaction) -> ChainResult<Signature>;

    /// `None` while the cluster has not seen the signature yet
    async fn signature_status(&self, signature: &Signature) -> ChainResult<Option<SignatureStatus>>;
}
