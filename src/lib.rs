//! Candy machine mint client
//!
//! Derives the sale phase from on-chain account data, decides whether a mint
//! must be split into setup and mint transactions, submits and polls them, and
//! reconciles local counters with the confirmed outcome.
//!
//! The chain client, wallet, transaction builder and identity gatekeeper are
//! traits ([`chain::ChainClient`], [`wallet::WalletSigner`],
//! [`tx_builder::MintTransactionBuilder`], [`gatekeeper::GatewayProvider`]) so
//! the engine runs unchanged against RPC or the in-memory mocks of
//! `test_utils`.

pub mod alert;
pub mod chain;
pub mod config;
pub mod errors;
pub mod estimator;
pub mod gatekeeper;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod poller;
pub mod reconciler;
pub mod tx_builder;
pub mod types;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use errors::{ChainError, MintError};
pub use estimator::TransactionSizeEstimator;
pub use orchestrator::{MintOrchestrator, MintState, Readiness};
pub use poller::{ConfirmationPoller, ConfirmationResult};
pub use reconciler::StateReconciler;
pub use types::{
    ConsistencyLevel, MintOutcome, SalePhase, SaleStateSnapshot, SetupState,
    WhitelistHoldingState,
};
