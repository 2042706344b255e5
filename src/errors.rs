//! Error types for sale reconciliation and mint orchestration
//!
//! Two layers:
//! - [`ChainError`]: what the chain client, wallet and transaction builder report
//! - [`MintError`]: what the reconciler and orchestrator surface to the UI
//!
//! Nothing in this crate retries on its own. `is_retryable` only tells the
//! caller whether a user-initiated `refresh()` / `mint()` could succeed.

use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_sdk::instruction::InstructionError;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

use crate::orchestrator::Readiness;

/// Failures reported by the external collaborators (chain client, wallet, builder)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The requested account does not exist at the given address
    #[error("Account not found: {address}")]
    AccountNotFound { address: String },

    /// Transport-level or RPC server failure
    #[error("RPC error: {message}")]
    Rpc { message: String },

    /// Account data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Wallet refused or failed to sign
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Transaction could not be built
    #[error("Transaction build error: {0}")]
    Build(String),

    /// The cluster rejected the transaction, usually during preflight simulation
    #[error("Transaction rejected (code: {code:?}): {message}")]
    Transaction { code: Option<u32>, message: String },
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Custom error code raised by a program instruction, if that is what failed
pub fn custom_program_code(err: &TransactionError) -> Option<u32> {
    match err {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => Some(*code),
        _ => None,
    }
}

impl ChainError {
    /// Classify a failed account read, separating missing accounts from connectivity
    pub fn from_read_error(err: &ClientError, address: &str) -> Self {
        let lowered = err.to_string().to_lowercase();

        if lowered.contains("account does not exist")
            || lowered.contains("could not find account")
            || lowered.contains("accountnotfound")
        {
            return ChainError::AccountNotFound {
                address: address.to_string(),
            };
        }

        Self::from_client_error(err)
    }

    /// Classify a `solana_client` error from a submit or cluster-wide query
    pub fn from_client_error(err: &ClientError) -> Self {
        if let Some(tx_err) = err.get_transaction_error() {
            return ChainError::Transaction {
                code: custom_program_code(&tx_err),
                message: tx_err.to_string(),
            };
        }

        match err.kind() {
            ClientErrorKind::SigningError(e) => ChainError::Signing(e.to_string()),
            _ => ChainError::Rpc {
                message: err.to_string(),
            },
        }
    }

    pub fn is_account_not_found(&self) -> bool {
        matches!(self, ChainError::AccountNotFound { .. })
    }
}

/// Errors surfaced by the reconciler and orchestrator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MintError {
    /// Malformed sale address or configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No sale account at the configured address
    #[error("Sale account not found at {address} (rpc: {rpc_url})")]
    AccountNotFound { address: String, rpc_url: String },

    /// Network call failed
    #[error("RPC unreachable at {rpc_url}: {message}")]
    RpcUnreachable { rpc_url: String, message: String },

    /// Mint is disabled; rendered as a disabled state, not an alert
    #[error("Precondition not met: {0:?}")]
    PreconditionNotMet(Readiness),

    /// Confirmation polling ran out of time; the transaction may still land
    #[error("Transaction {signature} not confirmed within {timeout_ms}ms")]
    TransactionTimeout { signature: String, timeout_ms: u64 },

    /// The program rejected the transaction
    #[error("Program execution failed (code: {code:?}): {detail}")]
    ProgramExecution { code: Option<u32>, detail: String },

    /// Transaction landed but the token metadata was not created
    #[error("Transaction {signature} confirmed but metadata {metadata} is missing")]
    LikelyFailedMetadataMissing { signature: String, metadata: String },

    /// Account setup transaction failed or was not confirmed in time
    #[error("Setup transaction failed: {0}")]
    SetupFailed(String),

    /// Building, signing or submitting failed before a signature existed
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Another mint attempt is still in flight
    #[error("A mint attempt is already in progress")]
    MintInProgress,

    /// A setup state was created while another one was still pending
    #[error("A setup transaction is already pending for this session")]
    SetupAlreadyPending,

    /// The caller stopped waiting; on-chain execution may still happen
    #[error("Mint attempt abandoned by caller")]
    Abandoned,
}

/// Custom program error codes of the candy machine v2 program
pub mod program_codes {
    /// Index of `NotEnoughSOL` in the program's error enum
    pub const NOT_ENOUGH_SOL: u32 = 9;
    /// Index of `CandyMachineEmpty`
    pub const CANDY_MACHINE_EMPTY: u32 = 11;
    /// Index of `CandyMachineNotLive`
    pub const CANDY_MACHINE_NOT_LIVE: u32 = 12;

    /// Offset used by the Anchor version the sale program was built with (0x12c)
    pub const LEGACY_OFFSET: u32 = 300;
    /// Offset used by later Anchor releases
    pub const ANCHOR_OFFSET: u32 = 6000;
}

/// User-facing classification of a program error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramErrorKind {
    SoldOut,
    NotLiveYet,
    InsufficientFunds,
    Unrecognized,
}

impl ProgramErrorKind {
    /// Map a raw custom error code (e.g. 0x137) to its meaning
    pub fn from_code(code: Option<u32>) -> Self {
        let Some(code) = code else {
            return ProgramErrorKind::Unrecognized;
        };

        let index = if code >= program_codes::ANCHOR_OFFSET {
            code - program_codes::ANCHOR_OFFSET
        } else if code >= program_codes::LEGACY_OFFSET {
            code - program_codes::LEGACY_OFFSET
        } else {
            return ProgramErrorKind::Unrecognized;
        };

        match index {
            program_codes::CANDY_MACHINE_EMPTY => ProgramErrorKind::SoldOut,
            program_codes::CANDY_MACHINE_NOT_LIVE => ProgramErrorKind::NotLiveYet,
            program_codes::NOT_ENOUGH_SOL => ProgramErrorKind::InsufficientFunds,
            _ => ProgramErrorKind::Unrecognized,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ProgramErrorKind::SoldOut => "SOLD OUT!",
            ProgramErrorKind::NotLiveYet => "Minting period hasn't started yet.",
            ProgramErrorKind::InsufficientFunds => {
                "Insufficient funds to mint. Please fund your wallet."
            }
            ProgramErrorKind::Unrecognized => GENERIC_TIMEOUT_MESSAGE,
        }
    }
}

pub const GENERIC_TIMEOUT_MESSAGE: &str = "Transaction Timeout! Please try again.";

pub const LIKELY_FAILED_MESSAGE: &str = "Mint likely failed! Anti-bot SOL 0.01 fee potentially charged! \
Check the explorer to confirm the mint failed and if so, make sure you are eligible to mint before trying again.";

impl MintError {
    /// Text for the alert banner
    pub fn user_message(&self) -> String {
        match self {
            MintError::Configuration(_) => "Your candy machine id value doesn't look right! \
Make sure you enter it in as plain base-58 address!"
                .to_string(),
            MintError::AccountNotFound { address, rpc_url } => format!(
                "Couldn't fetch candy machine state from candy machine with address: {address}, \
using rpc: {rpc_url}! You probably typed the candy machine id in wrong, or you are using the wrong RPC!"
            ),
            MintError::RpcUnreachable { rpc_url, .. } => format!(
                "Couldn't fetch candy machine state with rpc: {rpc_url}! \
This probably means you have an issue with the RPC host value, or you are not using a custom RPC!"
            ),
            MintError::PreconditionNotMet(readiness) => readiness.describe().to_string(),
            MintError::TransactionTimeout { .. } => "Transaction Timeout! The mint may still land \
and you may have been charged. Verify in the explorer before trying again."
                .to_string(),
            MintError::ProgramExecution { code, .. } => {
                ProgramErrorKind::from_code(*code).message().to_string()
            }
            MintError::LikelyFailedMetadataMissing { .. } => LIKELY_FAILED_MESSAGE.to_string(),
            MintError::SetupFailed(_) => "Mint failed! Please try again!".to_string(),
            MintError::Submission(_) => "Minting failed! Please try again!".to_string(),
            MintError::MintInProgress => "A mint is already in progress.".to_string(),
            MintError::SetupAlreadyPending => {
                "An account setup transaction is already pending.".to_string()
            }
            MintError::Abandoned => "Mint attempt cancelled.".to_string(),
        }
    }

    /// Fatal errors require the operator to change configuration
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MintError::Configuration(_) | MintError::AccountNotFound { .. }
        )
    }

    /// Whether a user-initiated retry could reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            MintError::RpcUnreachable { .. }
            | MintError::SetupFailed(_)
            | MintError::Submission(_)
            | MintError::MintInProgress
            | MintError::Abandoned => true,

            // Ambiguous outcomes: the user must verify before retrying
            MintError::TransactionTimeout { .. } | MintError::LikelyFailedMetadataMissing { .. } => {
                false
            }

            MintError::ProgramExecution { code, .. } => matches!(
                ProgramErrorKind::from_code(*code),
                ProgramErrorKind::Unrecognized | ProgramErrorKind::NotLiveYet
            ),

            MintError::Configuration(_)
            | MintError::AccountNotFound { .. }
            | MintError::PreconditionNotMet(_)
            | MintError::SetupAlreadyPending => false,
        }
    }

    /// Preconditions render as a disabled mint control, not as an error alert
    pub fn is_alert(&self) -> bool {
        !matches!(self, MintError::PreconditionNotMet(_))
    }

    pub(crate) fn from_refresh(err: ChainError, address: &str, rpc_url: &str) -> Self {
        match err {
            ChainError::AccountNotFound { .. } => MintError::AccountNotFound {
                address: address.to_string(),
                rpc_url: rpc_url.to_string(),
            },
            ChainError::Decode(msg) => MintError::Configuration(format!(
                "account at {address} is not a candy machine: {msg}"
            )),
            other => MintError::RpcUnreachable {
                rpc_url: rpc_url.to_string(),
                message: other.to_string(),
            },
        }
    }
}
