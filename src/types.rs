//! Sale state model shared by the reconciler, orchestrator and UI
//!
//! A [`SaleStateSnapshot`] is derived from one read of the sale account. Phase
//! flags are never stored; they are computed from the snapshot so they cannot
//! disagree with each other.

use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    native_token::LAMPORTS_PER_SOL,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::chain::CandyMachineAccount;
use crate::estimator::{SizeInputs, TransactionSizeEstimator};

/// Read consistency requested from the chain client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    /// Optimistic read, used right after a submission
    Processed,
    Confirmed,
    Finalized,
}

impl ConsistencyLevel {
    pub fn commitment(self) -> CommitmentConfig {
        match self {
            ConsistencyLevel::Processed => CommitmentConfig::processed(),
            ConsistencyLevel::Confirmed => CommitmentConfig::confirmed(),
            ConsistencyLevel::Finalized => CommitmentConfig::finalized(),
        }
    }

    /// Relaxed reads may lag behind local optimistic updates
    pub fn is_relaxed(self) -> bool {
        matches!(self, ConsistencyLevel::Processed)
    }
}

impl Default for ConsistencyLevel {
    fn default() -> Self {
        ConsistencyLevel::Confirmed
    }
}

impl FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" | "recent" => Ok(ConsistencyLevel::Processed),
            "confirmed" | "single" => Ok(ConsistencyLevel::Confirmed),
            "finalized" | "max" => Ok(ConsistencyLevel::Finalized),
            other => Err(format!("unknown consistency level: {other}")),
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsistencyLevel::Processed => "processed",
            ConsistencyLevel::Confirmed => "confirmed",
            ConsistencyLevel::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// How the mint price is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentKind {
    /// Native coin, priced in lamports
    Native,
    /// Fungible token, priced in base units
    Token { mint: Pubkey, decimals: u8 },
}

impl PaymentKind {
    pub fn is_native(&self) -> bool {
        matches!(self, PaymentKind::Native)
    }

    /// Convert base units to a display amount
    pub fn to_ui_amount(&self, units: u64) -> f64 {
        match self {
            PaymentKind::Native => units as f64 / LAMPORTS_PER_SOL as f64,
            PaymentKind::Token { decimals, .. } => units as f64 / 10f64.powi(i32::from(*decimals)),
        }
    }
}

/// Whether the whitelist token is consumed by each mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhitelistMode {
    BurnEveryTime,
    NeverBurn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistSettings {
    pub mint: Pubkey,
    pub mode: WhitelistMode,
    pub is_presale_only: bool,
    pub discount_price: Option<u64>,
}

impl WhitelistSettings {
    pub fn burns(&self) -> bool {
        self.mode == WhitelistMode::BurnEveryTime
    }
}

/// Condition that closes the sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndCondition {
    None,
    /// Unix timestamp (seconds)
    ByDate(i64),
    /// Maximum number of items sold
    ByAmount(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatekeeperSettings {
    pub network: Pubkey,
    pub expire_on_use: bool,
}

/// Static sale parameters taken from the sale account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleConfig {
    pub address: Pubkey,
    pub authority: Pubkey,
    /// Receives native payments
    pub treasury: Pubkey,
    pub price: u64,
    pub payment: PaymentKind,
    pub whitelist: Option<WhitelistSettings>,
    pub end_condition: EndCondition,
    pub gatekeeper: Option<GatekeeperSettings>,
    pub go_live_date: Option<i64>,
    pub retain_authority: bool,
    /// Mint of the collection, when the collection PDA exists
    pub collection_mint: Option<Pubkey>,
}

impl SaleConfig {
    /// Collection instruction is only added when the sale retains authority
    pub fn has_collection_authority(&self) -> bool {
        self.collection_mint.is_some() && self.retain_authority
    }

    pub fn size_inputs(&self) -> SizeInputs {
        SizeInputs {
            collection_authority: self.has_collection_authority(),
            token_mint: !self.payment.is_native(),
            whitelist: self.whitelist.is_some(),
            whitelist_burn: self.whitelist.as_ref().is_some_and(WhitelistSettings::burns),
            gatekeeper: self.gatekeeper.is_some(),
            gatekeeper_expire_on_use: self.gatekeeper.is_some_and(|g| g.expire_on_use),
        }
    }
}

/// Derived sale phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalePhase {
    /// Public sale not started; `go_live` absent means only the authority can mint
    Upcoming { go_live: Option<i64> },
    /// Whitelist holders only, before go-live
    Presale,
    /// Live, but a whitelist token is required
    WhitelistOnly,
    PublicLive,
    Ended,
    SoldOut,
}

impl SalePhase {
    pub fn label(&self) -> &'static str {
        match self {
            SalePhase::Upcoming { .. } => "UPCOMING",
            SalePhase::Presale => "PRESALE",
            SalePhase::WhitelistOnly => "WHITELIST ONLY",
            SalePhase::PublicLive => "LIVE",
            SalePhase::Ended => "ENDED",
            SalePhase::SoldOut => "SOLD OUT",
        }
    }
}

/// View of the sale produced by one refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleStateSnapshot {
    pub config: SaleConfig,
    pub items_available: u64,
    pub items_redeemed: u64,
    pub items_remaining: u64,
    /// Unix time the end rules were evaluated against
    pub observed_at: i64,
    pub estimated_tx_size: usize,
    pub needs_split_transaction: bool,
    ended_by_rule: bool,
    sold_out_by_rule: bool,
}

impl SaleStateSnapshot {
    /// Derive a snapshot from decoded account data at time `now`
    ///
    /// End rules, in order: a passed end date ends the sale; an amount limit
    /// clamps `items_available` and marks the sale sold out and ended once
    /// `items_redeemed` reaches the clamped value. Redeemed is capped at the clamped
    /// availability so `redeemed + remaining == available` always holds.
    pub fn derive(account: &CandyMachineAccount, collection_mint: Option<Pubkey>, now: i64) -> Self {
        let config = account.sale_config(collection_mint);

        let mut items_available = account.items_available;
        let mut ended_by_rule = false;
        let mut sold_out_by_rule = false;

        match config.end_condition {
            EndCondition::ByDate(end) if now >= end => {
                ended_by_rule = true;
            }
            EndCondition::ByAmount(limit) => {
                items_available = items_available.min(limit);
                if account.items_redeemed >= items_available {
                    sold_out_by_rule = true;
                    ended_by_rule = true;
                }
            }
            _ => {}
        }

        let items_redeemed = account.items_redeemed.min(items_available);
        let items_remaining = items_available - items_redeemed;

        let estimated_tx_size = TransactionSizeEstimator::estimate(&config.size_inputs());

        Self {
            config,
            items_available,
            items_redeemed,
            items_remaining,
            observed_at: now,
            estimated_tx_size,
            needs_split_transaction: TransactionSizeEstimator::exceeds_limit(estimated_tx_size),
            ended_by_rule,
            sold_out_by_rule,
        }
    }

    pub fn is_sold_out(&self) -> bool {
        self.sold_out_by_rule || self.items_remaining == 0
    }

    pub fn is_ended(&self) -> bool {
        self.ended_by_rule
    }

    fn is_live(&self) -> bool {
        self.config.go_live_date.is_some_and(|t| t <= self.observed_at)
    }

    /// Whitelist holders may mint before go-live
    pub fn is_presale(&self) -> bool {
        self.config
            .whitelist
            .as_ref()
            .is_some_and(|w| w.is_presale_only)
            && !self.is_live()
    }

    /// The whitelist token is the gate rather than a discount
    pub fn is_whitelist_only(&self) -> bool {
        !self.is_presale()
            && self
                .config
                .whitelist
                .as_ref()
                .is_some_and(|w| w.discount_price.is_none())
    }

    pub fn phase(&self) -> SalePhase {
        if self.is_sold_out() {
            SalePhase::SoldOut
        } else if self.is_ended() {
            SalePhase::Ended
        } else if self.is_presale() {
            SalePhase::Presale
        } else if !self.is_live() {
            SalePhase::Upcoming {
                go_live: self.config.go_live_date,
            }
        } else if self.is_whitelist_only() {
            SalePhase::WhitelistOnly
        } else {
            SalePhase::PublicLive
        }
    }

    /// Whether the caller may mint right now
    pub fn is_active(&self, holding: &WhitelistHoldingState) -> bool {
        match self.phase() {
            SalePhase::PublicLive => true,
            SalePhase::Presale | SalePhase::WhitelistOnly => holding.token_balance > 0,
            _ => false,
        }
    }

    /// Price the caller pays, in base units of the payment kind
    pub fn effective_price(&self, holding: &WhitelistHoldingState) -> u64 {
        match &self.config.whitelist {
            Some(wl) if holding.token_balance > 0 => match wl.discount_price {
                Some(discount) if discount != self.config.price => discount,
                _ => self.config.price,
            },
            _ => self.config.price,
        }
    }

    /// Local update after a confirmed mint; overwritten by the next refresh
    pub(crate) fn with_optimistic_mint(&self, quantity: u64) -> Self {
        let mut next = self.clone();
        let minted = quantity.min(next.items_remaining);
        next.items_remaining -= minted;
        next.items_redeemed += minted;
        next
    }
}

/// Caller's whitelist token holdings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistHoldingState {
    pub token_balance: u64,
}

impl WhitelistHoldingState {
    pub fn new(token_balance: u64) -> Self {
        Self { token_balance }
    }

    pub(crate) fn consume(&mut self, quantity: u64) {
        self.token_balance = self.token_balance.saturating_sub(quantity);
    }
}

/// Cached native balance of the wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub lamports: u64,
}

impl WalletBalance {
    pub fn sol(&self) -> f64 {
        self.lamports as f64 / LAMPORTS_PER_SOL as f64
    }

    pub(crate) fn deduct(&mut self, lamports: u64) {
        self.lamports = self.lamports.saturating_sub(lamports);
    }
}

/// Accounts created by a confirmed setup transaction
///
/// Retained across a failed mint transaction so the mint step can be retried
/// alone. Cleared after a successful mint.
#[derive(Clone)]
pub struct SetupState {
    pub mint: Arc<Keypair>,
    pub user_token_account: Pubkey,
    pub setup_signature: Signature,
}

impl fmt::Debug for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use solana_sdk::signature::Signer;
        f.debug_struct("SetupState")
            .field("mint", &self.mint.pubkey())
            .field("user_token_account", &self.user_token_account)
            .field("setup_signature", &self.setup_signature)
            .finish()
    }
}

/// Result of one mint attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    Success {
        mint_address: Pubkey,
        quantity: u64,
        signature: Signature,
        explorer_url: String,
    },
    /// Transaction confirmed, metadata missing; a fee may have been charged
    LikelyFailedChargedFee { signature: Signature, metadata: Pubkey },
    Failed(crate::errors::MintError),
}

impl MintOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MintOutcome::Success { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            MintOutcome::Success { .. } => "Congratulations! Mint succeeded!".to_string(),
            MintOutcome::LikelyFailedChargedFee { .. } => {
                crate::errors::LIKELY_FAILED_MESSAGE.to_string()
            }
            MintOutcome::Failed(err) => err.user_message(),
        }
    }
}

/// Network the sale lives on, used for explorer links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    Devnet,
    Testnet,
    #[default]
    MainnetBeta,
}

impl Cluster {
    pub fn explorer_token_url(&self, mint: &Pubkey) -> String {
        match self {
            Cluster::Devnet => format!("https://solscan.io/token/{mint}?cluster=devnet"),
            Cluster::Testnet => format!("https://solscan.io/token/{mint}?cluster=testnet"),
            Cluster::MainnetBeta => format!("https://solscan.io/token/{mint}"),
        }
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            other => Err(format!("unknown cluster: {other}")),
        }
    }
}
