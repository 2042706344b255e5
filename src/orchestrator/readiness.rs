//! Mint preconditions
//!
//! Eligibility is computed here once, as a typed value, so the UI only has to
//! render it. Anything other than [`Readiness::Ready`] disables minting.

use serde::Serialize;

use crate::types::{SalePhase, SaleStateSnapshot, WhitelistHoldingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Readiness {
    Ready,
    /// No public key or no signing capability
    WalletNotReady,
    SaleNotLoaded,
    SoldOut,
    Ended,
    /// Go-live date not reached (or not set)
    NotLive,
    /// Presale or whitelist-only sale without a whitelist token
    NotEligible,
    /// Gatekeeper configured but no valid gateway token
    GatewayTokenMissing,
}

impl Readiness {
    /// Evaluate everything that does not need a network call
    pub fn evaluate(
        wallet_ready: bool,
        snapshot: Option<&SaleStateSnapshot>,
        holding: &WhitelistHoldingState,
    ) -> Self {
        if !wallet_ready {
            return Readiness::WalletNotReady;
        }
        let Some(snapshot) = snapshot else {
            return Readiness::SaleNotLoaded;
        };

        match snapshot.phase() {
            SalePhase::SoldOut => Readiness::SoldOut,
            SalePhase::Ended => Readiness::Ended,
            SalePhase::Upcoming { .. } => Readiness::NotLive,
            SalePhase::Presale | SalePhase::WhitelistOnly if holding.token_balance == 0 => {
                Readiness::NotEligible
            }
            _ => Readiness::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self == Readiness::Ready
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Readiness::Ready => "Ready to mint",
            Readiness::WalletNotReady => "Connect a wallet to mint",
            Readiness::SaleNotLoaded => "Sale state has not been loaded yet",
            Readiness::SoldOut => "SOLD OUT",
            Readiness::Ended => "Sale has ended",
            Readiness::NotLive => "Minting hasn't started yet",
            Readiness::NotEligible => "A whitelist token is required to mint",
            Readiness::GatewayTokenMissing => "Complete identity verification before minting",
        }
    }
}
