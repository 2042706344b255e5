//! Identity gatekeeper integration
//!
//! Sales with a gatekeeper network require a valid gateway token for the
//! payer. Tokens are issued out of band; this crate only looks them up.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::errors::ChainResult;

/// Source of gateway tokens for a wallet
#[async_trait]
pub trait GatewayProvider: Send + Sync {
    /// Address of a currently valid gateway token, if the owner holds one
    async fn gateway_token(&self, owner: &Pubkey, network: &Pubkey) -> ChainResult<Option<Pubkey>>;
}

/// Gateway token resolved ahead of time (e.g. from a completed verification flow)
#[derive(Debug, Clone, Default)]
pub struct FixedGatewayProvider {
    token: Option<(Pubkey, Pubkey)>,
}

impl FixedGatewayProvider {
    /// Token valid for `network`
    pub fn new(network: Pubkey, token: Pubkey) -> Self {
        Self {
            token: Some((network, token)),
        }
    }

    /// Provider that never has a token
    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GatewayProvider for FixedGatewayProvider {
    async fn gateway_token(&self, _owner: &Pubkey, network: &Pubkey) -> ChainResult<Option<Pubkey>> {
        Ok(self
            .token
            .filter(|(token_network, _)| token_network == network)
            .map(|(_, token)| token))
    }
}
