//! End-to-end scenarios over the in-memory collaborators

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::CandyMachineAccount;
use crate::gatekeeper::FixedGatewayProvider;
use crate::metrics::MintMetrics;
use crate::orchestrator::{Collaborators, MintOrchestrator, OrchestratorSettings};
use crate::poller::ConfirmationPoller;
use crate::reconciler::StateReconciler;
use crate::test_utils::{MockChainClient, MockTxBuilder, MockWallet};
use crate::types::{ConsistencyLevel, GatekeeperSettings, WhitelistMode, WhitelistSettings};
use crate::wallet::WalletSigner;

mod mint_flow_tests;

pub(crate) const STARTING_BALANCE: u64 = 10_000_000_000;

pub(crate) struct Harness {
    pub chain: Arc<MockChainClient>,
    pub wallet: Arc<MockWallet>,
    pub builder: Arc<MockTxBuilder>,
    pub reconciler: Arc<StateReconciler>,
    pub orchestrator: Arc<MintOrchestrator>,
    pub metrics: Arc<MintMetrics>,
}

impl Harness {
    pub fn new(account: CandyMachineAccount) -> Self {
        Self::build(account, MockWallet::new(), FixedGatewayProvider::none())
    }

    pub fn build(
        account: CandyMachineAccount,
        wallet: MockWallet,
        gateway: FixedGatewayProvider,
    ) -> Self {
        let address = account.address;
        let chain = Arc::new(MockChainClient::new(account));
        let wallet = Arc::new(wallet);
        if let Some(owner) = wallet.pubkey() {
            chain.set_native_balance(owner, STARTING_BALANCE);
        }
        let builder = Arc::new(MockTxBuilder::new(chain.clone()));
        let metrics = Arc::new(MintMetrics::new().unwrap());

        let reconciler = Arc::new(StateReconciler::new(
            chain.clone(),
            wallet.clone(),
            address,
            metrics.clone(),
        ));
        let orchestrator = Arc::new(MintOrchestrator::new(
            Collaborators {
                chain: chain.clone(),
                wallet: wallet.clone(),
                builder: builder.clone(),
                gateway: Arc::new(gateway),
            },
            reconciler.clone(),
            ConfirmationPoller::new(
                chain.clone(),
                Duration::from_millis(500),
                ConsistencyLevel::Confirmed,
            ),
            OrchestratorSettings::default(),
            metrics.clone(),
        ));

        Self {
            chain,
            wallet,
            builder,
            reconciler,
            orchestrator,
            metrics,
        }
    }

    /// Load sale and balance the way the UI does before enabling the mint button
    pub async fn refresh(&self) {
        self.reconciler
            .refresh(ConsistencyLevel::Confirmed)
            .await
            .unwrap();
        self.reconciler
            .refresh_wallet_balance(ConsistencyLevel::Confirmed)
            .await
            .unwrap();
    }
}

/// Collection authority + burn whitelist + gatekeeper with expire-on-use:
/// 892 + 182 + 34 + 34 + 33 + 66 = 1241 bytes, over the single-transaction ceiling
pub(crate) fn oversized_sale(whitelist_mint: Pubkey, network: Pubkey) -> CandyMachineAccount {
    let mut account = crate::test_utils::sale_account();
    account.retain_authority = true;
    account.whitelist = Some(WhitelistSettings {
        mint: whitelist_mint,
        mode: WhitelistMode::BurnEveryTime,
        is_presale_only: false,
        discount_price: Some(500_000_000),
    });
    account.gatekeeper = Some(GatekeeperSettings {
        network,
        expire_on_use: true,
    });
    account
}
