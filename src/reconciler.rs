//! Sale state reconciliation
//!
//! [`StateReconciler`] owns the local view of the sale: the latest
//! [`SaleStateSnapshot`], the caller's whitelist holdings and the cached wallet
//! balance. A refresh replaces the view with what the chain reports; the
//! orchestrator only applies optimistic hints on top, which the next refresh
//! overwrites.

use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::chain::ChainClient;
use crate::errors::MintError;
use crate::metrics::MintMetrics;
use crate::orchestrator::Readiness;
use crate::types::{
    ConsistencyLevel, SaleStateSnapshot, WalletBalance, WhitelistHoldingState,
};
use crate::wallet::WalletSigner;

/// Everything the UI renders between refreshes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalView {
    pub snapshot: Option<SaleStateSnapshot>,
    pub holding: WhitelistHoldingState,
    pub balance: WalletBalance,
}

pub struct StateReconciler {
    chain: Arc<dyn ChainClient>,
    wallet: Arc<dyn WalletSigner>,
    sale_address: Pubkey,
    view: RwLock<LocalView>,
    metrics: Arc<MintMetrics>,
}

impl StateReconciler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        wallet: Arc<dyn WalletSigner>,
        sale_address: Pubkey,
        metrics: Arc<MintMetrics>,
    ) -> Self {
        Self {
            chain,
            wallet,
            sale_address,
            view: RwLock::new(LocalView::default()),
            metrics,
        }
    }

    pub fn sale_address(&self) -> &Pubkey {
        &self.sale_address
    }

    /// Re-read the sale and the caller's whitelist holdings
    ///
    /// A relaxed (`Processed`) refresh keeps the locally tracked whitelist
    /// balance once one exists: right after a burn the RPC node may still
    /// report the pre-burn amount.
    #[instrument(skip(self), fields(sale = %self.sale_address))]
    pub async fn refresh(&self, level: ConsistencyLevel) -> Result<SaleStateSnapshot, MintError> {
        self.metrics.refresh_total.inc();

        let result = self.refresh_inner(level).await;
        if let Err(e) = &result {
            self.metrics.refresh_errors.inc();
            warn!(error = %e, "Refresh failed");
        }
        result
    }

    async fn refresh_inner(&self, level: ConsistencyLevel) -> Result<SaleStateSnapshot, MintError> {
        let owner = self
            .wallet
            .pubkey()
            .ok_or(MintError::PreconditionNotMet(Readiness::WalletNotReady))?;

        let address = self.sale_address.to_string();
        let rpc_url = self.chain.endpoint().to_string();
        let map_err = |e| MintError::from_refresh(e, &address, &rpc_url);

        let account = self
            .chain
            .fetch_sale(&self.sale_address, level)
            .await
            .map_err(map_err)?;
        let collection_mint = self
            .chain
            .fetch_collection_mint(&self.sale_address, level)
            .await
            .map_err(map_err)?;
        let now = self.chain.unix_timestamp().await.map_err(map_err)?;

        let snapshot = SaleStateSnapshot::derive(&account, collection_mint, now);

        let keep_local_holding = level.is_relaxed() && self.view.read().snapshot.is_some();
        let holding = match &snapshot.config.whitelist {
            Some(_) if keep_local_holding => self.view.read().holding,
            Some(whitelist) => WhitelistHoldingState::new(
                self.chain
                    .token_balance(&owner, &whitelist.mint, level)
                    .await
                    .map_err(map_err)?,
            ),
            None => WhitelistHoldingState::default(),
        };

        debug!(
            phase = snapshot.phase().label(),
            items_available = snapshot.items_available,
            items_redeemed = snapshot.items_redeemed,
            items_remaining = snapshot.items_remaining,
            whitelist_balance = holding.token_balance,
            needs_split = snapshot.needs_split_transaction,
            "Sale state derived"
        );

        {
            let mut view = self.view.write();
            view.snapshot = Some(snapshot.clone());
            view.holding = holding;
        }

        Ok(snapshot)
    }

    /// Re-read the wallet's native balance
    pub async fn refresh_wallet_balance(
        &self,
        level: ConsistencyLevel,
    ) -> Result<WalletBalance, MintError> {
        let owner = self
            .wallet
            .pubkey()
            .ok_or(MintError::PreconditionNotMet(Readiness::WalletNotReady))?;

        let lamports = self
            .chain
            .native_balance(&owner, level)
            .await
            .map_err(|e| MintError::RpcUnreachable {
                rpc_url: self.chain.endpoint().to_string(),
                message: e.to_string(),
            })?;

        let balance = WalletBalance { lamports };
        self.view.write().balance = balance;
        Ok(balance)
    }

    pub fn view(&self) -> LocalView {
        self.view.read().clone()
    }

    pub fn snapshot(&self) -> Option<SaleStateSnapshot> {
        self.view.read().snapshot.clone()
    }

    pub fn holding(&self) -> WhitelistHoldingState {
        self.view.read().holding
    }

    pub fn balance(&self) -> WalletBalance {
        self.view.read().balance
    }

    /// Optimistic counters after a successful mint
    ///
    /// `burned` whitelist tokens are removed from the holding and
    /// `spent_lamports` from the cached balance.
    pub(crate) fn apply_mint_success(&self, quantity: u64, burned: u64, spent_lamports: u64) {
        let mut view = self.view.write();
        if let Some(snapshot) = view.snapshot.take() {
            view.snapshot = Some(snapshot.with_optimistic_mint(quantity));
        }
        view.holding.consume(burned);
        view.balance.deduct(spent_lamports);

        info!(
            quantity,
            burned,
            spent_lamports,
            remaining = view.snapshot.as_ref().map(|s| s.items_remaining),
            "Applied optimistic mint"
        );
    }
}

impl std::fmt::Debug for StateReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateReconciler")
            .field("sale_address", &self.sale_address)
            .field("endpoint", &self.chain.endpoint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChainError;
    use crate::test_utils::{sale_account, MockChainClient, MockWallet};
    use crate::types::{WhitelistMode, WhitelistSettings};

    fn reconciler(chain: Arc<MockChainClient>, wallet: MockWallet) -> StateReconciler {
        let address = chain.sale_address();
        StateReconciler::new(
            chain,
            Arc::new(wallet),
            address,
            Arc::new(MintMetrics::new().unwrap()),
        )
    }

    fn whitelisted_account(mint: Pubkey) -> crate::chain::CandyMachineAccount {
        let mut account = sale_account();
        account.whitelist = Some(WhitelistSettings {
            mint,
            mode: WhitelistMode::BurnEveryTime,
            is_presale_only: false,
            discount_price: Some(500_000_000),
        });
        account
    }

    #[tokio::test]
    async fn test_refresh_populates_view() {
        let chain = Arc::new(MockChainClient::new(sale_account()));
        let reconciler = reconciler(chain, MockWallet::new());

        let snapshot = reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        assert_eq!(snapshot.items_remaining, 90);
        assert_eq!(reconciler.snapshot(), Some(snapshot));
        assert_eq!(reconciler.metrics.refresh_total.get(), 1);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let chain = Arc::new(MockChainClient::new(sale_account()));
        let reconciler = reconciler(chain, MockWallet::new());

        let first = reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        let second = reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_sale_is_account_not_found() {
        let chain = Arc::new(MockChainClient::new(sale_account()));
        chain.remove_sale();
        let reconciler = reconciler(chain, MockWallet::new());

        let err = reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap_err();
        assert!(matches!(err, MintError::AccountNotFound { .. }));
        assert!(err.is_fatal());
        assert_eq!(reconciler.metrics.refresh_errors.get(), 1);
        assert!(reconciler.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_rpc_failure_is_unreachable() {
        let chain = Arc::new(MockChainClient::new(sale_account()));
        chain.fail_reads(Some(ChainError::Rpc {
            message: "connection refused".into(),
        }));
        let reconciler = reconciler(chain, MockWallet::new());

        let err = reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap_err();
        assert!(matches!(err, MintError::RpcUnreachable { .. }));
        assert!(err.user_message().contains("mock://"));
    }

    #[tokio::test]
    async fn test_refresh_requires_wallet() {
        let chain = Arc::new(MockChainClient::new(sale_account()));
        let reconciler = reconciler(chain.clone(), MockWallet::disconnected());

        let err = reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap_err();
        assert_eq!(err, MintError::PreconditionNotMet(Readiness::WalletNotReady));
        assert_eq!(chain.sale_fetches(), 0);
    }

    #[tokio::test]
    async fn test_whitelist_balance_fetched() {
        let wl_mint = Pubkey::new_unique();
        let chain = Arc::new(MockChainClient::new(whitelisted_account(wl_mint)));
        let wallet = MockWallet::new();
        chain.set_token_balance(wallet.address(), wl_mint, 3);
        let reconciler = reconciler(chain, wallet);

        reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        assert_eq!(reconciler.holding().token_balance, 3);
    }

    #[tokio::test]
    async fn test_relaxed_refresh_keeps_local_holding() {
        let wl_mint = Pubkey::new_unique();
        let chain = Arc::new(MockChainClient::new(whitelisted_account(wl_mint)));
        let wallet = MockWallet::new();
        let owner = wallet.address();
        chain.set_token_balance(owner, wl_mint, 3);
        let reconciler = reconciler(chain.clone(), wallet);

        reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        reconciler.apply_mint_success(1, 1, 0);
        assert_eq!(reconciler.holding().token_balance, 2);

        // node still reports the pre-burn balance
        reconciler.refresh(ConsistencyLevel::Processed).await.unwrap();
        assert_eq!(reconciler.holding().token_balance, 2);

        chain.set_token_balance(owner, wl_mint, 2);
        reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        assert_eq!(reconciler.holding().token_balance, 2);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_optimistic_counters() {
        let chain = Arc::new(MockChainClient::new(sale_account()));
        let reconciler = reconciler(chain, MockWallet::new());

        reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        reconciler.apply_mint_success(1, 0, 0);
        assert_eq!(reconciler.snapshot().unwrap().items_remaining, 89);

        // chain has not seen the mint
        let snapshot = reconciler.refresh(ConsistencyLevel::Confirmed).await.unwrap();
        assert_eq!(snapshot.items_remaining, 90);
    }

    #[tokio::test]
    async fn test_wallet_balance_refresh_and_deduct() {
        let chain = Arc::new(MockChainClient::new(sale_account()));
        let wallet = MockWallet::new();
        chain.set_native_balance(wallet.address(), 5_000_000_000);
        let reconciler = reconciler(chain, wallet);

        let balance = reconciler
            .refresh_wallet_balance(ConsistencyLevel::Confirmed)
            .await
            .unwrap();
        assert_eq!(balance.lamports, 5_000_000_000);

        reconciler.apply_mint_success(1, 0, 1_012_000_000);
        assert_eq!(reconciler.balance().lamports, 3_988_000_000);
    }
}
