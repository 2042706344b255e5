//! Mint orchestration
//!
//! [`MintOrchestrator`] drives one mint attempt at a time through
//!
//! ```text
//! Idle -> SettingUp -> AwaitingSetupConfirmation -> ReadyToMint
//!      -> Minting -> AwaitingMintConfirmation -> Succeeded | LikelyFailed | Failed
//! ```
//!
//! The setup leg only runs when the combined transaction would not fit and no
//! confirmed setup is retained from an earlier attempt. The mint transaction is
//! never submitted before its setup transaction is confirmed.
//!
//! A confirmed mint transaction is not enough: the token's metadata account
//! must exist too. A confirmed transaction without metadata is reported as
//! [`MintOutcome::LikelyFailedChargedFee`].

use parking_lot::Mutex;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::alert::AlertState;
use crate::chain::addresses::associated_token_address;
use crate::chain::ChainClient;
use crate::errors::{ChainError, MintError};
use crate::gatekeeper::GatewayProvider;
use crate::metrics::{MintMetrics, Timer};
use crate::observability::CorrelationId;
use crate::poller::{ConfirmationPoller, ConfirmationResult};
use crate::reconciler::StateReconciler;
use crate::tx_builder::{MintRequest, MintTransactionBuilder};
use crate::types::{Cluster, ConsistencyLevel, MintOutcome, SaleStateSnapshot, SetupState};
use crate::wallet::WalletSigner;

mod readiness;
mod state;

pub use readiness::Readiness;
pub use state::MintState;

/// The program mints one token per call
pub const MINT_QUANTITY: u64 = 1;

pub const SETUP_PROMPT: &str = "Please validate account setup transaction";
pub const SETUP_DONE: &str = "Setup transaction succeeded! You can now validate mint transaction";

/// Tunables taken from configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Bound on each confirmation wait
    pub tx_timeout: Duration,
    /// Added to the price when deducting from the cached wallet balance
    pub fee_buffer_lamports: u64,
    pub cluster: Cluster,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            tx_timeout: Duration::from_millis(30_000),
            fee_buffer_lamports: 12_000_000,
            cluster: Cluster::default(),
        }
    }
}

/// External collaborators used by the orchestrator
pub struct Collaborators {
    pub chain: Arc<dyn ChainClient>,
    pub wallet: Arc<dyn WalletSigner>,
    pub builder: Arc<dyn MintTransactionBuilder>,
    pub gateway: Arc<dyn GatewayProvider>,
}

pub struct MintOrchestrator {
    chain: Arc<dyn ChainClient>,
    wallet: Arc<dyn WalletSigner>,
    builder: Arc<dyn MintTransactionBuilder>,
    gateway: Arc<dyn GatewayProvider>,
    reconciler: Arc<StateReconciler>,
    poller: ConfirmationPoller,
    settings: OrchestratorSettings,
    metrics: Arc<MintMetrics>,

    state: watch::Sender<MintState>,
    in_flight: AtomicBool,
    setup: Mutex<Option<SetupState>>,
    alert: Mutex<Option<AlertState>>,
}

/// Releases the single-attempt slot on every exit path
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pre-signature failure or abandonment inside one leg of the attempt
enum Abort {
    Outcome(MintOutcome),
    Abandoned,
}

impl MintOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        reconciler: Arc<StateReconciler>,
        poller: ConfirmationPoller,
        settings: OrchestratorSettings,
        metrics: Arc<MintMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(MintState::Idle);
        Self {
            chain: collaborators.chain,
            wallet: collaborators.wallet,
            builder: collaborators.builder,
            gateway: collaborators.gateway,
            reconciler,
            poller,
            settings,
            metrics,
            state,
            in_flight: AtomicBool::new(false),
            setup: Mutex::new(None),
            alert: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MintState {
        *self.state.borrow()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<MintState> {
        self.state.subscribe()
    }

    pub fn alert(&self) -> Option<AlertState> {
        self.alert.lock().clone()
    }

    pub fn setup_state(&self) -> Option<SetupState> {
        self.setup.lock().clone()
    }

    pub fn reconciler(&self) -> &Arc<StateReconciler> {
        &self.reconciler
    }

    /// Preconditions that can be checked without a network call
    pub fn readiness(&self) -> Readiness {
        let view = self.reconciler.view();
        Readiness::evaluate(self.wallet.can_sign(), view.snapshot.as_ref(), &view.holding)
    }

    /// Drop a setup retained from a failed mint so the next attempt starts fresh
    pub fn discard_setup(&self) -> Result<(), MintError> {
        let _guard = self.try_begin().ok_or(MintError::MintInProgress)?;
        if let Some(setup) = self.setup.lock().take() {
            info!(mint = %setup.mint.pubkey(), "Discarded retained setup");
        }
        Ok(())
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    fn transition(&self, next: MintState) {
        let previous = self.state.send_replace(next);
        debug!(from = %previous, to = %next, "Mint state transition");
    }

    fn set_alert(&self, alert: AlertState) {
        *self.alert.lock() = Some(alert);
    }

    /// Install a confirmed setup; at most one may be live per session
    fn install_setup(&self, setup: SetupState) -> Result<(), MintError> {
        let mut slot = self.setup.lock();
        if slot.is_some() {
            return Err(MintError::SetupAlreadyPending);
        }
        *slot = Some(setup);
        Ok(())
    }

    /// Run one mint attempt
    ///
    /// Returns `Err` only when the attempt never started (preconditions, another
    /// attempt in flight) or was abandoned through `cancel`. Every attempt that
    /// started yields a [`MintOutcome`].
    pub async fn mint(&self, cancel: &CancellationToken) -> Result<MintOutcome, MintError> {
        let _guard = self.try_begin().ok_or(MintError::MintInProgress)?;

        let attempt = CorrelationId::new();
        let span = info_span!("mint_attempt", attempt = %attempt.short());
        self.run_attempt(cancel).instrument(span).await
    }

    async fn run_attempt(&self, cancel: &CancellationToken) -> Result<MintOutcome, MintError> {
        let view = self.reconciler.view();
        let readiness =
            Readiness::evaluate(self.wallet.can_sign(), view.snapshot.as_ref(), &view.holding);

        let (Readiness::Ready, Some(payer), Some(sale)) =
            (readiness, self.wallet.pubkey(), view.snapshot)
        else {
            let readiness = if readiness.is_ready() {
                Readiness::WalletNotReady
            } else {
                readiness
            };
            debug!(?readiness, "Mint precondition not met");
            return Err(MintError::PreconditionNotMet(readiness));
        };

        let gateway_token = match &sale.config.gatekeeper {
            Some(gatekeeper) => match self.gateway.gateway_token(&payer, &gatekeeper.network).await {
                Ok(Some(token)) => Some(token),
                Ok(None) => {
                    return Err(MintError::PreconditionNotMet(Readiness::GatewayTokenMissing));
                }
                Err(e) => {
                    self.metrics.mint_attempts.inc();
                    let err = MintError::Submission(format!("gateway token lookup: {e}"));
                    return Ok(self.fail(err, false).await);
                }
            },
            None => None,
        };

        self.metrics.mint_attempts.inc();
        *self.alert.lock() = None;
        info!(
            %payer,
            sale = %sale.config.address,
            needs_split = sale.needs_split_transaction,
            estimated_size = sale.estimated_tx_size,
            "Mint attempt started"
        );

        let retained = self.setup.lock().clone();
        let setup = match retained {
            Some(setup) => {
                info!(mint = %setup.mint.pubkey(), "Reusing confirmed setup");
                self.transition(MintState::ReadyToMint);
                Some(setup)
            }
            None if sale.needs_split_transaction => {
                match self.run_setup(&sale, &payer, cancel).await {
                    Ok(setup) => Some(setup),
                    Err(Abort::Outcome(outcome)) => return Ok(outcome),
                    Err(Abort::Abandoned) => return Err(self.abandon()),
                }
            }
            None => None,
        };

        match self
            .run_mint(&sale, &payer, setup.as_ref(), gateway_token, cancel)
            .await
        {
            Ok(outcome) | Err(Abort::Outcome(outcome)) => Ok(outcome),
            Err(Abort::Abandoned) => Err(self.abandon()),
        }
    }

    async fn run_setup(
        &self,
        sale: &SaleStateSnapshot,
        payer: &Pubkey,
        cancel: &CancellationToken,
    ) -> Result<SetupState, Abort> {
        self.transition(MintState::SettingUp);
        self.set_alert(AlertState::info(SETUP_PROMPT));

        let mint = Arc::new(Keypair::new());

        let submitted = async {
            let mut tx = self.builder.build_setup(sale, payer, mint.as_ref()).await?;
            self.wallet.sign_transaction(&mut tx).await?;
            let signature = self.chain.submit_transaction(&tx).await?;
            Ok::<_, ChainError>(signature)
        }
        .await;

        let signature = match submitted {
            Ok(signature) => signature,
            Err(e) => {
                let err = MintError::SetupFailed(e.to_string());
                return Err(Abort::Outcome(self.fail(err, false).await));
            }
        };

        self.metrics.setup_transactions.inc();
        info!(%signature, mint = %mint.pubkey(), "Setup transaction submitted");
        self.transition(MintState::AwaitingSetupConfirmation);

        let timer = Timer::start();
        let result = self
            .poller
            .await_confirmation(&signature, self.settings.tx_timeout, cancel)
            .await
            .ok_or(Abort::Abandoned)?;
        timer.observe_duration(&self.metrics.confirmation_latency);

        match result {
            ConfirmationResult::Confirmed => {
                let setup = SetupState {
                    user_token_account: associated_token_address(payer, &mint.pubkey()),
                    mint,
                    setup_signature: signature,
                };
                if let Err(e) = self.install_setup(setup.clone()) {
                    return Err(Abort::Outcome(self.fail(e, false).await));
                }

                info!(%signature, "Setup transaction confirmed");
                self.set_alert(AlertState::info(SETUP_DONE));
                self.transition(MintState::ReadyToMint);
                Ok(setup)
            }
            ConfirmationResult::FailedWithCode { code, detail } => {
                let err = MintError::SetupFailed(format!("code {code:?}: {detail}"));
                Err(Abort::Outcome(self.fail(err, true).await))
            }
            ConfirmationResult::TimedOut => {
                let err = MintError::SetupFailed(format!(
                    "setup transaction {signature} not confirmed within {}ms",
                    self.settings.tx_timeout.as_millis()
                ));
                Err(Abort::Outcome(self.fail(err, true).await))
            }
        }
    }

    async fn run_mint(
        &self,
        sale: &SaleStateSnapshot,
        payer: &Pubkey,
        setup: Option<&SetupState>,
        gateway_token: Option<Pubkey>,
        cancel: &CancellationToken,
    ) -> Result<MintOutcome, Abort> {
        self.transition(MintState::Minting);

        let mint = setup
            .map(|s| s.mint.clone())
            .unwrap_or_else(|| Arc::new(Keypair::new()));

        let submitted = async {
            let mut built = self
                .builder
                .build_mint(MintRequest {
                    sale,
                    payer: *payer,
                    mint: mint.as_ref(),
                    setup,
                    gateway_token,
                })
                .await?;
            self.wallet.sign_transaction(&mut built.transaction).await?;
            let signature = self.chain.submit_transaction(&built.transaction).await?;
            Ok::<_, ChainError>((signature, built.metadata))
        }
        .await;

        let (signature, metadata) = match submitted {
            Ok(submitted) => submitted,
            Err(ChainError::Transaction { code, message }) => {
                // rejected in preflight: nothing landed, counters stay as they are
                let err = MintError::ProgramExecution {
                    code,
                    detail: message,
                };
                return Err(Abort::Outcome(self.fail(err, false).await));
            }
            Err(e) => {
                let err = MintError::Submission(e.to_string());
                return Err(Abort::Outcome(self.fail(err, false).await));
            }
        };

        info!(%signature, mint = %mint.pubkey(), "Mint transaction submitted");
        self.transition(MintState::AwaitingMintConfirmation);

        let timer = Timer::start();
        let result = self
            .poller
            .await_confirmation(&signature, self.settings.tx_timeout, cancel)
            .await
            .ok_or(Abort::Abandoned)?;
        timer.observe_duration(&self.metrics.confirmation_latency);

        let outcome = match result {
            ConfirmationResult::Confirmed => {
                if self.metadata_exists(&metadata).await {
                    self.succeed(sale, &mint.pubkey(), signature).await
                } else {
                    self.likely_failed(signature, metadata).await
                }
            }
            ConfirmationResult::FailedWithCode { code, detail } => {
                self.fail(MintError::ProgramExecution { code, detail }, true)
                    .await
            }
            ConfirmationResult::TimedOut => {
                let err = MintError::TransactionTimeout {
                    signature: signature.to_string(),
                    timeout_ms: self.settings.tx_timeout.as_millis() as u64,
                };
                self.fail(err, true).await
            }
        };

        Ok(outcome)
    }

    /// Cheap low-consistency read; an error counts as missing
    async fn metadata_exists(&self, metadata: &Pubkey) -> bool {
        match self
            .chain
            .account_exists(metadata, ConsistencyLevel::Processed)
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                warn!(%metadata, error = %e, "Metadata check failed");
                false
            }
        }
    }

    async fn succeed(
        &self,
        sale: &SaleStateSnapshot,
        mint: &Pubkey,
        signature: Signature,
    ) -> MintOutcome {
        let holding = self.reconciler.holding();

        let burned = match &sale.config.whitelist {
            Some(wl) if wl.burns() => MINT_QUANTITY.min(holding.token_balance),
            _ => 0,
        };
        let spent = if sale.config.payment.is_native() {
            sale.effective_price(&holding)
                .saturating_add(self.settings.fee_buffer_lamports)
        } else {
            0
        };

        self.reconciler.apply_mint_success(MINT_QUANTITY, burned, spent);
        self.setup.lock().take();

        self.metrics.mint_success.inc();
        info!(%signature, %mint, "Mint succeeded");

        let outcome = MintOutcome::Success {
            mint_address: *mint,
            quantity: MINT_QUANTITY,
            signature,
            explorer_url: self.settings.cluster.explorer_token_url(mint),
        };
        if let Some(alert) = AlertState::from_outcome(&outcome) {
            self.set_alert(alert);
        }
        self.transition(MintState::Succeeded);

        self.refresh_after(ConsistencyLevel::Processed).await;
        outcome
    }

    async fn likely_failed(&self, signature: Signature, metadata: Pubkey) -> MintOutcome {
        // the mint account was consumed by the confirmed transaction
        self.setup.lock().take();

        self.metrics.mint_likely_failed.inc();
        warn!(%signature, %metadata, "Mint transaction confirmed without metadata");

        let outcome = MintOutcome::LikelyFailedChargedFee {
            signature,
            metadata,
        };
        if let Some(alert) = AlertState::from_outcome(&outcome) {
            self.set_alert(alert);
        }
        self.transition(MintState::LikelyFailed);

        self.refresh_after(ConsistencyLevel::Confirmed).await;
        outcome
    }

    /// Terminal failure; a retained setup survives for a mint-only retry
    async fn fail(&self, err: MintError, refresh: bool) -> MintOutcome {
        self.metrics.mint_failed.inc();
        error!(error = %err, "Mint attempt failed");

        if let Some(alert) = AlertState::from_error(&err) {
            self.set_alert(alert);
        }
        self.transition(MintState::Failed);

        if refresh {
            self.refresh_after(ConsistencyLevel::Confirmed).await;
        }
        MintOutcome::Failed(err)
    }

    fn abandon(&self) -> MintError {
        if let Some(setup) = self.setup.lock().take() {
            debug!(mint = %setup.mint.pubkey(), "Setup discarded with abandoned attempt");
        }
        warn!("Mint attempt abandoned; submitted transactions may still execute");
        self.transition(MintState::Idle);
        MintError::Abandoned
    }

    async fn refresh_after(&self, level: ConsistencyLevel) {
        if let Err(e) = self.reconciler.refresh(level).await {
            warn!(error = %e, %level, "Post-mint refresh failed");
        }
    }
}

impl std::fmt::Debug for MintOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintOrchestrator")
            .field("state", &self.state())
            .field("settings", &self.settings)
            .field("poller", &self.poller)
            .finish()
    }
}
