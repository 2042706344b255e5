//! Test Utilities Module
//!
//! In-memory stand-ins for the external collaborators: chain client, wallet
//! and transaction builder. Everything is deterministic and network-free.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    rent::Rent,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::chain::addresses::CANDY_MACHINE_PROGRAM_ID;
use crate::chain::{CandyMachineAccount, ChainClient, SignatureStatus};
use crate::errors::{ChainError, ChainResult};
use crate::tx_builder::{
    CandyMachineTxBuilder, MintRequest, MintTransaction, MintTransactionBuilder,
};
use crate::types::{ConsistencyLevel, EndCondition, SaleStateSnapshot};
use crate::wallet::WalletSigner;

/// Cluster time used by every mock
pub const NOW: i64 = 1_700_000_000;

pub const MOCK_ENDPOINT: &str = "mock://localnet";

/// Public sale, live for an hour, 10 of 100 items redeemed, 1 SOL each
pub fn sale_account() -> CandyMachineAccount {
    let authority = Pubkey::new_unique();
    CandyMachineAccount {
        address: Pubkey::new_unique(),
        authority,
        wallet: authority,
        token_mint: None,
        token_decimals: 9,
        items_redeemed: 10,
        items_available: 100,
        price: 1_000_000_000,
        symbol: "TEST".to_string(),
        retain_authority: true,
        go_live_date: Some(NOW - 3600),
        end_condition: EndCondition::None,
        whitelist: None,
        gatekeeper: None,
    }
}

type StatusScript = VecDeque<ChainResult<Option<SignatureStatus>>>;

/// Observable side effects, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Submitted {
        signature: Signature,
        instructions: usize,
    },
    StatusQueried {
        signature: Signature,
        status: Option<SignatureStatus>,
    },
}

#[derive(Default)]
struct MockChainState {
    sale: Option<CandyMachineAccount>,
    collection_mint: Option<Pubkey>,
    now: i64,
    read_failure: Option<ChainError>,
    submit_failure: Option<ChainError>,
    metadata_missing: bool,
    token_balances: HashMap<(Pubkey, Pubkey), u64>,
    native_balances: HashMap<Pubkey, u64>,
    next_submissions: VecDeque<StatusScript>,
    status_scripts: HashMap<Signature, StatusScript>,
    status_queries: HashMap<Signature, usize>,
    sale_fetches: usize,
    events: Vec<ChainEvent>,
    submitted: Vec<Transaction>,
}

/// In-memory chain
///
/// Submitted transactions confirm immediately unless a status script was
/// queued with [`MockChainClient::script_next_submission`]. A confirmed
/// transaction that calls the sale program "lands": the sale's redeemed count
/// goes up and a burn-mode whitelist token is consumed, unless metadata
/// creation is switched off with [`MockChainClient::set_metadata_missing`].
pub struct MockChainClient {
    address: Pubkey,
    state: Mutex<MockChainState>,
}

impl MockChainClient {
    pub fn new(account: CandyMachineAccount) -> Self {
        Self {
            address: account.address,
            state: Mutex::new(MockChainState {
                sale: Some(account),
                now: NOW,
                ..Default::default()
            }),
        }
    }

    pub fn sale_address(&self) -> Pubkey {
        self.address
    }

    pub fn remove_sale(&self) {
        self.state.lock().sale = None;
    }

    pub fn update_sale(&self, f: impl FnOnce(&mut CandyMachineAccount)) {
        if let Some(sale) = self.state.lock().sale.as_mut() {
            f(sale);
        }
    }

    pub fn set_collection_mint(&self, mint: Option<Pubkey>) {
        self.state.lock().collection_mint = mint;
    }

    pub fn set_now(&self, now: i64) {
        self.state.lock().now = now;
    }

    /// Every read fails with `err` until reset with `None`
    pub fn fail_reads(&self, err: Option<ChainError>) {
        self.state.lock().read_failure = err;
    }

    pub fn fail_submissions(&self, err: Option<ChainError>) {
        self.state.lock().submit_failure = err;
    }

    pub fn set_metadata_missing(&self, missing: bool) {
        self.state.lock().metadata_missing = missing;
    }

    pub fn set_token_balance(&self, owner: Pubkey, mint: Pubkey, amount: u64) {
        self.state.lock().token_balances.insert((owner, mint), amount);
    }

    pub fn set_native_balance(&self, owner: Pubkey, lamports: u64) {
        self.state.lock().native_balances.insert(owner, lamports);
    }

    /// Statuses returned for `signature`, in order; the last one repeats
    pub fn script_status(&self, signature: Signature, statuses: Vec<ChainResult<Option<SignatureStatus>>>) {
        self.state
            .lock()
            .status_scripts
            .insert(signature, statuses.into());
    }

    /// Statuses for the next submitted transaction, whose signature is not known upfront
    pub fn script_next_submission(&self, statuses: Vec<ChainResult<Option<SignatureStatus>>>) {
        self.state.lock().next_submissions.push_back(statuses.into());
    }

    pub fn status_queries(&self, signature: &Signature) -> usize {
        self.state
            .lock()
            .status_queries
            .get(signature)
            .copied()
            .unwrap_or(0)
    }

    pub fn sale_fetches(&self) -> usize {
        self.state.lock().sale_fetches
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.state.lock().events.clone()
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.state.lock().submitted.clone()
    }

    fn check_reads(state: &MockChainState) -> ChainResult<()> {
        match &state.read_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn lands(script: Option<&StatusScript>) -> bool {
        match script.and_then(|s| s.back()) {
            None => true,
            Some(Ok(Some(status))) => status.err.is_none(),
            Some(_) => false,
        }
    }

    fn apply_landed_mint(state: &mut MockChainState, payer: Pubkey) {
        let Some(sale) = state.sale.as_mut() else {
            return;
        };
        sale.items_redeemed += 1;

        if let Some(wl) = sale.whitelist.as_ref().filter(|wl| wl.burns()) {
            if let Some(balance) = state.token_balances.get_mut(&(payer, wl.mint)) {
                *balance = balance.saturating_sub(1);
            }
        }
        if sale.token_mint.is_none() {
            let price = sale.price;
            if let Some(lamports) = state.native_balances.get_mut(&payer) {
                *lamports = lamports.saturating_sub(price);
            }
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn endpoint(&self) -> &str {
        MOCK_ENDPOINT
    }

    async fn fetch_sale(
        &self,
        address: &Pubkey,
        _level: ConsistencyLevel,
    ) -> ChainResult<CandyMachineAccount> {
        let mut state = self.state.lock();
        Self::check_reads(&state)?;
        state.sale_fetches += 1;

        state
            .sale
            .clone()
            .filter(|sale| sale.address == *address)
            .ok_or_else(|| ChainError::AccountNotFound {
                address: address.to_string(),
            })
    }

    async fn fetch_collection_mint(
        &self,
        _sale: &Pubkey,
        _level: ConsistencyLevel,
    ) -> ChainResult<Option<Pubkey>> {
        let state = self.state.lock();
        Self::check_reads(&state)?;
        Ok(state.collection_mint)
    }

    async fn account_exists(&self, _address: &Pubkey, _level: ConsistencyLevel) -> ChainResult<bool> {
        let state = self.state.lock();
        Self::check_reads(&state)?;
        Ok(!state.metadata_missing)
    }

    async fn token_balance(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
        _level: ConsistencyLevel,
    ) -> ChainResult<u64> {
        let state = self.state.lock();
        Self::check_reads(&state)?;
        Ok(state.token_balances.get(&(*owner, *mint)).copied().unwrap_or(0))
    }

    async fn native_balance(&self, owner: &Pubkey, _level: ConsistencyLevel) -> ChainResult<u64> {
        let state = self.state.lock();
        Self::check_reads(&state)?;
        Ok(state.native_balances.get(owner).copied().unwrap_or(0))
    }

    async fn unix_timestamp(&self) -> ChainResult<i64> {
        let state = self.state.lock();
        Self::check_reads(&state)?;
        Ok(state.now)
    }

    async fn latest_blockhash(&self) -> ChainResult<Hash> {
        Ok(Hash::new_unique())
    }

    async fn rent_exempt_minimum(&self, data_len: usize) -> ChainResult<u64> {
        Ok(Rent::default().minimum_balance(data_len))
    }

    async fn submit_transaction(&self, transaction: &Transaction) -> ChainResult<Signature> {
        let mut state = self.state.lock();
        if let Some(err) = &state.submit_failure {
            return Err(err.clone());
        }
        transaction.verify().map_err(|e| ChainError::Rpc {
            message: format!("signature verification failed: {e}"),
        })?;

        let signature = transaction.signatures[0];
        let script = state.next_submissions.pop_front();

        let calls_sale_program = transaction
            .message
            .account_keys
            .contains(&CANDY_MACHINE_PROGRAM_ID);
        if calls_sale_program && !state.metadata_missing && Self::lands(script.as_ref()) {
            let payer = transaction.message.account_keys[0];
            Self::apply_landed_mint(&mut state, payer);
        }

        if let Some(script) = script {
            state.status_scripts.insert(signature, script);
        }
        state.events.push(ChainEvent::Submitted {
            signature,
            instructions: transaction.message.instructions.len(),
        });
        state.submitted.push(transaction.clone());
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> ChainResult<Option<SignatureStatus>> {
        let mut state = self.state.lock();
        *state.status_queries.entry(*signature).or_default() += 1;

        let submitted = state.submitted.iter().any(|tx| tx.signatures[0] == *signature);
        let result = match state.status_scripts.get_mut(signature) {
            Some(script) if script.len() > 1 => script
                .pop_front()
                .unwrap_or(Ok(None)),
            Some(script) => script.front().cloned().unwrap_or(Ok(None)),
            None if submitted => Ok(Some(SignatureStatus::confirmed_at(
                ConsistencyLevel::Confirmed,
            ))),
            None => Ok(None),
        };

        if let Ok(status) = &result {
            state.events.push(ChainEvent::StatusQueried {
                signature: *signature,
                status: status.clone(),
            });
        }
        result
    }
}

/// Keypair wallet that counts signatures and can be disconnected or broken
pub struct MockWallet {
    keypair: Option<Arc<Keypair>>,
    fail_signing: AtomicBool,
    sign_count: AtomicUsize,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            keypair: Some(Arc::new(Keypair::new())),
            fail_signing: AtomicBool::new(false),
            sign_count: AtomicUsize::new(0),
        }
    }

    /// No wallet connected
    pub fn disconnected() -> Self {
        Self {
            keypair: None,
            ..Self::new()
        }
    }

    pub fn address(&self) -> Pubkey {
        self.keypair
            .as_ref()
            .map(|k| k.pubkey())
            .expect("wallet is disconnected")
    }

    pub fn set_fail_signing(&self, fail: bool) {
        self.fail_signing.store(fail, Ordering::SeqCst);
    }

    pub fn sign_count(&self) -> usize {
        self.sign_count.load(Ordering::SeqCst)
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn pubkey(&self) -> Option<Pubkey> {
        self.keypair.as_ref().map(|k| k.pubkey())
    }

    async fn sign_transaction(&self, transaction: &mut Transaction) -> ChainResult<()> {
        self.sign_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(ChainError::Signing("user rejected the request".into()));
        }
        let keypair = self
            .keypair
            .as_ref()
            .ok_or_else(|| ChainError::Signing("no wallet connected".into()))?;
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[keypair.as_ref()], blockhash)
            .map_err(|e| ChainError::Signing(e.to_string()))
    }
}

/// Real candy machine builder with switchable build failures
pub struct MockTxBuilder {
    inner: CandyMachineTxBuilder,
    fail_setup: AtomicBool,
    fail_mint: AtomicBool,
    setup_builds: AtomicUsize,
    mint_builds: AtomicUsize,
}

impl MockTxBuilder {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self {
            inner: CandyMachineTxBuilder::new(chain),
            fail_setup: AtomicBool::new(false),
            fail_mint: AtomicBool::new(false),
            setup_builds: AtomicUsize::new(0),
            mint_builds: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_setup(&self, fail: bool) {
        self.fail_setup.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_mint(&self, fail: bool) {
        self.fail_mint.store(fail, Ordering::SeqCst);
    }

    pub fn setup_builds(&self) -> usize {
        self.setup_builds.load(Ordering::SeqCst)
    }

    pub fn mint_builds(&self) -> usize {
        self.mint_builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MintTransactionBuilder for MockTxBuilder {
    async fn build_setup(
        &self,
        sale: &SaleStateSnapshot,
        payer: &Pubkey,
        mint: &Keypair,
    ) -> ChainResult<Transaction> {
        self.setup_builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup.load(Ordering::SeqCst) {
            return Err(ChainError::Build("mock setup build failure".into()));
        }
        self.inner.build_setup(sale, payer, mint).await
    }

    async fn build_mint(&self, request: MintRequest<'_>) -> ChainResult<MintTransaction> {
        self.mint_builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_mint.load(Ordering::SeqCst) {
            return Err(ChainError::Build("mock mint build failure".into()));
        }
        self.inner.build_mint(request).await
    }
}
