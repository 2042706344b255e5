use solana_sdk::{
    instruction::InstructionError, pubkey::Pubkey, signature::Signer,
    transaction::TransactionError,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{oversized_sale, Harness, STARTING_BALANCE};
use crate::alert::AlertSeverity;
use crate::chain::SignatureStatus;
use crate::errors::{ChainError, MintError};
use crate::gatekeeper::FixedGatewayProvider;
use crate::orchestrator::{MintState, Readiness};
use crate::test_utils::{sale_account, ChainEvent, MockWallet};
use crate::types::{ConsistencyLevel, MintOutcome};

fn program_failure(code: u32) -> SignatureStatus {
    SignatureStatus::failed(TransactionError::InstructionError(
        4,
        InstructionError::Custom(code),
    ))
}

fn split_harness() -> Harness {
    let wl_mint = Pubkey::new_unique();
    let network = Pubkey::new_unique();
    let harness = Harness::build(
        oversized_sale(wl_mint, network),
        MockWallet::new(),
        FixedGatewayProvider::new(network, Pubkey::new_unique()),
    );
    harness.chain.set_collection_mint(Some(Pubkey::new_unique()));
    harness
        .chain
        .set_token_balance(harness.wallet.address(), wl_mint, 1);
    harness
}

#[tokio::test(start_paused = true)]
async fn test_single_transaction_mint_succeeds() {
    let h = Harness::new(sale_account());
    h.refresh().await;

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    let MintOutcome::Success {
        mint_address,
        quantity,
        explorer_url,
        ..
    } = &outcome
    else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(*quantity, 1);
    assert_eq!(explorer_url, &format!("https://solscan.io/token/{mint_address}"));

    // setup and mint in one transaction
    let submitted = h.chain.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].message.instructions.len(), 5);
    assert_eq!(h.wallet.sign_count(), 1);

    assert_eq!(h.orchestrator.state(), MintState::Succeeded);
    assert_eq!(h.reconciler.snapshot().unwrap().items_remaining, 89);
    assert_eq!(
        h.reconciler.balance().lamports,
        STARTING_BALANCE - 1_000_000_000 - 12_000_000
    );
    assert_eq!(h.metrics.mint_success.get(), 1);
    assert_eq!(h.metrics.setup_transactions.get(), 0);

    let alert = h.orchestrator.alert().unwrap();
    assert_eq!(alert.severity, AlertSeverity::Success);
    assert_eq!(alert.message, "Congratulations! Mint succeeded!");
}

#[tokio::test(start_paused = true)]
async fn test_split_mint_confirms_setup_before_minting() {
    let h = split_harness();
    h.refresh().await;
    let snapshot = h.reconciler.snapshot().unwrap();
    assert_eq!(snapshot.estimated_tx_size, 1241);
    assert!(snapshot.needs_split_transaction);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();
    assert!(outcome.is_success(), "{outcome:?}");

    let submitted = h.chain.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].message.instructions.len(), 4);
    // mint_nft + set_collection_during_mint
    assert_eq!(submitted[1].message.instructions.len(), 2);

    let setup_sig = submitted[0].signatures[0];
    let mint_sig = submitted[1].signatures[0];
    let events = h.chain.events();
    let setup_confirmed = events
        .iter()
        .position(|e| {
            matches!(e, ChainEvent::StatusQueried { signature, status: Some(s) }
                if *signature == setup_sig && s.level >= ConsistencyLevel::Confirmed)
        })
        .unwrap();
    let mint_submitted = events
        .iter()
        .position(|e| matches!(e, ChainEvent::Submitted { signature, .. } if *signature == mint_sig))
        .unwrap();
    assert!(setup_confirmed < mint_submitted);

    assert_eq!(h.wallet.sign_count(), 2);
    assert_eq!(h.metrics.setup_transactions.get(), 1);
    assert!(h.orchestrator.setup_state().is_none());
    // burn-mode whitelist token consumed
    assert_eq!(h.reconciler.holding().token_balance, 0);
}

#[tokio::test(start_paused = true)]
async fn test_metadata_missing_is_likely_failed() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    h.chain.set_metadata_missing(true);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, MintOutcome::LikelyFailedChargedFee { .. }));
    assert_eq!(h.orchestrator.state(), MintState::LikelyFailed);
    assert_eq!(h.reconciler.snapshot().unwrap().items_remaining, 90);
    assert_eq!(h.reconciler.balance().lamports, STARTING_BALANCE);
    assert_eq!(h.metrics.mint_likely_failed.get(), 1);

    let alert = h.orchestrator.alert().unwrap();
    assert_eq!(alert.hide_after, Some(Duration::from_secs(8)));
    assert!(alert.message.starts_with("Mint likely failed!"));
}

#[tokio::test(start_paused = true)]
async fn test_sold_out_code_reports_sold_out() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    h.chain
        .script_next_submission(vec![Ok(None), Ok(Some(program_failure(0x137)))]);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    match &outcome {
        MintOutcome::Failed(MintError::ProgramExecution { code, .. }) => {
            assert_eq!(*code, Some(311))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(outcome.user_message(), "SOLD OUT!");
    assert_eq!(h.orchestrator.alert().unwrap().message, "SOLD OUT!");
    assert_eq!(h.orchestrator.state(), MintState::Failed);
    assert_eq!(h.reconciler.snapshot().unwrap().items_remaining, 90);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_ambiguous_failure() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    h.chain.script_next_submission(vec![Ok(None)]);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    let MintOutcome::Failed(err) = &outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert!(matches!(err, MintError::TransactionTimeout { timeout_ms: 30_000, .. }));
    assert!(outcome.user_message().contains("Verify"));
    assert_eq!(h.orchestrator.alert().unwrap().severity, AlertSeverity::Warning);
    assert_eq!(h.metrics.mint_failed.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_setup_failure_aborts_before_mint() {
    let h = split_harness();
    h.refresh().await;
    h.chain
        .script_next_submission(vec![Ok(Some(program_failure(0x1)))]);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, MintOutcome::Failed(MintError::SetupFailed(_))));
    assert_eq!(h.chain.submitted().len(), 1);
    assert_eq!(h.builder.mint_builds(), 0);
    assert!(h.orchestrator.setup_state().is_none());
    assert_eq!(h.orchestrator.state(), MintState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_setup_timeout_aborts_before_mint() {
    let h = split_harness();
    h.refresh().await;
    h.chain.script_next_submission(vec![Ok(None)]);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, MintOutcome::Failed(MintError::SetupFailed(_))));
    assert_eq!(h.builder.mint_builds(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_setup_retained_after_failed_mint() {
    let h = split_harness();
    h.refresh().await;
    h.chain.script_next_submission(vec![Ok(Some(SignatureStatus::confirmed_at(
        ConsistencyLevel::Confirmed,
    )))]);
    h.chain
        .script_next_submission(vec![Ok(Some(program_failure(0x135)))]);

    let first = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        first.user_message(),
        "Insufficient funds to mint. Please fund your wallet."
    );
    let setup = h.orchestrator.setup_state().expect("setup retained");

    // a read-only refresh leaves the retained setup alone
    h.reconciler
        .refresh(ConsistencyLevel::Confirmed)
        .await
        .unwrap();
    assert!(h.orchestrator.setup_state().is_some());

    let second = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();
    let MintOutcome::Success { mint_address, .. } = second else {
        panic!("unexpected outcome: {second:?}");
    };
    assert_eq!(mint_address, setup.mint.pubkey());

    // only one setup transaction ever built; the retry was mint-only
    assert_eq!(h.builder.setup_builds(), 1);
    let submitted = h.chain.submitted();
    assert_eq!(submitted.len(), 3);
    assert_eq!(submitted[2].message.instructions.len(), 2);
    assert!(h.orchestrator.setup_state().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fresh_mint_after_success_builds_new_setup() {
    let h = split_harness();
    h.refresh().await;

    let first = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();
    let MintOutcome::Success { mint_address: first_mint, .. } = first else {
        panic!("unexpected outcome: {first:?}");
    };

    // whitelist token burned; the public phase still accepts a full-price mint
    assert_eq!(h.reconciler.holding().token_balance, 0);
    let second = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();
    let MintOutcome::Success { mint_address: second_mint, .. } = second else {
        panic!("unexpected outcome: {second:?}");
    };

    assert_ne!(first_mint, second_mint);
    assert_eq!(h.builder.setup_builds(), 2);
    assert_eq!(h.chain.submitted().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_second_mint_rejected_while_in_flight() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    h.chain.script_next_submission(vec![Ok(None)]);

    let mut states = h.orchestrator.subscribe();
    let cancel = CancellationToken::new();
    let orchestrator = h.orchestrator.clone();
    let token = cancel.clone();
    let first = tokio::spawn(async move { orchestrator.mint(&token).await });

    states
        .wait_for(|s| *s == MintState::AwaitingMintConfirmation)
        .await
        .unwrap();

    let err = h
        .orchestrator
        .mint(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, MintError::MintInProgress);
    assert_eq!(h.orchestrator.discard_setup(), Err(MintError::MintInProgress));

    cancel.cancel();
    let result = first.await.unwrap();
    assert_eq!(result, Err(MintError::Abandoned));
    assert_eq!(h.orchestrator.state(), MintState::Idle);
    assert_eq!(h.wallet.sign_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_attempt_does_not_block_next_mint() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    h.chain.script_next_submission(vec![Ok(None)]);

    let mut states = h.orchestrator.subscribe();
    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.mint(&CancellationToken::new()).await });

    states
        .wait_for(|s| *s == MintState::AwaitingMintConfirmation)
        .await
        .unwrap();
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    // the dropped attempt never reached a terminal state
    assert_eq!(h.orchestrator.state(), MintState::AwaitingMintConfirmation);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(h.orchestrator.state(), MintState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_setup_discards_it() {
    let h = split_harness();
    h.refresh().await;
    h.chain.script_next_submission(vec![Ok(None)]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        trigger.cancel();
    });

    let err = h.orchestrator.mint(&cancel).await.unwrap_err();

    assert_eq!(err, MintError::Abandoned);
    assert!(h.orchestrator.setup_state().is_none());
    assert_eq!(h.orchestrator.state(), MintState::Idle);
    assert_eq!(h.builder.mint_builds(), 0);
}

#[tokio::test]
async fn test_wallet_not_ready_stays_idle() {
    let h = Harness::build(
        sale_account(),
        MockWallet::disconnected(),
        FixedGatewayProvider::none(),
    );

    assert_eq!(h.orchestrator.readiness(), Readiness::WalletNotReady);
    let err = h
        .orchestrator
        .mint(&CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, MintError::PreconditionNotMet(Readiness::WalletNotReady));
    assert!(!err.is_alert());
    assert_eq!(h.orchestrator.state(), MintState::Idle);
    assert_eq!(h.metrics.mint_attempts.get(), 0);
    assert!(h.chain.submitted().is_empty());
}

#[tokio::test]
async fn test_mint_before_refresh_is_not_loaded() {
    let h = Harness::new(sale_account());
    let err = h
        .orchestrator
        .mint(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, MintError::PreconditionNotMet(Readiness::SaleNotLoaded));
}

#[tokio::test]
async fn test_sold_out_sale_is_precondition() {
    let mut account = sale_account();
    account.items_redeemed = account.items_available;
    let h = Harness::new(account);
    h.refresh().await;

    let err = h
        .orchestrator
        .mint(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, MintError::PreconditionNotMet(Readiness::SoldOut));
}

#[tokio::test]
async fn test_missing_gateway_token_is_precondition() {
    let h = Harness::build(
        oversized_sale(Pubkey::new_unique(), Pubkey::new_unique()),
        MockWallet::new(),
        FixedGatewayProvider::none(),
    );
    h.refresh().await;

    let err = h
        .orchestrator
        .mint(&CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        MintError::PreconditionNotMet(Readiness::GatewayTokenMissing)
    );
    assert!(h.chain.submitted().is_empty());
    assert_eq!(h.builder.setup_builds(), 0);
}

#[tokio::test]
async fn test_submission_error_leaves_counters_untouched() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    let before = h.reconciler.view();
    let fetches = h.chain.sale_fetches();
    h.chain.fail_submissions(Some(ChainError::Rpc {
        message: "blockhash not found".into(),
    }));

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, MintOutcome::Failed(MintError::Submission(_))));
    assert_eq!(h.reconciler.view(), before);
    assert_eq!(h.chain.sale_fetches(), fetches);
    assert_eq!(h.orchestrator.state(), MintState::Failed);
}

#[tokio::test]
async fn test_preflight_sold_out_rejection_shows_program_message() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    let before = h.reconciler.view();
    let fetches = h.chain.sale_fetches();
    h.chain.fail_submissions(Some(ChainError::Transaction {
        code: Some(0x137),
        message: "Error processing Instruction 4: custom program error: 0x137".into(),
    }));

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    match &outcome {
        MintOutcome::Failed(MintError::ProgramExecution { code, .. }) => {
            assert_eq!(*code, Some(311))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(outcome.user_message(), "SOLD OUT!");
    assert_eq!(h.orchestrator.alert().unwrap().message, "SOLD OUT!");
    assert_eq!(h.reconciler.view(), before);
    assert_eq!(h.chain.sale_fetches(), fetches);
    assert_eq!(h.orchestrator.state(), MintState::Failed);
}

#[tokio::test]
async fn test_rejected_signature_fails_attempt() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    h.wallet.set_fail_signing(true);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, MintOutcome::Failed(MintError::Submission(_))));
    assert!(h.chain.submitted().is_empty());
}

#[tokio::test]
async fn test_build_error_fails_attempt() {
    let h = Harness::new(sale_account());
    h.refresh().await;
    h.builder.set_fail_mint(true);

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, MintOutcome::Failed(MintError::Submission(_))));
    assert_eq!(h.wallet.sign_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_token_payment_keeps_native_balance() {
    let mut account = sale_account();
    account.token_mint = Some(Pubkey::new_unique());
    account.token_decimals = 6;
    let h = Harness::new(account);
    h.refresh().await;

    let outcome = h.orchestrator.mint(&CancellationToken::new()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(h.reconciler.balance().lamports, STARTING_BALANCE);
}
