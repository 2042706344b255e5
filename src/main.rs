//! candy-mint command line client
//!
//! - `status`: refresh the sale and print phase, counters, prices and the
//!   split-transaction decision
//! - `mint`: run one orchestrated mint with the configured keypair

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use candy_mint::chain::{ChainClient, RpcChainClient};
use candy_mint::config::MintConfig;
use candy_mint::gatekeeper::{FixedGatewayProvider, GatewayProvider};
use candy_mint::metrics::MintMetrics;
use candy_mint::orchestrator::{Collaborators, MintOrchestrator};
use candy_mint::tx_builder::CandyMachineTxBuilder;
use candy_mint::types::{ConsistencyLevel, MintOutcome, SaleStateSnapshot};
use candy_mint::wallet::{KeypairWallet, WalletSigner};
use candy_mint::{ConfirmationPoller, Readiness, StateReconciler};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "candy-mint.toml", global = true)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Read consistency for refreshes (processed, confirmed, finalized)
    #[arg(long, global = true)]
    commitment: Option<ConsistencyLevel>,

    /// Print prometheus metrics before exiting
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current sale state
    Status,
    /// Mint one token
    Mint {
        /// Gateway token obtained from the sale's gatekeeper network
        #[arg(long)]
        gateway_token: Option<Pubkey>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs)?;

    let config = MintConfig::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    config.validate().map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let level = args.commitment.unwrap_or(config.mint.commitment);
    let metrics = Arc::new(MintMetrics::new().context("Failed to register metrics")?);

    let result = match args.command {
        Command::Status => run_status(&config, level, metrics.clone()).await,
        Command::Mint { gateway_token } => {
            run_mint(&config, level, gateway_token, metrics.clone()).await
        }
    };

    if args.print_metrics {
        println!("{}", metrics.gather_text()?);
    }

    result
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "candy_mint=debug,info"
    } else {
        "candy_mint=info,warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Expand a leading `~/` against `$HOME`
fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{home}/{rest}"),
        _ => path.to_string(),
    }
}

struct Session {
    chain: Arc<dyn ChainClient>,
    wallet: Arc<dyn WalletSigner>,
    reconciler: Arc<StateReconciler>,
}

fn open_session(config: &MintConfig, metrics: Arc<MintMetrics>) -> Result<Session> {
    let sale_address = config
        .sale_address()
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let keypair_path = expand_home(&config.wallet.keypair_path);
    let wallet: Arc<dyn WalletSigner> = Arc::new(
        KeypairWallet::from_file(&keypair_path).context("Failed to load wallet")?,
    );
    let chain: Arc<dyn ChainClient> = Arc::new(
        RpcChainClient::new(&config.rpc.url, config.rpc_timeout())
            .with_fallback_token_decimals(config.payment.decimals),
    );

    info!(
        rpc = %config.rpc.url,
        sale = %sale_address,
        wallet = ?wallet.pubkey(),
        "Session opened"
    );

    let reconciler = Arc::new(StateReconciler::new(
        chain.clone(),
        wallet.clone(),
        sale_address,
        metrics,
    ));

    Ok(Session {
        chain,
        wallet,
        reconciler,
    })
}

/// Refresh sale and wallet balance, turning errors into their alert text
async fn refresh(session: &Session, level: ConsistencyLevel) -> Result<SaleStateSnapshot> {
    let snapshot = match session.reconciler.refresh(level).await {
        Ok(snapshot) => snapshot,
        Err(e) => bail!("{}", e.user_message()),
    };
    if let Err(e) = session.reconciler.refresh_wallet_balance(level).await {
        warn!(error = %e, "Wallet balance unavailable");
    }
    Ok(snapshot)
}

async fn run_status(
    config: &MintConfig,
    level: ConsistencyLevel,
    metrics: Arc<MintMetrics>,
) -> Result<()> {
    let session = open_session(config, metrics)?;
    let snapshot = refresh(&session, level).await?;
    let view = session.reconciler.view();
    let payment = &snapshot.config.payment;
    let label = config.price_label(payment);

    println!("Sale:        {}", snapshot.config.address);
    println!("Phase:       {}", snapshot.phase().label());
    println!(
        "Items:       {} / {} redeemed, {} remaining",
        snapshot.items_redeemed, snapshot.items_available, snapshot.items_remaining
    );
    println!(
        "Price:       {} {label}",
        payment.to_ui_amount(snapshot.config.price)
    );
    if let Some(wl) = &snapshot.config.whitelist {
        if let Some(discount) = wl.discount_price {
            println!(
                "Discount:    {} {label} for whitelist holders",
                payment.to_ui_amount(discount)
            );
        }
        println!(
            "Whitelist:   {} ({}), you hold {}",
            wl.mint,
            if wl.burns() { "burned on mint" } else { "kept" },
            view.holding.token_balance
        );
        println!(
            "You pay:     {} {label}",
            payment.to_ui_amount(snapshot.effective_price(&view.holding))
        );
    }
    if let Some(go_live) = snapshot.config.go_live_date {
        let date = chrono::DateTime::from_timestamp(go_live, 0)
            .map(|d| d.to_rfc2822())
            .unwrap_or_else(|| go_live.to_string());
        println!("Go live:     {date}");
    }
    if let Some(gatekeeper) = &snapshot.config.gatekeeper {
        println!("Gatekeeper:  {}", gatekeeper.network);
    }
    println!(
        "Tx size:     ~{} bytes ({})",
        snapshot.estimated_tx_size,
        if snapshot.needs_split_transaction {
            "setup + mint"
        } else {
            "single transaction"
        }
    );
    if let Some(owner) = session.wallet.pubkey() {
        println!("Wallet:      {owner} ({} SOL)", view.balance.sol());
    }

    let readiness = Readiness::evaluate(
        session.wallet.can_sign(),
        Some(&snapshot),
        &view.holding,
    );
    println!("Readiness:   {}", readiness.describe());

    Ok(())
}

async fn run_mint(
    config: &MintConfig,
    level: ConsistencyLevel,
    gateway_token: Option<Pubkey>,
    metrics: Arc<MintMetrics>,
) -> Result<()> {
    let session = open_session(config, metrics.clone())?;
    let snapshot = refresh(&session, level).await?;

    let gateway: Arc<dyn GatewayProvider> =
        match (snapshot.config.gatekeeper.as_ref(), gateway_token) {
            (Some(gatekeeper), Some(token)) => {
                Arc::new(FixedGatewayProvider::new(gatekeeper.network, token))
            }
            _ => Arc::new(FixedGatewayProvider::none()),
        };

    let orchestrator = MintOrchestrator::new(
        Collaborators {
            chain: session.chain.clone(),
            wallet: session.wallet.clone(),
            builder: Arc::new(CandyMachineTxBuilder::new(session.chain.clone())),
            gateway,
        },
        session.reconciler.clone(),
        ConfirmationPoller::new(session.chain.clone(), config.poll_interval(), level),
        config.orchestrator_settings(),
        metrics,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; no longer waiting for confirmation");
            on_interrupt.cancel();
        }
    });

    let outcome = match orchestrator.mint(&cancel).await {
        Ok(outcome) => outcome,
        Err(e) => bail!("{}", e.user_message()),
    };

    println!("{}", outcome.user_message());
    match &outcome {
        MintOutcome::Success {
            mint_address,
            signature,
            explorer_url,
            ..
        } => {
            println!("Mint:        {mint_address}");
            println!("Signature:   {signature}");
            println!("Explorer:    {explorer_url}");
            if let Some(snapshot) = session.reconciler.snapshot() {
                println!("Remaining:   {}", snapshot.items_remaining);
            }
            Ok(())
        }
        MintOutcome::LikelyFailedChargedFee { signature, .. } => {
            bail!("mint transaction {signature} confirmed without metadata")
        }
        MintOutcome::Failed(err) => bail!("{err}"),
    }
}
