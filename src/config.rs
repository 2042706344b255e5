//! Configuration for the mint client
//!
//! Loaded from a TOML file; `from_file_with_env` additionally reads `.env`
//! and applies the environment overrides listed on [`MintConfig::apply_overrides`].

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::errors::MintError;
use crate::orchestrator::OrchestratorSettings;
use crate::types::{Cluster, ConsistencyLevel, PaymentKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintConfig {
    /// Base-58 address of the sale account
    pub candy_machine_id: String,

    #[serde(default)]
    pub cluster: Cluster,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub mint: MintSettings,

    #[serde(default)]
    pub payment: PaymentDisplay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintSettings {
    /// Bound on each confirmation wait
    #[serde(default = "default_tx_timeout_ms")]
    pub tx_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Account-creation fee estimate deducted from the cached balance after a mint
    #[serde(default = "default_fee_buffer")]
    pub fee_buffer_lamports: u64,

    /// Level a transaction must reach to count as confirmed
    #[serde(default)]
    pub commitment: ConsistencyLevel,
}

/// How token-priced sales are displayed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDisplay {
    /// Decimals assumed when the sale's payment mint account cannot be read
    #[serde(default = "default_decimals")]
    pub decimals: u8,

    #[serde(default = "default_token_name")]
    pub token_name: String,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.devnet.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }
fn default_tx_timeout_ms() -> u64 { 30_000 }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_fee_buffer() -> u64 { 12_000_000 }
fn default_decimals() -> u8 { 9 }
fn default_token_name() -> String { "TOKEN".to_string() }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for MintSettings {
    fn default() -> Self {
        Self {
            tx_timeout_ms: default_tx_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            fee_buffer_lamports: default_fee_buffer(),
            commitment: ConsistencyLevel::default(),
        }
    }
}

impl Default for PaymentDisplay {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            token_name: default_token_name(),
        }
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

impl MintConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, then `.env` and process environment overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `CANDY_MACHINE_ID`, `SOLANA_RPC_HOST`, `SOLANA_NETWORK`,
    /// `TX_TIMEOUT_MS`, `SPL_TOKEN_TO_MINT_DECIMALS` and `SPL_TOKEN_TO_MINT_NAME`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(id) = lookup("CANDY_MACHINE_ID") {
            self.candy_machine_id = id;
        }
        if let Some(url) = lookup("SOLANA_RPC_HOST") {
            self.rpc.url = url;
        }
        if let Some(network) = lookup("SOLANA_NETWORK") {
            self.cluster = network
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "SOLANA_NETWORK".to_string(),
                    message,
                })?;
        }
        if let Some(timeout) = lookup("TX_TIMEOUT_MS") {
            self.mint.tx_timeout_ms = parse_override("TX_TIMEOUT_MS", &timeout)?;
        }
        if let Some(decimals) = lookup("SPL_TOKEN_TO_MINT_DECIMALS") {
            self.payment.decimals = parse_override("SPL_TOKEN_TO_MINT_DECIMALS", &decimals)?;
        }
        if let Some(name) = lookup("SPL_TOKEN_TO_MINT_NAME") {
            self.payment.token_name = name;
        }
        Ok(())
    }

    /// Parsed sale address; fails before any network call
    pub fn sale_address(&self) -> Result<Pubkey, MintError> {
        Pubkey::from_str(self.candy_machine_id.trim()).map_err(|e| {
            MintError::Configuration(format!(
                "candy machine id {:?} is not a base-58 address: {e}",
                self.candy_machine_id
            ))
        })
    }

    pub fn validate(&self) -> Result<(), MintError> {
        self.sale_address()?;
        if self.mint.tx_timeout_ms == 0 {
            return Err(MintError::Configuration(
                "mint.tx_timeout_ms must be positive".into(),
            ));
        }
        if self.mint.poll_interval_ms == 0 {
            return Err(MintError::Configuration(
                "mint.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.mint.poll_interval_ms)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            tx_timeout: Duration::from_millis(self.mint.tx_timeout_ms),
            fee_buffer_lamports: self.mint.fee_buffer_lamports,
            cluster: self.cluster,
        }
    }

    /// Currency label for prices of this payment kind
    pub fn price_label(&self, payment: &PaymentKind) -> &str {
        match payment {
            PaymentKind::Native => "SOL",
            PaymentKind::Token { .. } => &self.payment.token_name,
        }
    }
}
