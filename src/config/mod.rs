//! Configuration module
//!
//! Handles loading and validation of the application configuration.
//! Live campaign parameters that an operator may edit mid-run are in
//! [`settings`] and are re-read every cycle.

pub mod settings;

pub use settings::{
    BaseAsset, CampaignSettings, FileSettings, RoutingMode, SettingsSource, SharedSettings,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub protocols: ProtocolsConfig,
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.rpc.primary_url.is_empty(), "rpc.primary_url must be set");
        anyhow::ensure!(self.rpc.max_retries > 0, "rpc.max_retries must be positive");
        anyhow::ensure!(
            self.execution.compute_unit_limit > 0 && self.execution.compute_unit_limit <= 1_400_000,
            "compute_unit_limit must be between 1 and 1400000"
        );
        anyhow::ensure!(
            self.execution.confirm_timeout_secs > 0,
            "confirm_timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.protocols.mints.stable_decimals <= 18,
            "stable_decimals must be at most 18"
        );

        // Fail at startup rather than on the first swap
        self.protocols.raydium.amm_program()?;
        self.protocols.raydium.amm_authority()?;
        self.protocols.mints.native()?;
        self.protocols.mints.stable()?;
        Ok(())
    }

    /// Create a default config for testing
    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Self {
            rpc: RpcConfig {
                primary_url: "https://api.mainnet-beta.solana.com".to_string(),
                fallback_urls: vec![],
                request_timeout_ms: 10000,
                max_retries: 3,
            },
            execution: ExecutionConfig::default(),
            protocols: ProtocolsConfig::default(),
            campaign: CampaignConfig {
                settings_path: PathBuf::from("settings.yaml"),
                wallets_path: PathBuf::from("private_keys.txt"),
                rng_seed: Some(7),
            },
            telemetry: TelemetryConfig::default(),
        }
    }
}

fn parse_pubkey(value: &str, field: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("Invalid {}: {}", field, value))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub primary_url: String,
    #[serde(default)]
    pub fallback_urls: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_request_timeout() -> u64 { 10000 }
fn default_max_retries() -> u32 { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    /// Micro-lamports per compute unit
    #[serde(default = "default_compute_unit_price")]
    pub compute_unit_price: u64,
    #[serde(default = "default_true")]
    pub simulate_before_submit: bool,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
}

fn default_compute_unit_limit() -> u32 { 200_000 }
fn default_compute_unit_price() -> u64 { 100_000 }
fn default_confirm_timeout() -> u64 { 60 }
fn default_true() -> bool { true }

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            compute_unit_limit: default_compute_unit_limit(),
            compute_unit_price: default_compute_unit_price(),
            simulate_before_submit: true,
            confirm_timeout_secs: default_confirm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    #[serde(default)]
    pub raydium: RaydiumConfig,
    #[serde(default)]
    pub jupiter: JupiterConfig,
    #[serde(default)]
    pub mints: MintsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaydiumConfig {
    #[serde(default = "default_amm_program")]
    pub amm_program_id: String,
    #[serde(default = "default_amm_authority")]
    pub amm_authority: String,
    /// Pool discovery endpoint, queried as `{discovery_url}/{mintA},{mintB}`
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,
    #[serde(default = "default_dex_id")]
    pub dex_id: String,
}

fn default_amm_program() -> String { "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string() }
fn default_amm_authority() -> String { "5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1".to_string() }
fn default_discovery_url() -> String { "https://api.dexscreener.com/latest/dex/tokens".to_string() }
fn default_dex_id() -> String { "raydium".to_string() }

impl Default for RaydiumConfig {
    fn default() -> Self {
        Self {
            amm_program_id: default_amm_program(),
            amm_authority: default_amm_authority(),
            discovery_url: default_discovery_url(),
            dex_id: default_dex_id(),
        }
    }
}

impl RaydiumConfig {
    pub fn amm_program(&self) -> Result<Pubkey> {
        parse_pubkey(&self.amm_program_id, "raydium.amm_program_id")
    }

    pub fn amm_authority(&self) -> Result<Pubkey> {
        parse_pubkey(&self.amm_authority, "raydium.amm_authority")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterConfig {
    #[serde(default = "default_jupiter_api")]
    pub api_url: String,
    #[serde(default = "default_jupiter_price_api")]
    pub price_api_url: String,
}

fn default_jupiter_api() -> String { "https://quote-api.jup.ag/v6".to_string() }
fn default_jupiter_price_api() -> String { "https://api.jup.ag/price/v2".to_string() }

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_url: default_jupiter_api(),
            price_api_url: default_jupiter_price_api(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintsConfig {
    #[serde(default = "default_native_mint")]
    pub native_mint: String,
    #[serde(default = "default_stable_mint")]
    pub stable_mint: String,
    #[serde(default = "default_stable_decimals")]
    pub stable_decimals: u8,
}

fn default_native_mint() -> String { "So11111111111111111111111111111111111111112".to_string() }
fn default_stable_mint() -> String { "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string() }
fn default_stable_decimals() -> u8 { 6 }

impl Default for MintsConfig {
    fn default() -> Self {
        Self {
            native_mint: default_native_mint(),
            stable_mint: default_stable_mint(),
            stable_decimals: default_stable_decimals(),
        }
    }
}

impl MintsConfig {
    pub fn native(&self) -> Result<Pubkey> {
        parse_pubkey(&self.native_mint, "mints.native_mint")
    }

    pub fn stable(&self) -> Result<Pubkey> {
        parse_pubkey(&self.stable_mint, "mints.stable_mint")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Live settings file, re-read every cycle
    pub settings_path: PathBuf,
    /// One secret key per line
    pub wallets_path: PathBuf,
    /// Fixed seed for reproducible timing and direction choices
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    pub log_file: Option<String>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub enable_metrics: bool,
}

fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            log_file: None,
            metrics_port: default_metrics_port(),
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
rpc:
  primary_url: "https://api.mainnet-beta.solana.com"
campaign:
  settings_path: "settings.yaml"
  wallets_path: "private_keys.txt"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rpc.max_retries, 3);
        assert_eq!(config.execution.compute_unit_limit, 200_000);
        assert!(config.execution.simulate_before_submit);
        assert_eq!(config.protocols.raydium.dex_id, "raydium");
        assert_eq!(config.protocols.mints.stable_decimals, 6);
        assert_eq!(config.campaign.rng_seed, None);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_invalid_mint_rejected() {
        let yaml = r#"
rpc:
  primary_url: "https://api.mainnet-beta.solana.com"
protocols:
  mints:
    native_mint: "not-a-pubkey"
campaign:
  settings_path: "settings.yaml"
  wallets_path: "private_keys.txt"
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("mints.native_mint"));
    }

    #[test]
    fn test_default_for_test_is_valid() {
        let config = AppConfig::default_for_test();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.protocols.mints.native().unwrap(),
            spl_token::native_mint::id()
        );
    }
}
