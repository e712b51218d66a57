//! Live campaign settings
//!
//! The campaign parameters an operator may change while a campaign runs:
//! - Target token and target volume
//! - Routing mode and base asset
//! - Trade size, slippage and pacing
//!
//! The orchestrator calls [`SettingsSource::load`] at the start of every
//! cycle, so no implementation may cache across calls.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Backend a swap is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Direct constant-product pool swap built locally
    Pool,
    /// Pre-built transaction from the quote aggregator
    Aggregator,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Pool => write!(f, "pool"),
            RoutingMode::Aggregator => write!(f, "aggregator"),
        }
    }
}

/// Asset the target token is bought with and sold into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseAsset {
    /// The chain's native asset, wrapped for the swap
    Native,
    /// The configured stable quote token
    StableQuote,
}

impl fmt::Display for BaseAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseAsset::Native => write!(f, "native"),
            BaseAsset::StableQuote => write!(f, "stable_quote"),
        }
    }
}

/// Per-cycle campaign parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSettings {
    /// Mint of the token whose volume is being generated
    #[serde(with = "pubkey_string")]
    pub token: Pubkey,
    /// Volume goal in quote units
    pub target_volume: Decimal,
    #[serde(default = "default_routing_mode")]
    pub routing_mode: RoutingMode,
    #[serde(default = "default_base_asset")]
    pub base_asset: BaseAsset,
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Base-asset amount spent by one buy leg, in UI units
    pub trade_amount: Decimal,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    /// Chance of a second, opposite leg in the same cycle
    #[serde(default = "default_follow_up_probability")]
    pub follow_up_probability: f64,
    /// Share of the held token sold by a sell leg, in percent
    #[serde(default = "default_sell_pct_min")]
    pub sell_pct_min: u8,
    #[serde(default = "default_sell_pct_max")]
    pub sell_pct_max: u8,
    #[serde(default = "default_leg_delay_min")]
    pub leg_delay_min_secs: u64,
    #[serde(default = "default_leg_delay_max")]
    pub leg_delay_max_secs: u64,
    /// Largest share of the native balance a buy may spend
    #[serde(default = "default_max_balance_fraction")]
    pub max_balance_fraction: Decimal,
}

fn default_routing_mode() -> RoutingMode { RoutingMode::Pool }
fn default_base_asset() -> BaseAsset { BaseAsset::Native }
fn default_min_delay() -> u64 { 30 }
fn default_max_delay() -> u64 { 120 }
fn default_slippage_bps() -> u16 { 100 }
fn default_follow_up_probability() -> f64 { 0.5 }
fn default_sell_pct_min() -> u8 { 50 }
fn default_sell_pct_max() -> u8 { 100 }
fn default_leg_delay_min() -> u64 { 5 }
fn default_leg_delay_max() -> u64 { 20 }
fn default_max_balance_fraction() -> Decimal { Decimal::new(9, 1) }

impl CampaignSettings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Self =
            serde_yaml::from_str(content).context("Failed to parse campaign settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.target_volume > Decimal::ZERO,
            "target_volume must be positive"
        );
        anyhow::ensure!(
            self.trade_amount > Decimal::ZERO,
            "trade_amount must be positive"
        );
        anyhow::ensure!(
            self.min_delay_secs <= self.max_delay_secs,
            "min_delay_secs must not exceed max_delay_secs"
        );
        anyhow::ensure!(
            self.leg_delay_min_secs <= self.leg_delay_max_secs,
            "leg_delay_min_secs must not exceed leg_delay_max_secs"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.follow_up_probability),
            "follow_up_probability must be within [0, 1]"
        );
        anyhow::ensure!(
            self.sell_pct_min > 0
                && self.sell_pct_min <= self.sell_pct_max
                && self.sell_pct_max <= 100,
            "sell percentages must satisfy 0 < min <= max <= 100"
        );
        anyhow::ensure!(self.slippage_bps <= 10_000, "slippage_bps must be at most 10000");
        anyhow::ensure!(
            self.max_balance_fraction > Decimal::ZERO && self.max_balance_fraction <= Decimal::ONE,
            "max_balance_fraction must be within (0, 1]"
        );
        Ok(())
    }
}

mod pubkey_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pubkey::from_str(&raw).map_err(D::Error::custom)
    }
}

/// Read access to the current campaign settings
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<CampaignSettings>;
}

/// YAML file, re-read on every load
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for FileSettings {
    fn load(&self) -> Result<CampaignSettings> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file: {:?}", self.path))?;
        CampaignSettings::from_yaml(&content)
    }
}

/// In-memory settings another task may replace between cycles
#[derive(Debug, Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<CampaignSettings>>,
}

impl SharedSettings {
    pub fn new(settings: CampaignSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn replace(&self, settings: CampaignSettings) {
        *self.inner.write() = settings;
    }

    pub fn update<F: FnOnce(&mut CampaignSettings)>(&self, f: F) {
        f(&mut self.inner.write());
    }
}

impl SettingsSource for SharedSettings {
    fn load(&self) -> Result<CampaignSettings> {
        let settings = self.inner.read().clone();
        settings.validate()?;
        Ok(settings)
    }
}
