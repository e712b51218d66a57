//! One orchestration cycle: one wallet, one or two swap legs, one
//! volume contribution.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{BaseAsset, CampaignSettings, MintsConfig};
use crate::error::SwapError;
use crate::execution::planner::{from_base_units, to_base_units};
use crate::execution::{SwapRequest, SwapRouter};
use crate::feeds::PriceOracle;
use crate::network::ChainClient;
use crate::wallet::WalletHandle;

/// Random choices for one cycle, drawn up front so a seeded RNG replays a
/// campaign exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDecision {
    /// Run the opposite leg after the first one
    pub follow_up: bool,
    /// Percent of the held token a sell leg sells
    pub sell_pct: u8,
    /// Pause between the two legs
    pub leg_delay: Duration,
    /// Pause before the next cycle
    pub next_delay: Duration,
}

impl CycleDecision {
    /// Expects settings that passed `CampaignSettings::validate`
    pub fn sample<R: Rng + ?Sized>(settings: &CampaignSettings, rng: &mut R) -> Self {
        Self {
            follow_up: rng.gen_bool(settings.follow_up_probability.clamp(0.0, 1.0)),
            sell_pct: rng.gen_range(settings.sell_pct_min..=settings.sell_pct_max.max(settings.sell_pct_min)),
            leg_delay: Duration::from_secs(rng.gen_range(
                settings.leg_delay_min_secs..=settings.leg_delay_max_secs.max(settings.leg_delay_min_secs),
            )),
            next_delay: Duration::from_secs(rng.gen_range(
                settings.min_delay_secs..=settings.max_delay_secs.max(settings.min_delay_secs),
            )),
        }
    }
}

/// Outcome of one cycle as seen by campaign accounting
#[derive(Debug, Clone, PartialEq)]
pub struct CycleResult {
    pub wallet: Pubkey,
    /// Quote units; zero unless `success`
    pub volume: Decimal,
    pub success: bool,
    pub error: Option<String>,
}

impl CycleResult {
    pub fn succeeded(wallet: Pubkey, volume: Decimal) -> Self {
        Self {
            wallet,
            volume: volume.max(Decimal::ZERO),
            success: true,
            error: None,
        }
    }

    pub fn failed(wallet: Pubkey, error: impl std::fmt::Display) -> Self {
        Self {
            wallet,
            volume: Decimal::ZERO,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Runs the swap legs of one cycle and returns the volume it contributed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CycleExecutor: Send + Sync {
    async fn run_cycle(
        &self,
        wallet: &WalletHandle,
        settings: &CampaignSettings,
        decision: &CycleDecision,
    ) -> Result<Decimal, SwapError>;
}

/// Production executor: sells when the wallet holds the token, buys
/// otherwise, optionally followed by the opposite leg.
pub struct SwapCycle {
    chain: Arc<dyn ChainClient>,
    router: SwapRouter,
    oracle: Arc<dyn PriceOracle>,
    native_mint: Pubkey,
    stable_mint: Pubkey,
    stable_decimals: u8,
}

#[derive(Debug, Clone, Copy)]
struct BaseSide {
    mint: Pubkey,
    decimals: u8,
    native: bool,
}

impl SwapCycle {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        router: SwapRouter,
        oracle: Arc<dyn PriceOracle>,
        mints: &MintsConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            chain,
            router,
            oracle,
            native_mint: mints.native()?,
            stable_mint: mints.stable()?,
            stable_decimals: mints.stable_decimals,
        })
    }

    fn base_side(&self, asset: BaseAsset) -> BaseSide {
        match asset {
            BaseAsset::Native => BaseSide {
                mint: self.native_mint,
                decimals: spl_token::native_mint::DECIMALS,
                native: true,
            },
            BaseAsset::StableQuote => BaseSide {
                mint: self.stable_mint,
                decimals: self.stable_decimals,
                native: false,
            },
        }
    }

    /// Quote units per one base unit
    async fn base_price(&self, base: BaseSide) -> Result<Decimal, SwapError> {
        if base.native {
            Ok(self.oracle.native_price().await?)
        } else {
            Ok(Decimal::ONE)
        }
    }

    async fn held_amount(&self, wallet: &WalletHandle, mint: &Pubkey) -> Result<u64, SwapError> {
        Ok(self
            .chain
            .find_token_account(&wallet.pubkey(), mint)
            .await?
            .map(|holding| holding.amount)
            .unwrap_or(0))
    }

    /// Spends `trade_amount` of the base asset; returns base units spent
    async fn buy(
        &self,
        wallet: &WalletHandle,
        settings: &CampaignSettings,
        base: BaseSide,
    ) -> Result<(Decimal, u64), SwapError> {
        let mut amount = settings.trade_amount;
        if base.native {
            let lamports = self.chain.get_balance(&wallet.pubkey()).await?;
            let cap = from_base_units(lamports, base.decimals)
                .checked_mul(settings.max_balance_fraction)
                .ok_or_else(|| SwapError::invalid_input("balance cap overflows"))?;
            if cap < amount {
                debug!("Capping buy for {} at {} (balance {} lamports)", wallet, cap, lamports);
                amount = cap;
            }
        }

        let amount_in = to_base_units(amount, base.decimals)?;
        if amount_in == 0 {
            return Err(SwapError::invalid_input(format!(
                "buy amount for {} rounds to zero",
                wallet
            )));
        }

        let outcome = self
            .router
            .execute(
                settings.routing_mode,
                wallet,
                &SwapRequest {
                    input_mint: base.mint,
                    output_mint: settings.token,
                    amount_in,
                    slippage_bps: settings.slippage_bps,
                },
            )
            .await?;

        Ok((from_base_units(outcome.input_amount, base.decimals), outcome.output_amount))
    }

    /// Sells `amount_in` token units; returns base units received
    async fn sell(
        &self,
        wallet: &WalletHandle,
        settings: &CampaignSettings,
        base: BaseSide,
        amount_in: u64,
    ) -> Result<Decimal, SwapError> {
        let outcome = self
            .router
            .execute(
                settings.routing_mode,
                wallet,
                &SwapRequest {
                    input_mint: settings.token,
                    output_mint: base.mint,
                    amount_in,
                    slippage_bps: settings.slippage_bps,
                },
            )
            .await?;

        Ok(from_base_units(outcome.output_amount, base.decimals))
    }
}

fn sell_amount(held: u64, sell_pct: u8) -> u64 {
    (held as u128 * sell_pct.min(100) as u128 / 100) as u64
}

#[async_trait]
impl CycleExecutor for SwapCycle {
    async fn run_cycle(
        &self,
        wallet: &WalletHandle,
        settings: &CampaignSettings,
        decision: &CycleDecision,
    ) -> Result<Decimal, SwapError> {
        let base = self.base_side(settings.base_asset);
        let price = self.base_price(base).await?;
        let held = self.held_amount(wallet, &settings.token).await?;
        let to_sell = sell_amount(held, decision.sell_pct);
        if held > 0 && to_sell == 0 {
            debug!("{} holds dust ({} units), buying instead", wallet, held);
        }

        let base_volume = if to_sell > 0 {
            let mut volume = self.sell(wallet, settings, base, to_sell).await?;
            if decision.follow_up {
                tokio::time::sleep(decision.leg_delay).await;
                let (spent, _) = self.buy(wallet, settings, base).await?;
                volume += spent;
            }
            volume
        } else {
            let (mut volume, bought) = self.buy(wallet, settings, base).await?;
            if decision.follow_up {
                tokio::time::sleep(decision.leg_delay).await;
                let held = match self.held_amount(wallet, &settings.token).await? {
                    0 => bought,
                    amount => amount,
                };
                match sell_amount(held, decision.sell_pct) {
                    0 => debug!("{} bought too little to sell back", wallet),
                    amount_in => volume += self.sell(wallet, settings, base, amount_in).await?,
                }
            }
            volume
        };

        let volume = base_volume
            .checked_mul(price)
            .ok_or_else(|| SwapError::invalid_input("volume overflows"))?;
        info!(
            "Cycle for {}: {} {} at {} = {} quote",
            wallet, base_volume, settings.base_asset, price, volume
        );
        Ok(volume)
    }
}
