//! Pool Resolver
//!
//! Finds the pool pairing two mints through the discovery API, then decodes
//! the pool and market accounts from chain. Candidates are tried deepest
//! first; one that is not an AMM v4 pool is skipped. Nothing here retries a
//! failed RPC call.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::layout::{decode_liquidity_state, decode_market_state, market_authority};
use super::{PoolKeys, PoolReserves};
use crate::config::ProtocolsConfig;
use crate::error::SwapError;
use crate::execution::planner::from_base_units;
use crate::network::ChainClient;

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    pairs: Option<Vec<DiscoveryPair>>,
}

/// One candidate pair from the discovery API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryPair {
    pub dex_id: String,
    pub pair_address: String,
    pub base_token: DiscoveryToken,
    pub quote_token: DiscoveryToken,
    #[serde(default)]
    pub liquidity: Option<DiscoveryLiquidity>,
    /// Pool flavour on the dex, e.g. `CLMM` or `CPMM`; absent for AMM v4
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryToken {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryLiquidity {
    #[serde(default)]
    pub usd: Option<f64>,
}

impl DiscoveryPair {
    fn pairs(&self, mint_a: &str, mint_b: &str) -> bool {
        let (base, quote) = (self.base_token.address.as_str(), self.quote_token.address.as_str());
        (base == mint_a && quote == mint_b) || (base == mint_b && quote == mint_a)
    }

    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn is_amm_v4(&self) -> bool {
        self.labels.iter().all(|label| label.eq_ignore_ascii_case("v4"))
    }
}

/// AMM v4 pools on `dex_id` pairing exactly `mint_a` and `mint_b`, deepest first
pub fn rank_pairs<'a>(
    candidates: &'a [DiscoveryPair],
    dex_id: &str,
    mint_a: &Pubkey,
    mint_b: &Pubkey,
) -> Vec<&'a DiscoveryPair> {
    let (a, b) = (mint_a.to_string(), mint_b.to_string());
    let mut ranked: Vec<_> = candidates
        .iter()
        .filter(|pair| pair.dex_id == dex_id && pair.is_amm_v4() && pair.pairs(&a, &b))
        .collect();
    ranked.sort_by(|x, y| y.liquidity_usd().total_cmp(&x.liquidity_usd()));
    ranked
}

/// Source of candidate pools for a mint pair
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PoolDiscovery: Send + Sync {
    async fn pairs(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> Result<Vec<DiscoveryPair>, SwapError>;
}

/// DexScreener-style `GET {url}/{mintA},{mintB}` discovery
pub struct HttpDiscovery {
    client: Client,
    url: String,
}

impl HttpDiscovery {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PoolDiscovery for HttpDiscovery {
    async fn pairs(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> Result<Vec<DiscoveryPair>, SwapError> {
        let url = Url::parse(&format!("{}/{},{}", self.url, mint_a, mint_b))
            .context("Invalid pool discovery URL")?;

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to query pool discovery")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Pool discovery failed: {} - {}", status, body).into());
        }

        let body: DiscoveryResponse = response
            .json()
            .await
            .map_err(|e| SwapError::decode("pool discovery response", e))?;

        Ok(body.pairs.unwrap_or_default())
    }
}

pub struct PoolResolver {
    chain: Arc<dyn ChainClient>,
    discovery: Arc<dyn PoolDiscovery>,
    dex_id: String,
    amm_program: Pubkey,
    amm_authority: Pubkey,
    native_mint: Pubkey,
}

impl PoolResolver {
    pub fn new(chain: Arc<dyn ChainClient>, config: &ProtocolsConfig) -> anyhow::Result<Self> {
        let discovery = HttpDiscovery::new(&config.raydium.discovery_url)?;
        Self::with_discovery(chain, Arc::new(discovery), config)
    }

    pub fn with_discovery(
        chain: Arc<dyn ChainClient>,
        discovery: Arc<dyn PoolDiscovery>,
        config: &ProtocolsConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            chain,
            discovery,
            dex_id: config.raydium.dex_id.clone(),
            amm_program: config.raydium.amm_program()?,
            amm_authority: config.raydium.amm_authority()?,
            native_mint: config.mints.native()?,
        })
    }

    /// Pool pairing `mint` against the native asset
    pub async fn resolve(&self, mint: &Pubkey) -> Result<PoolKeys, SwapError> {
        self.resolve_pair(mint, &self.native_mint).await
    }

    /// Deepest candidate that decodes as an AMM v4 pool for the pair
    pub async fn resolve_pair(&self, mint: &Pubkey, quote: &Pubkey) -> Result<PoolKeys, SwapError> {
        let candidates = self.discovery.pairs(mint, quote).await?;

        for pair in rank_pairs(&candidates, &self.dex_id, mint, quote) {
            let amm_id = match Pubkey::from_str(&pair.pair_address) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping pool with bad address {}: {}", pair.pair_address, e);
                    continue;
                }
            };
            debug!(
                "Trying {} pool {} (liquidity ${:.0})",
                pair.dex_id,
                amm_id,
                pair.liquidity_usd()
            );

            match self.fetch_pool_keys(&amm_id, mint, quote).await {
                Ok(keys) => return Ok(keys),
                Err(err @ SwapError::Decode { .. }) => warn!("Skipping pool {}: {}", amm_id, err),
                Err(err) => return Err(err),
            }
        }

        Err(SwapError::PoolNotFound {
            mint: *mint,
            quote: *quote,
        })
    }

    /// Decode pool and market state for a known pool address
    pub async fn fetch_pool_keys(
        &self,
        amm_id: &Pubkey,
        mint_a: &Pubkey,
        mint_b: &Pubkey,
    ) -> Result<PoolKeys, SwapError> {
        let pool_account = self
            .chain
            .get_multiple_accounts(&[*amm_id])
            .await?
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| SwapError::decode("amm v4 liquidity state", format!("pool {} not found", amm_id)))?;
        if pool_account.owner != self.amm_program {
            return Err(SwapError::decode(
                "amm v4 liquidity state",
                format!("pool {} is owned by {}", amm_id, pool_account.owner),
            ));
        }
        let amm = decode_liquidity_state(&pool_account.data)?;

        let decoded_pair = (amm.base_mint == *mint_a && amm.quote_mint == *mint_b)
            || (amm.base_mint == *mint_b && amm.quote_mint == *mint_a);
        if !decoded_pair {
            return Err(SwapError::decode(
                "amm v4 liquidity state",
                format!("pool {} pairs {} / {}", amm_id, amm.base_mint, amm.quote_mint),
            ));
        }

        let market_data = self.chain.get_account_data(&amm.market_id).await?;
        let market = decode_market_state(&market_data)?;
        if market.own_address != amm.market_id {
            return Err(SwapError::decode(
                "openbook v3 market state",
                format!("account {} describes market {}", amm.market_id, market.own_address),
            ));
        }
        let market_authority =
            market_authority(&amm.market_id, market.vault_signer_nonce, &amm.market_program)?;

        info!(
            "Resolved pool {} ({} / {}) on market {}",
            amm_id, amm.base_mint, amm.quote_mint, amm.market_id
        );

        Ok(PoolKeys {
            amm_id: *amm_id,
            amm_program: self.amm_program,
            authority: self.amm_authority,
            base_mint: amm.base_mint,
            quote_mint: amm.quote_mint,
            base_decimals: amm.base_decimals,
            quote_decimals: amm.quote_decimals,
            open_orders: amm.open_orders,
            target_orders: amm.target_orders,
            base_vault: amm.base_vault,
            quote_vault: amm.quote_vault,
            market_program: amm.market_program,
            market_id: amm.market_id,
            market_authority,
            market_base_vault: market.base_vault,
            market_quote_vault: market.quote_vault,
            bids: market.bids,
            asks: market.asks,
            event_queue: market.event_queue,
        })
    }

    /// Current vault balances, fetched in one call
    pub async fn fetch_reserves(&self, keys: &PoolKeys) -> Result<PoolReserves, SwapError> {
        let accounts = self
            .chain
            .get_multiple_accounts(&[keys.base_vault, keys.quote_vault])
            .await?;

        let amount_of = |index: usize, what: &'static str| -> Result<u64, SwapError> {
            let account = accounts
                .get(index)
                .and_then(|a| a.as_ref())
                .ok_or_else(|| SwapError::decode(what, "vault account missing"))?;
            spl_token::state::Account::unpack(&account.data)
                .map(|token| token.amount)
                .map_err(|e| SwapError::decode(what, e))
        };

        let base = amount_of(0, "pool base vault")?;
        let quote = amount_of(1, "pool quote vault")?;

        Ok(PoolReserves {
            base: from_base_units(base, keys.base_decimals),
            quote: from_base_units(quote, keys.quote_decimals),
        })
    }
}
