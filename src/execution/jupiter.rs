//! Jupiter Client
//!
//! Aggregator backend for swaps:
//! - Quote fetching for an exact-in amount
//! - Pre-built versioned swap transactions with native wrapping handled remotely

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::JupiterConfig;
use crate::error::SwapError;

/// Fields read from a quote; the raw body is echoed back to `/swap`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFields {
    in_amount: String,
    out_amount: String,
    other_amount_threshold: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
}

/// A quote as returned by the aggregator
#[derive(Debug, Clone)]
pub struct Quote {
    pub raw: serde_json::Value,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output after slippage
    pub other_amount_threshold: u64,
    pub price_impact_pct: f64,
}

impl Quote {
    pub fn from_json(raw: serde_json::Value) -> Result<Self, SwapError> {
        let fields: QuoteFields = serde_json::from_value(raw.clone())
            .map_err(|e| SwapError::decode("jupiter quote", e))?;
        let amount = |value: &str| {
            value
                .parse::<u64>()
                .map_err(|e| SwapError::decode("jupiter quote amount", e))
        };

        Ok(Self {
            in_amount: amount(&fields.in_amount)?,
            out_amount: amount(&fields.out_amount)?,
            other_amount_threshold: amount(&fields.other_amount_threshold)?,
            price_impact_pct: fields
                .price_impact_pct
                .and_then(|p| p.parse().ok())
                .unwrap_or(0.0),
            raw,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a serde_json::Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    compute_unit_price_micro_lamports: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

/// Base64 + bincode versioned transaction from `/swap`
pub fn decode_swap_transaction(encoded: &str) -> Result<VersionedTransaction, SwapError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| SwapError::decode("jupiter swap transaction", e))?;
    bincode::deserialize(&bytes).map_err(|e| SwapError::decode("jupiter swap transaction", e))
}

/// Quote and build swaps remotely
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AggregatorApi: Send + Sync {
    async fn get_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, SwapError>;

    /// Unsigned transaction performing `quote` for `user`
    async fn get_swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<VersionedTransaction, SwapError>;
}

pub struct JupiterClient {
    client: Client,
    api_url: String,
    priority_fee: Option<u64>,
}

impl JupiterClient {
    pub fn new(config: &JupiterConfig, priority_fee: Option<u64>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            priority_fee,
        })
    }
}

#[async_trait]
impl AggregatorApi for JupiterClient {
    async fn get_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, SwapError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.api_url, input_mint, output_mint, amount, slippage_bps
        );

        debug!("Fetching Jupiter quote: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch Jupiter quote")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Jupiter quote failed: {} - {}", status, body).into());
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SwapError::decode("jupiter quote", e))?;
        let quote = Quote::from_json(raw)?;

        info!(
            "Jupiter quote: {} -> {} (min {}), price_impact: {}%",
            quote.in_amount, quote.out_amount, quote.other_amount_threshold, quote.price_impact_pct
        );
        Ok(quote)
    }

    async fn get_swap_transaction(
        &self,
        quote: &Quote,
        user: &Pubkey,
    ) -> Result<VersionedTransaction, SwapError> {
        let url = format!("{}/swap", self.api_url);
        let request = SwapRequest {
            quote_response: &quote.raw,
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
            compute_unit_price_micro_lamports: self.priority_fee,
        };

        debug!("Fetching Jupiter swap transaction for {}", user);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to fetch Jupiter swap transaction")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Jupiter swap failed: {} - {}", status, body).into());
        }

        let swap: SwapResponse = response
            .json()
            .await
            .map_err(|e| SwapError::decode("jupiter swap response", e))?;

        decode_swap_transaction(&swap.swap_transaction)
    }
}
