//! Jupiter Spot Price Feed
//!
//! Fetches the native asset price from the Jupiter price API. The last good
//! price is reused for a short window if a later fetch fails.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::PriceOracle;
use crate::config::{JupiterConfig, MintsConfig};

const STALE_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: HashMap<String, Option<PriceData>>,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    price: String,
}

fn parse_price(body: &str, mint: &str) -> Result<Decimal> {
    let response: PriceResponse =
        serde_json::from_str(body).context("Failed to parse Jupiter price response")?;
    let raw = response
        .data
        .get(mint)
        .and_then(|entry| entry.as_ref())
        .map(|entry| entry.price.as_str())
        .ok_or_else(|| anyhow::anyhow!("{} price not found in Jupiter response", mint))?;

    let price = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .with_context(|| format!("Invalid price {}", raw))?;
    anyhow::ensure!(price > Decimal::ZERO, "Non-positive price {}", price);
    Ok(price)
}

pub struct JupiterPriceFeed {
    client: reqwest::Client,
    price_api_url: String,
    native_mint: String,
    quote_mint: String,
    last_price: RwLock<Option<(Decimal, Instant)>>,
}

impl JupiterPriceFeed {
    pub fn new(config: &JupiterConfig, mints: &MintsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            price_api_url: config.price_api_url.trim_end_matches('/').to_string(),
            native_mint: mints.native_mint.clone(),
            quote_mint: mints.stable_mint.clone(),
            last_price: RwLock::new(None),
        })
    }

    async fn fetch_price(&self) -> Result<Decimal> {
        let url = format!(
            "{}?ids={}&vsToken={}",
            self.price_api_url, self.native_mint, self.quote_mint
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch Jupiter price")?;

        if !response.status().is_success() {
            anyhow::bail!("Jupiter price request failed: {}", response.status());
        }

        let body = response.text().await.context("Failed to read Jupiter price")?;
        parse_price(&body, &self.native_mint)
    }
}

#[async_trait]
impl PriceOracle for JupiterPriceFeed {
    async fn native_price(&self) -> Result<Decimal> {
        match self.fetch_price().await {
            Ok(price) => {
                debug!("Jupiter native price: {}", price);
                *self.last_price.write() = Some((price, Instant::now()));
                Ok(price)
            }
            Err(e) => {
                let cached = *self.last_price.read();
                match cached {
                    Some((price, at)) if at.elapsed() < STALE_AFTER => {
                        warn!("Price fetch failed, reusing {} from {:?} ago: {:#}", price, at.elapsed(), e);
                        Ok(price)
                    }
                    _ => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SOL: &str = "So11111111111111111111111111111111111111112";

    #[test]
    fn test_parse_price() {
        let body = format!(
            r#"{{"data": {{"{SOL}": {{"id": "{SOL}", "type": "derivedPrice", "price": "147.2513"}}}}, "timeTaken": 0.003}}"#
        );
        assert_eq!(parse_price(&body, SOL).unwrap(), dec!(147.2513));
    }

    #[test]
    fn test_missing_or_null_price() {
        let body = format!(r#"{{"data": {{"{SOL}": null}}}}"#);
        assert!(parse_price(&body, SOL).is_err());
        assert!(parse_price(r#"{"data": {}}"#, SOL).is_err());
    }

    #[test]
    fn test_feed_creation() {
        let feed = JupiterPriceFeed::new(&JupiterConfig::default(), &MintsConfig::default()).unwrap();
        assert_eq!(feed.native_mint, SOL);
        assert!(feed.last_price.read().is_none());
    }
}
