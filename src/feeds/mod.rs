//! Price Feeds Module
//!
//! Native asset price in quote units, used to normalise volume when the
//! campaign trades against the native asset.

pub mod jupiter;

pub use jupiter::JupiterPriceFeed;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Quote units per one native unit
    async fn native_price(&self) -> Result<Decimal>;
}
