//! Solana RPC Client Manager
//!
//! Chain access with automatic failover and a short-lived blockhash cache.
//! [`ChainClient`] is the narrow surface the swap pipeline depends on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RpcConfig;

/// A wallet's token account for one mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHolding {
    pub address: Pubkey,
    /// Raw amount in smallest units
    pub amount: u64,
    pub decimals: u8,
}

/// Result of a preflight simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Chain operations the swap pipeline needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>>;

    /// Raw data of a single account; errors if the account does not exist
    async fn get_account_data(&self, pubkey: &Pubkey) -> Result<Vec<u8>>;

    /// Largest token account `owner` holds for `mint`, if any
    async fn find_token_account(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<TokenHolding>>;

    /// Lamport balance
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<SimulationOutcome>;

    async fn send_and_confirm(&self, transaction: &VersionedTransaction) -> Result<Signature>;
}

/// RPC Manager with failover support
pub struct RpcManager {
    /// Primary RPC client
    primary: Arc<RpcClient>,
    /// Fallback RPC clients
    fallbacks: Vec<Arc<RpcClient>>,
    /// Current active client index (0 = primary)
    active_index: RwLock<usize>,
    config: RpcConfig,
    cached_blockhash: RwLock<Option<(Hash, Instant)>>,
    blockhash_cache_duration: Duration,
}

impl RpcManager {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let commitment = CommitmentConfig::confirmed();

        let primary = Arc::new(RpcClient::new_with_timeout_and_commitment(
            config.primary_url.clone(),
            timeout,
            commitment,
        ));

        let fallbacks: Vec<Arc<RpcClient>> = config
            .fallback_urls
            .iter()
            .map(|url| {
                Arc::new(RpcClient::new_with_timeout_and_commitment(
                    url.clone(),
                    timeout,
                    commitment,
                ))
            })
            .collect();

        info!(
            "RPC Manager initialized with {} fallback endpoints",
            fallbacks.len()
        );

        Ok(Self {
            primary,
            fallbacks,
            active_index: RwLock::new(0),
            config: config.clone(),
            cached_blockhash: RwLock::new(None),
            blockhash_cache_duration: Duration::from_millis(400),
        })
    }

    pub async fn get_client(&self) -> Arc<RpcClient> {
        let index = *self.active_index.read().await;
        if index == 0 {
            self.primary.clone()
        } else {
            self.fallbacks.get(index - 1).cloned().unwrap_or_else(|| self.primary.clone())
        }
    }

    /// Switch to next available RPC endpoint
    pub async fn failover(&self) -> bool {
        let mut index = self.active_index.write().await;
        let total_endpoints = 1 + self.fallbacks.len();

        let next_index = (*index + 1) % total_endpoints;
        if next_index == *index {
            return false;
        }

        *index = next_index;
        warn!("RPC failover to endpoint index {}", next_index);
        true
    }
}

#[async_trait]
impl ChainClient for RpcManager {
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        let client = self.get_client().await;
        client
            .get_multiple_accounts(pubkeys)
            .await
            .context("Failed to get multiple accounts")
    }

    async fn get_account_data(&self, pubkey: &Pubkey) -> Result<Vec<u8>> {
        let client = self.get_client().await;
        client
            .get_account_data(pubkey)
            .await
            .with_context(|| format!("Failed to get account data for {}", pubkey))
    }

    async fn find_token_account(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<TokenHolding>> {
        let client = self.get_client().await;
        let accounts = client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(*mint))
            .await
            .context("Failed to get token accounts by owner")?;

        let holding = accounts
            .iter()
            .filter_map(|keyed| parse_token_holding(&keyed.pubkey, &keyed.account.data))
            .max_by_key(|holding| holding.amount);

        debug!("Token account lookup {} / {}: {:?}", owner, mint, holding);
        Ok(holding)
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        let client = self.get_client().await;
        client
            .get_balance(pubkey)
            .await
            .context("Failed to get balance")
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        {
            let cache = self.cached_blockhash.read().await;
            if let Some((hash, timestamp)) = &*cache {
                if timestamp.elapsed() < self.blockhash_cache_duration {
                    return Ok(*hash);
                }
            }
        }

        let client = self.get_client().await;
        let start = Instant::now();

        let blockhash = client
            .get_latest_blockhash()
            .await
            .context("Failed to get recent blockhash")?;

        debug!("Blockhash fetch took {:?}", start.elapsed());
        *self.cached_blockhash.write().await = Some((blockhash, Instant::now()));

        Ok(blockhash)
    }

    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<SimulationOutcome> {
        let client = self.get_client().await;
        let result = client
            .simulate_transaction(transaction)
            .await
            .context("Failed to simulate transaction")?
            .value;

        Ok(SimulationOutcome {
            err: result.err.map(|e| e.to_string()),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    /// Retries with linear backoff; fails over after the second miss
    async fn send_and_confirm(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            let client = self.get_client().await;
            let start = Instant::now();

            match client.send_and_confirm_transaction(transaction).await {
                Ok(signature) => {
                    debug!(
                        "Transaction {} confirmed in {:?} on attempt {}",
                        signature,
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(signature);
                }
                Err(e) => {
                    warn!("Transaction attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);

                    if attempt > 0 {
                        self.failover().await;
                    }

                    tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error
            .map(|e| anyhow::anyhow!("{}", e))
            .unwrap_or_else(|| anyhow::anyhow!("Transaction failed after retries")))
    }
}

/// Reads a `jsonParsed` SPL token account
fn parse_token_holding(pubkey: &str, data: &UiAccountData) -> Option<TokenHolding> {
    let UiAccountData::Json(parsed) = data else {
        return None;
    };
    let amount = parsed.parsed.get("info")?.get("tokenAmount")?;

    Some(TokenHolding {
        address: Pubkey::from_str(pubkey).ok()?,
        amount: amount.get("amount")?.as_str()?.parse().ok()?,
        decimals: u8::try_from(amount.get("decimals")?.as_u64()?).ok()?,
    })
}
