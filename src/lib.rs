//! Solana Volume Bot Library
//!
//! Multi-wallet volume campaigns over Raydium AMM pools and the Jupiter
//! aggregator: pool resolution, swap planning, transaction assembly,
//! routing and the campaign orchestrator.

pub mod config;
pub mod error;
pub mod execution;
pub mod feeds;
pub mod network;
pub mod orchestrator;
pub mod pool;
pub mod telemetry;
pub mod utils;
pub mod wallet;

// Re-export main types
pub use config::{AppConfig, CampaignSettings, RoutingMode};
pub use error::{CampaignError, SwapError};
pub use execution::SwapRouter;
pub use network::{ChainClient, RpcManager};
pub use orchestrator::{CampaignReport, CampaignState, CancelHandle, VolumeOrchestrator};
pub use wallet::WalletHandle;
