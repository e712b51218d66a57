//! Error taxonomy for swap planning and campaign control

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::config::settings::RoutingMode;

/// Errors raised while resolving, planning, assembling or submitting a swap.
///
/// None of these escape a cycle: the orchestrator turns them into a failed
/// `CycleResult` and keeps the campaign running.
#[derive(Debug, Error)]
pub enum SwapError {
    /// No liquidity pool pairs the two mints
    #[error("no pool pairs {mint} against {quote}")]
    PoolNotFound { mint: Pubkey, quote: Pubkey },

    /// External data could not be parsed into the expected layout
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// Planner refused degenerate inputs
    #[error("invalid plan input: {0}")]
    InvalidPlanInput(String),

    /// Preflight simulation rejected the transaction
    #[error("simulation rejected: {reason}")]
    SimulationRejected { reason: String, logs: Vec<String> },

    /// Transport, RPC or HTTP failure
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),

    /// Wrapper produced by the router so every backend fails the same way
    #[error("{mode} swap failed: {source}")]
    SwapFailed {
        mode: RoutingMode,
        #[source]
        source: Box<SwapError>,
    },
}

impl SwapError {
    pub fn decode(what: &'static str, reason: impl ToString) -> Self {
        SwapError::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        SwapError::InvalidPlanInput(reason.into())
    }

    /// Wrap into `SwapFailed` unless already wrapped
    pub fn into_swap_failed(self, mode: RoutingMode) -> Self {
        match self {
            wrapped @ SwapError::SwapFailed { .. } => wrapped,
            other => SwapError::SwapFailed {
                mode,
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, skipping router wrappers
    pub fn root(&self) -> &SwapError {
        match self {
            SwapError::SwapFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors that stop a campaign before or outside the cycle loop
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("wallet set is empty, campaign cannot start")]
    EmptyWalletSet,

    #[error("campaign settings unavailable: {0:#}")]
    Settings(#[source] anyhow::Error),

    #[error("campaign is {0}, expected Idle")]
    AlreadyStarted(crate::orchestrator::CampaignState),
}
