//! Execution Module
//!
//! Turns a swap request into a confirmed transaction:
//! - Constant-product planning with slippage bounds
//! - Atomic instruction assembly for direct pool swaps
//! - Aggregator quotes and pre-built transactions
//! - Simulation, submission and routing between the two backends

pub mod jupiter;
pub mod planner;
pub mod router;
pub mod submitter;
pub mod tx_builder;

pub use jupiter::{AggregatorApi, JupiterClient};
pub use planner::{plan, PlannedAmounts, SwapPlan};
pub use router::{AggregatorSwapBackend, PoolSwapBackend, SwapBackend, SwapOutcome, SwapRequest, SwapRouter};
pub use submitter::TransactionSubmitter;
pub use tx_builder::{AccountResolution, StepKind, SwapAssembler, SwapInstructionSet, WalletAccounts};

#[cfg(test)]
pub use jupiter::MockAggregatorApi;
#[cfg(test)]
pub use router::MockSwapBackend;
