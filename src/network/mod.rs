//! Network module
//!
//! Chain access for the swap pipeline. Everything above this layer talks to
//! the chain through [`ChainClient`], so cycles can be exercised against a
//! mock in tests.

pub mod rpc_client;

pub use rpc_client::{ChainClient, RpcManager, SimulationOutcome, TokenHolding};

#[cfg(test)]
pub use rpc_client::MockChainClient;
