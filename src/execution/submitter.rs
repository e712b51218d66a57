//! Transaction Submitter
//!
//! Compiles, signs, optionally simulates, then sends and confirms:
//! - Locally assembled instruction sets as v0 transactions
//! - Pre-built aggregator transactions, re-signed by the wallet

use anyhow::Context;
use solana_sdk::{
    instruction::Instruction,
    message::{v0, VersionedMessage},
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::SwapError;
use crate::network::ChainClient;
use crate::telemetry::metrics;
use crate::utils::elapsed_ms;

const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TransactionSubmitter {
    chain: Arc<dyn ChainClient>,
    simulate_before_submit: bool,
    confirm_timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(chain: Arc<dyn ChainClient>, simulate_before_submit: bool) -> Self {
        Self {
            chain,
            simulate_before_submit,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Compile `instructions` into one v0 transaction paid by `payer`
    pub async fn submit_instructions(
        &self,
        payer: &Keypair,
        instructions: &[Instruction],
    ) -> Result<Signature, SwapError> {
        let blockhash = self.chain.get_latest_blockhash().await?;
        let message = v0::Message::try_compile(&payer.pubkey(), instructions, &[], blockhash)
            .context("Failed to compile swap message")?;
        let transaction = VersionedTransaction::try_new(VersionedMessage::V0(message), &[payer])
            .context("Failed to sign swap transaction")?;

        self.submit(&transaction).await
    }

    /// Re-sign a transaction built elsewhere for `payer`
    pub async fn submit_presigned(
        &self,
        payer: &Keypair,
        transaction: VersionedTransaction,
    ) -> Result<Signature, SwapError> {
        let transaction = VersionedTransaction::try_new(transaction.message, &[payer])
            .context("Failed to sign aggregator transaction")?;
        self.submit(&transaction).await
    }

    pub async fn submit(&self, transaction: &VersionedTransaction) -> Result<Signature, SwapError> {
        if self.simulate_before_submit {
            let outcome = self.chain.simulate(transaction).await?;
            if let Some(reason) = outcome.err {
                warn!("Simulation rejected transaction: {}", reason);
                for line in &outcome.logs {
                    debug!("  {}", line);
                }
                return Err(SwapError::SimulationRejected {
                    reason,
                    logs: outcome.logs,
                });
            }
            debug!("Simulation ok, {:?} compute units", outcome.units_consumed);
        }

        let pending = transaction.signatures.first().copied().unwrap_or_default();
        info!("Sending transaction {}", pending);

        let start = Instant::now();
        let signature = tokio::time::timeout(self.confirm_timeout, self.chain.send_and_confirm(transaction))
            .await
            .map_err(|_| {
                warn!("Transaction {} unconfirmed after {:?}, it may still land", pending, self.confirm_timeout);
                anyhow::anyhow!("transaction {} not confirmed within {:?}", pending, self.confirm_timeout)
            })??;
        let latency = elapsed_ms(start);
        metrics::record_submit_latency(latency);

        info!("Transaction confirmed: {} ({:.0} ms)", signature, latency);
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MockChainClient, SimulationOutcome};
    use solana_sdk::{hash::Hash, pubkey::Pubkey, system_instruction};

    fn transfer(payer: &Keypair) -> Vec<Instruction> {
        vec![system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1_000)]
    }

    #[tokio::test]
    async fn test_simulation_rejection_skips_send() {
        let mut chain = MockChainClient::new();
        chain.expect_get_latest_blockhash().returning(|| Ok(Hash::new_unique()));
        chain.expect_simulate().returning(|_| {
            Ok(SimulationOutcome {
                err: Some("InstructionError(2, Custom(30))".to_string()),
                logs: vec!["Program log: exceeds desired slippage limit".to_string()],
                units_consumed: Some(41_000),
            })
        });
        chain.expect_send_and_confirm().never();

        let payer = Keypair::new();
        let submitter = TransactionSubmitter::new(Arc::new(chain), true);
        let err = submitter.submit_instructions(&payer, &transfer(&payer)).await.unwrap_err();

        match err {
            SwapError::SimulationRejected { reason, logs } => {
                assert!(reason.contains("Custom(30)"));
                assert_eq!(logs.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signed_by_payer_and_sent() {
        let payer = Keypair::new();
        let payer_key = payer.pubkey();
        let expected = Signature::new_unique();

        let mut chain = MockChainClient::new();
        chain.expect_get_latest_blockhash().returning(|| Ok(Hash::new_unique()));
        chain.expect_simulate().never();
        chain
            .expect_send_and_confirm()
            .withf(move |tx| tx.message.static_account_keys()[0] == payer_key && tx.verify_with_results().iter().all(|ok| *ok))
            .times(1)
            .returning(move |_| Ok(expected));

        let submitter = TransactionSubmitter::new(Arc::new(chain), false);
        let signature = submitter.submit_instructions(&payer, &transfer(&payer)).await.unwrap();
        assert_eq!(signature, expected);
    }

    #[tokio::test]
    async fn test_send_failure_is_rpc_error() {
        let mut chain = MockChainClient::new();
        chain.expect_get_latest_blockhash().returning(|| Ok(Hash::new_unique()));
        chain.expect_simulate().returning(|_| Ok(SimulationOutcome::default()));
        chain
            .expect_send_and_confirm()
            .returning(|_| Err(anyhow::anyhow!("blockhash not found")));

        let payer = Keypair::new();
        let submitter = TransactionSubmitter::new(Arc::new(chain), true);
        let err = submitter.submit_instructions(&payer, &transfer(&payer)).await.unwrap_err();
        assert!(matches!(err, SwapError::Rpc(_)));
    }

    struct StalledChain;

    #[async_trait::async_trait]
    impl ChainClient for StalledChain {
        async fn get_multiple_accounts(&self, _: &[Pubkey]) -> anyhow::Result<Vec<Option<solana_sdk::account::Account>>> {
            Ok(Vec::new())
        }
        async fn get_account_data(&self, _: &Pubkey) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn find_token_account(
            &self,
            _: &Pubkey,
            _: &Pubkey,
        ) -> anyhow::Result<Option<crate::network::TokenHolding>> {
            Ok(None)
        }
        async fn get_balance(&self, _: &Pubkey) -> anyhow::Result<u64> {
            Ok(0)
        }
        async fn get_latest_blockhash(&self) -> anyhow::Result<Hash> {
            Ok(Hash::new_unique())
        }
        async fn simulate(&self, _: &VersionedTransaction) -> anyhow::Result<SimulationOutcome> {
            Ok(SimulationOutcome::default())
        }
        async fn send_and_confirm(&self, _: &VersionedTransaction) -> anyhow::Result<Signature> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let payer = Keypair::new();
        let submitter = TransactionSubmitter::new(Arc::new(StalledChain), false)
            .with_confirm_timeout(Duration::from_millis(10));
        let err = submitter.submit_instructions(&payer, &transfer(&payer)).await.unwrap_err();
        assert!(err.to_string().contains("not confirmed"));
    }

    #[tokio::test]
    async fn test_timeout_names_signed_transaction() {
        let payer = Keypair::new();
        let message = v0::Message::try_compile(&payer.pubkey(), &transfer(&payer), &[], Hash::new_unique()).unwrap();
        let transaction = VersionedTransaction::try_new(VersionedMessage::V0(message), &[&payer]).unwrap();
        let expected = transaction.signatures[0];

        let submitter = TransactionSubmitter::new(Arc::new(StalledChain), false)
            .with_confirm_timeout(Duration::from_millis(10));
        let err = submitter.submit(&transaction).await.unwrap_err();
        assert!(err.to_string().contains(&expected.to_string()));
    }
}
