//! Swap Router
//!
//! One `execute` call over two interchangeable backends:
//! - Pool: resolve, plan, assemble and submit locally
//! - Aggregator: quote and sign a transaction built remotely
//!
//! Any backend failure comes back as `SwapError::SwapFailed` tagged with the
//! routing mode.

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use tracing::{debug, info};

use super::jupiter::AggregatorApi;
use super::planner::{from_base_units, plan, to_base_units, SwapPlan};
use super::submitter::TransactionSubmitter;
use super::tx_builder::{resolve_accounts, SwapAssembler};
use crate::config::RoutingMode;
use crate::error::SwapError;
use crate::network::ChainClient;
use crate::pool::{PoolKeys, PoolResolver};
use crate::telemetry::metrics;
use crate::wallet::WalletHandle;

/// One exact-in swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Smallest units of `input_mint`
    pub amount_in: u64,
    pub slippage_bps: u16,
}

/// A confirmed swap, amounts in smallest units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Amount actually spent
    pub input_amount: u64,
    /// Quoted output
    pub output_amount: u64,
    pub signature: Signature,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapBackend: Send + Sync {
    async fn execute(&self, wallet: &WalletHandle, request: &SwapRequest) -> Result<SwapOutcome, SwapError>;
}

/// Direct constant-product pool swaps
pub struct PoolSwapBackend {
    chain: Arc<dyn ChainClient>,
    resolver: PoolResolver,
    assembler: SwapAssembler,
    submitter: Arc<TransactionSubmitter>,
    native_mint: Pubkey,
}

impl PoolSwapBackend {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        resolver: PoolResolver,
        assembler: SwapAssembler,
        submitter: Arc<TransactionSubmitter>,
        native_mint: Pubkey,
    ) -> Self {
        Self {
            chain,
            resolver,
            assembler,
            submitter,
            native_mint,
        }
    }

    async fn pool_for(&self, request: &SwapRequest) -> Result<PoolKeys, SwapError> {
        if request.input_mint == self.native_mint {
            self.resolver.resolve(&request.output_mint).await
        } else if request.output_mint == self.native_mint {
            self.resolver.resolve(&request.input_mint).await
        } else {
            self.resolver
                .resolve_pair(&request.input_mint, &request.output_mint)
                .await
        }
    }
}

#[async_trait]
impl SwapBackend for PoolSwapBackend {
    async fn execute(&self, wallet: &WalletHandle, request: &SwapRequest) -> Result<SwapOutcome, SwapError> {
        let keys = self.pool_for(request).await?;
        let reserves = self.resolver.fetch_reserves(&keys).await?;

        let (input_reserve, output_reserve) = reserves
            .oriented(&keys, &request.input_mint)
            .ok_or_else(|| SwapError::decode("pool keys", "input mint not in pool"))?;
        let input_decimals = keys
            .decimals_of(&request.input_mint)
            .ok_or_else(|| SwapError::decode("pool keys", "input mint not in pool"))?;
        let output_decimals = keys
            .decimals_of(&request.output_mint)
            .ok_or_else(|| SwapError::decode("pool keys", "output mint not in pool"))?;

        let planned = plan(
            from_base_units(request.amount_in, input_decimals),
            input_reserve,
            output_reserve,
            request.slippage_bps,
        )?;
        let swap_plan = SwapPlan::from_amounts(
            request.input_mint,
            request.output_mint,
            &planned,
            input_decimals,
            output_decimals,
        )?;
        debug!(
            "Planned {} -> {} against reserves {} / {}",
            planned.amount_in, planned.amount_out, input_reserve, output_reserve
        );

        let accounts = resolve_accounts(
            self.chain.as_ref(),
            &wallet.pubkey(),
            &swap_plan,
            &self.native_mint,
        )
        .await?;
        let instructions = self.assembler.assemble(&swap_plan, &keys, &accounts)?;

        let signature = self
            .submitter
            .submit_instructions(wallet.keypair(), &instructions.instructions())
            .await?;

        Ok(SwapOutcome {
            input_amount: swap_plan.amount_in,
            output_amount: to_base_units(planned.amount_out, output_decimals)?,
            signature,
        })
    }
}

/// Swaps through the quote aggregator
pub struct AggregatorSwapBackend {
    jupiter: Arc<dyn AggregatorApi>,
    submitter: Arc<TransactionSubmitter>,
}

impl AggregatorSwapBackend {
    pub fn new(jupiter: Arc<dyn AggregatorApi>, submitter: Arc<TransactionSubmitter>) -> Self {
        Self { jupiter, submitter }
    }
}

#[async_trait]
impl SwapBackend for AggregatorSwapBackend {
    async fn execute(&self, wallet: &WalletHandle, request: &SwapRequest) -> Result<SwapOutcome, SwapError> {
        let quote = self
            .jupiter
            .get_quote(
                &request.input_mint,
                &request.output_mint,
                request.amount_in,
                request.slippage_bps,
            )
            .await?;
        let transaction = self
            .jupiter
            .get_swap_transaction(&quote, &wallet.pubkey())
            .await?;
        let signature = self
            .submitter
            .submit_presigned(wallet.keypair(), transaction)
            .await?;

        Ok(SwapOutcome {
            input_amount: quote.in_amount,
            output_amount: quote.out_amount,
            signature,
        })
    }
}

pub struct SwapRouter {
    pool: Arc<dyn SwapBackend>,
    aggregator: Arc<dyn SwapBackend>,
}

impl SwapRouter {
    pub fn new(pool: Arc<dyn SwapBackend>, aggregator: Arc<dyn SwapBackend>) -> Self {
        Self { pool, aggregator }
    }

    pub async fn execute(
        &self,
        mode: RoutingMode,
        wallet: &WalletHandle,
        request: &SwapRequest,
    ) -> Result<SwapOutcome, SwapError> {
        let backend = match mode {
            RoutingMode::Pool => &self.pool,
            RoutingMode::Aggregator => &self.aggregator,
        };

        let outcome = backend
            .execute(wallet, request)
            .await
            .map_err(|e| e.into_swap_failed(mode))?;

        metrics::record_swap(mode);
        info!(
            "{} swap {} -> {} by {}: in={} out={} tx={}",
            mode,
            request.input_mint,
            request.output_mint,
            wallet,
            outcome.input_amount,
            outcome.output_amount,
            outcome.signature
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, ProtocolsConfig};
    use crate::execution::jupiter::{MockAggregatorApi, Quote};
    use crate::execution::tx_builder::swap_payload;
    use crate::network::{MockChainClient, TokenHolding};
    use crate::pool::layout::fixtures::*;
    use crate::pool::resolver::{DiscoveryLiquidity, DiscoveryToken};
    use crate::pool::{DiscoveryPair, MockPoolDiscovery};
    use parking_lot::Mutex;
    use solana_sdk::{
        account::Account,
        hash::Hash,
        message::{v0, VersionedMessage},
        signature::Keypair,
        system_instruction,
        transaction::VersionedTransaction,
    };
    use spl_token::solana_program::program_pack::Pack;
    use spl_token::state::{Account as TokenAccount, AccountState};

    const BASE_RESERVE: u64 = 3_000_000_000_000;
    const QUOTE_RESERVE: u64 = 1_200_000_000_000;

    fn request() -> SwapRequest {
        SwapRequest {
            input_mint: spl_token::native_mint::id(),
            output_mint: Pubkey::new_unique(),
            amount_in: 1_000_000,
            slippage_bps: 100,
        }
    }

    fn outcome(amount: u64) -> SwapOutcome {
        SwapOutcome {
            input_amount: amount,
            output_amount: amount * 2,
            signature: Signature::new_unique(),
        }
    }

    fn account(owner: Pubkey, data: Vec<u8>) -> Account {
        Account {
            lamports: 2_039_280,
            data,
            owner,
            executable: false,
            rent_epoch: 0,
        }
    }

    fn vault(mint: Pubkey, amount: u64) -> Account {
        let state = TokenAccount {
            mint,
            owner: Pubkey::new_unique(),
            amount,
            state: AccountState::Initialized,
            ..TokenAccount::default()
        };
        let mut data = vec![0u8; TokenAccount::LEN];
        TokenAccount::pack(state, &mut data).unwrap();
        account(spl_token::id(), data)
    }

    /// Pool backend over one token/SOL AMM v4 pool, capturing what it sends
    struct PoolFixture {
        backend: PoolSwapBackend,
        token: Pubkey,
        amm_program: Pubkey,
        signature: Signature,
        sent: Arc<Mutex<Option<VersionedTransaction>>>,
    }

    impl PoolFixture {
        fn new(holding: Option<TokenHolding>) -> Self {
            let protocols = ProtocolsConfig::default();
            let amm_program = protocols.raydium.amm_program().unwrap();
            let sol = spl_token::native_mint::id();
            let token = Pubkey::new_unique();
            let amm_id = Pubkey::new_unique();
            let market_program = Pubkey::new_unique();

            let amm = sample_liquidity_state(token, sol, market_program);
            let market = sample_market_state(amm.market_id, &market_program, token, sol);
            let (amm_raw, market_raw) = (encode_liquidity_state(&amm), encode_market_state(&market));
            let (base_vault, quote_vault) = (amm.base_vault, amm.quote_vault);

            let candidate = DiscoveryPair {
                dex_id: "raydium".to_string(),
                pair_address: amm_id.to_string(),
                base_token: DiscoveryToken { address: token.to_string() },
                quote_token: DiscoveryToken { address: sol.to_string() },
                liquidity: Some(DiscoveryLiquidity { usd: Some(250_000.0) }),
                labels: Vec::new(),
            };
            let mut discovery = MockPoolDiscovery::new();
            discovery
                .expect_pairs()
                .returning(move |_, _| Ok(vec![candidate.clone()]));

            let signature = Signature::new_unique();
            let sent: Arc<Mutex<Option<VersionedTransaction>>> = Arc::default();
            let captured = sent.clone();

            let mut chain = MockChainClient::new();
            chain.expect_get_multiple_accounts().returning(move |keys| {
                if keys == &[amm_id][..] {
                    Ok(vec![Some(account(amm_program, amm_raw.clone()))])
                } else {
                    assert_eq!(keys, &[base_vault, quote_vault][..]);
                    Ok(vec![
                        Some(vault(token, BASE_RESERVE)),
                        Some(vault(sol, QUOTE_RESERVE)),
                    ])
                }
            });
            chain
                .expect_get_account_data()
                .returning(move |_| Ok(market_raw.clone()));
            chain
                .expect_find_token_account()
                .returning(move |_, _| Ok(holding));
            chain
                .expect_get_latest_blockhash()
                .returning(|| Ok(Hash::new_unique()));
            chain.expect_simulate().never();
            chain.expect_send_and_confirm().times(1).returning(move |tx| {
                *captured.lock() = Some(tx.clone());
                Ok(signature)
            });

            let chain: Arc<dyn ChainClient> = Arc::new(chain);
            let resolver = PoolResolver::with_discovery(chain.clone(), Arc::new(discovery), &protocols).unwrap();
            let submitter = Arc::new(TransactionSubmitter::new(chain.clone(), false));
            let backend = PoolSwapBackend::new(
                chain,
                resolver,
                SwapAssembler::new(&ExecutionConfig::default(), sol),
                submitter,
                sol,
            );

            Self {
                backend,
                token,
                amm_program,
                signature,
                sent,
            }
        }

        /// Payload and account count of the pool instruction that was sent
        fn sent_swap(&self) -> (Vec<u8>, usize) {
            let tx = self.sent.lock().take().unwrap();
            let keys = tx.message.static_account_keys().to_vec();
            let swap = tx
                .message
                .instructions()
                .iter()
                .find(|ix| keys[ix.program_id_index as usize] == self.amm_program)
                .unwrap()
                .clone();
            (swap.data, swap.accounts.len())
        }
    }

    #[tokio::test]
    async fn test_pool_backend_buy_sends_planned_amounts() {
        let sol = spl_token::native_mint::id();
        let fixture = PoolFixture::new(None);
        let wallet = WalletHandle::new(Keypair::new());
        let request = SwapRequest {
            input_mint: sol,
            output_mint: fixture.token,
            amount_in: 500_000_000,
            slippage_bps: 100,
        };

        let outcome = fixture.backend.execute(&wallet, &request).await.unwrap();

        // SOL in against the quote vault, token out of the base vault
        let planned = plan(
            from_base_units(500_000_000, 9),
            from_base_units(QUOTE_RESERVE, 9),
            from_base_units(BASE_RESERVE, 6),
            100,
        )
        .unwrap();
        let expected = SwapPlan::from_amounts(sol, fixture.token, &planned, 9, 6).unwrap();

        assert_eq!(outcome.signature, fixture.signature);
        assert_eq!(outcome.input_amount, 500_000_000);
        assert_eq!(outcome.output_amount, to_base_units(planned.amount_out, 6).unwrap());
        assert!(expected.minimum_amount_out < outcome.output_amount);

        let (data, metas) = fixture.sent_swap();
        assert_eq!(data, swap_payload(500_000_000, expected.minimum_amount_out).unwrap());
        assert_eq!(metas, 18);
    }

    #[tokio::test]
    async fn test_pool_backend_sell_orients_reserves() {
        let sol = spl_token::native_mint::id();
        let holding = TokenHolding {
            address: Pubkey::new_unique(),
            amount: 5_000_000_000,
            decimals: 6,
        };
        let fixture = PoolFixture::new(Some(holding));
        let wallet = WalletHandle::new(Keypair::new());
        let request = SwapRequest {
            input_mint: fixture.token,
            output_mint: sol,
            amount_in: 1_000_000_000,
            slippage_bps: 50,
        };

        let outcome = fixture.backend.execute(&wallet, &request).await.unwrap();

        let planned = plan(
            from_base_units(1_000_000_000, 6),
            from_base_units(BASE_RESERVE, 6),
            from_base_units(QUOTE_RESERVE, 9),
            50,
        )
        .unwrap();
        let expected = SwapPlan::from_amounts(fixture.token, sol, &planned, 6, 9).unwrap();

        assert_eq!(outcome.input_amount, 1_000_000_000);
        assert_eq!(outcome.output_amount, to_base_units(planned.amount_out, 9).unwrap());

        let (data, _) = fixture.sent_swap();
        assert_eq!(data, swap_payload(1_000_000_000, expected.minimum_amount_out).unwrap());
    }

    #[tokio::test]
    async fn test_aggregator_backend_reports_quoted_amounts() {
        let wallet = WalletHandle::new(Keypair::new());
        let owner = wallet.pubkey();
        let sent = request();
        let quote = Quote::from_json(serde_json::json!({
            "inAmount": "1000000",
            "outAmount": "2500000",
            "otherAmountThreshold": "2475000"
        }))
        .unwrap();

        let mut jupiter = MockAggregatorApi::new();
        jupiter
            .expect_get_quote()
            .withf(move |input, output, amount, slippage| {
                *input == sent.input_mint
                    && *output == sent.output_mint
                    && *amount == sent.amount_in
                    && *slippage == sent.slippage_bps
            })
            .times(1)
            .returning(move |_, _, _, _| Ok(quote.clone()));
        jupiter
            .expect_get_swap_transaction()
            .withf(move |_, user| *user == owner)
            .times(1)
            .returning(|_, user| {
                let ix = system_instruction::transfer(user, &Pubkey::new_unique(), 5);
                let message = v0::Message::try_compile(user, &[ix], &[], Hash::new_unique()).unwrap();
                Ok(VersionedTransaction {
                    signatures: vec![Signature::default()],
                    message: VersionedMessage::V0(message),
                })
            });

        let signature = Signature::new_unique();
        let mut chain = MockChainClient::new();
        chain
            .expect_send_and_confirm()
            .withf(|tx| tx.verify_with_results().iter().all(|ok| *ok))
            .times(1)
            .returning(move |_| Ok(signature));

        let backend = AggregatorSwapBackend::new(
            Arc::new(jupiter),
            Arc::new(TransactionSubmitter::new(Arc::new(chain), false)),
        );
        let outcome = backend.execute(&wallet, &sent).await.unwrap();
        assert_eq!(outcome.input_amount, 1_000_000);
        assert_eq!(outcome.output_amount, 2_500_000);
        assert_eq!(outcome.signature, signature);
    }

    #[tokio::test]
    async fn test_dispatches_by_mode() {
        let mut pool = MockSwapBackend::new();
        pool.expect_execute().times(1).returning(|_, _| Ok(outcome(1)));
        let mut aggregator = MockSwapBackend::new();
        aggregator.expect_execute().times(1).returning(|_, _| Ok(outcome(2)));

        let router = SwapRouter::new(Arc::new(pool), Arc::new(aggregator));
        let wallet = WalletHandle::new(Keypair::new());

        let via_pool = router.execute(RoutingMode::Pool, &wallet, &request()).await.unwrap();
        let via_aggregator = router.execute(RoutingMode::Aggregator, &wallet, &request()).await.unwrap();
        assert_eq!(via_pool.input_amount, 1);
        assert_eq!(via_aggregator.input_amount, 2);
    }

    #[tokio::test]
    async fn test_failures_wrapped_with_mode() {
        let mut pool = MockSwapBackend::new();
        pool.expect_execute().returning(|_, request| {
            Err(SwapError::PoolNotFound {
                mint: request.output_mint,
                quote: request.input_mint,
            })
        });
        let mut aggregator = MockSwapBackend::new();
        aggregator
            .expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("Jupiter quote failed: 429").into()));

        let router = SwapRouter::new(Arc::new(pool), Arc::new(aggregator));
        let wallet = WalletHandle::new(Keypair::new());

        let err = router.execute(RoutingMode::Pool, &wallet, &request()).await.unwrap_err();
        assert!(matches!(err, SwapError::SwapFailed { mode: RoutingMode::Pool, .. }));
        assert!(matches!(err.root(), SwapError::PoolNotFound { .. }));

        let err = router.execute(RoutingMode::Aggregator, &wallet, &request()).await.unwrap_err();
        assert!(matches!(err, SwapError::SwapFailed { mode: RoutingMode::Aggregator, .. }));
        assert!(err.to_string().contains("429"));
    }
}
