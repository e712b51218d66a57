//! Transaction Assembler
//!
//! Builds the single atomic instruction list for one pool swap:
//! - Compute budget
//! - Wrapped-native account lifecycle (create, fund, sync, close)
//! - Missing associated token accounts
//! - The AMM v4 swap itself
//!
//! Every step lands in one transaction, so the swap and the account
//! cleanup either both apply or neither does.

use borsh::BorshSerialize;
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use tracing::debug;

use super::planner::SwapPlan;
use crate::config::ExecutionConfig;
use crate::error::SwapError;
use crate::network::ChainClient;
use crate::pool::PoolKeys;

/// AMM v4 `swap_base_in`
const SWAP_BASE_IN_OPCODE: u8 = 9;

#[derive(BorshSerialize)]
struct SwapBaseIn {
    instruction: u8,
    amount_in: u64,
    minimum_amount_out: u64,
}

/// How a wallet's token account for one side of the swap is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountResolution {
    /// Already on chain
    Existing(Pubkey),
    /// Associated account that must be created first; costs rent
    CreationRequired(Pubkey),
    /// Wrapped-native account opened and closed inside the transaction
    Ephemeral(Pubkey),
}

impl AccountResolution {
    pub fn address(&self) -> Pubkey {
        match self {
            AccountResolution::Existing(address)
            | AccountResolution::CreationRequired(address)
            | AccountResolution::Ephemeral(address) => *address,
        }
    }
}

/// Token accounts a wallet uses for one swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletAccounts {
    pub owner: Pubkey,
    pub source: AccountResolution,
    pub destination: AccountResolution,
}

/// Look up the wallet's accounts for `plan`
pub async fn resolve_accounts(
    chain: &dyn ChainClient,
    owner: &Pubkey,
    plan: &SwapPlan,
    native_mint: &Pubkey,
) -> Result<WalletAccounts, SwapError> {
    if plan.input_mint == plan.output_mint {
        return Err(SwapError::invalid_input("input and output mint are the same"));
    }

    let source = if plan.input_mint == *native_mint {
        AccountResolution::Ephemeral(get_associated_token_address(owner, native_mint))
    } else {
        match chain.find_token_account(owner, &plan.input_mint).await? {
            Some(holding) => AccountResolution::Existing(holding.address),
            None => {
                return Err(SwapError::invalid_input(format!(
                    "wallet {} holds no {} account",
                    owner, plan.input_mint
                )))
            }
        }
    };

    let destination = if plan.output_mint == *native_mint {
        AccountResolution::Ephemeral(get_associated_token_address(owner, native_mint))
    } else {
        match chain.find_token_account(owner, &plan.output_mint).await? {
            Some(holding) => AccountResolution::Existing(holding.address),
            None => AccountResolution::CreationRequired(get_associated_token_address(
                owner,
                &plan.output_mint,
            )),
        }
    };

    Ok(WalletAccounts {
        owner: *owner,
        source,
        destination,
    })
}

/// Role of one instruction in the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    ComputeBudget,
    CreateAccount(Pubkey),
    FundAccount { account: Pubkey, lamports: u64 },
    SyncNative(Pubkey),
    Swap,
    CloseAccount(Pubkey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStep {
    pub kind: StepKind,
    pub instruction: Instruction,
}

/// Ordered instructions for one atomic swap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapInstructionSet {
    pub steps: Vec<SwapStep>,
}

impl SwapInstructionSet {
    fn push(&mut self, kind: StepKind, instruction: Instruction) {
        self.steps.push(SwapStep { kind, instruction });
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|step| step.kind).collect()
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.steps.iter().map(|step| step.instruction.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Structural checks: one swap, and every created wrapped-native
    /// account closed exactly once after it
    pub fn verify(&self, ephemeral: &[Pubkey]) -> anyhow::Result<()> {
        let kinds = self.kinds();
        let swaps: Vec<usize> = positions(&kinds, |k| *k == StepKind::Swap);
        anyhow::ensure!(swaps.len() == 1, "expected one swap step, found {}", swaps.len());
        let swap_at = swaps[0];

        for account in ephemeral {
            let created = positions(&kinds, |k| *k == StepKind::CreateAccount(*account));
            let closed = positions(&kinds, |k| *k == StepKind::CloseAccount(*account));
            if created.is_empty() {
                continue;
            }
            anyhow::ensure!(closed.len() == 1, "{} created but closed {} times", account, closed.len());
            anyhow::ensure!(
                created[0] < swap_at && swap_at < closed[0],
                "{} lifecycle out of order",
                account
            );
        }
        Ok(())
    }
}

fn positions(kinds: &[StepKind], pred: impl Fn(&StepKind) -> bool) -> Vec<usize> {
    kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| pred(kind))
        .map(|(i, _)| i)
        .collect()
}

/// Builds the instruction set for one pool swap. Every token account is
/// assumed to belong to the classic SPL token program, which is the only
/// program AMM v4 pools trade through.
pub struct SwapAssembler {
    compute_unit_limit: u32,
    compute_unit_price: u64,
    native_mint: Pubkey,
}

impl SwapAssembler {
    pub fn new(config: &ExecutionConfig, native_mint: Pubkey) -> Self {
        Self {
            compute_unit_limit: config.compute_unit_limit,
            compute_unit_price: config.compute_unit_price,
            native_mint,
        }
    }

    pub fn assemble(
        &self,
        plan: &SwapPlan,
        keys: &PoolKeys,
        accounts: &WalletAccounts,
    ) -> Result<SwapInstructionSet, SwapError> {
        let owner = accounts.owner;
        let token_program = spl_token::id();
        let mut set = SwapInstructionSet::default();

        set.push(
            StepKind::ComputeBudget,
            ComputeBudgetInstruction::set_compute_unit_limit(self.compute_unit_limit),
        );
        set.push(
            StepKind::ComputeBudget,
            ComputeBudgetInstruction::set_compute_unit_price(self.compute_unit_price),
        );

        match accounts.source {
            AccountResolution::Ephemeral(wsol) => {
                set.push(StepKind::CreateAccount(wsol), self.create_ata(&owner, &self.native_mint));
                set.push(
                    StepKind::FundAccount { account: wsol, lamports: plan.amount_in },
                    system_instruction::transfer(&owner, &wsol, plan.amount_in),
                );
                set.push(StepKind::SyncNative(wsol), sync_native(&token_program, &wsol)?);
            }
            AccountResolution::CreationRequired(address) => {
                return Err(SwapError::invalid_input(format!(
                    "source account {} does not exist",
                    address
                )));
            }
            AccountResolution::Existing(_) => {}
        }

        match accounts.destination {
            AccountResolution::Ephemeral(wsol) => {
                set.push(StepKind::CreateAccount(wsol), self.create_ata(&owner, &self.native_mint));
                set.push(StepKind::SyncNative(wsol), sync_native(&token_program, &wsol)?);
            }
            AccountResolution::CreationRequired(address) => {
                set.push(StepKind::CreateAccount(address), self.create_ata(&owner, &plan.output_mint));
            }
            AccountResolution::Existing(_) => {}
        }

        set.push(
            StepKind::Swap,
            swap_instruction(
                keys,
                &accounts.source.address(),
                &accounts.destination.address(),
                &owner,
                plan.amount_in,
                plan.minimum_amount_out,
            )?,
        );

        for side in [accounts.source, accounts.destination] {
            if let AccountResolution::Ephemeral(wsol) = side {
                let close = spl_token::instruction::close_account(&token_program, &wsol, &owner, &owner, &[])
                    .map_err(|e| SwapError::invalid_input(format!("close instruction: {}", e)))?;
                set.push(StepKind::CloseAccount(wsol), close);
            }
        }

        debug!(
            "Assembled {} steps: {} -> {} amount_in={} min_out={}",
            set.len(),
            plan.input_mint,
            plan.output_mint,
            plan.amount_in,
            plan.minimum_amount_out
        );
        Ok(set)
    }

    fn create_ata(&self, owner: &Pubkey, mint: &Pubkey) -> Instruction {
        create_associated_token_account_idempotent(owner, owner, mint, &spl_token::id())
    }
}

fn sync_native(token_program: &Pubkey, account: &Pubkey) -> Result<Instruction, SwapError> {
    spl_token::instruction::sync_native(token_program, account)
        .map_err(|e| SwapError::invalid_input(format!("sync instruction: {}", e)))
}

/// The 17-byte `swap_base_in` payload
pub fn swap_payload(amount_in: u64, minimum_amount_out: u64) -> Result<Vec<u8>, SwapError> {
    borsh::to_vec(&SwapBaseIn {
        instruction: SWAP_BASE_IN_OPCODE,
        amount_in,
        minimum_amount_out,
    })
    .map_err(|e| SwapError::invalid_input(format!("swap payload: {}", e)))
}

pub fn swap_instruction(
    keys: &PoolKeys,
    user_source: &Pubkey,
    user_destination: &Pubkey,
    owner: &Pubkey,
    amount_in: u64,
    minimum_amount_out: u64,
) -> Result<Instruction, SwapError> {
    let accounts = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new(keys.amm_id, false),
        AccountMeta::new_readonly(keys.authority, false),
        AccountMeta::new(keys.open_orders, false),
        AccountMeta::new(keys.target_orders, false),
        AccountMeta::new(keys.base_vault, false),
        AccountMeta::new(keys.quote_vault, false),
        AccountMeta::new_readonly(keys.market_program, false),
        AccountMeta::new(keys.market_id, false),
        AccountMeta::new(keys.bids, false),
        AccountMeta::new(keys.asks, false),
        AccountMeta::new(keys.event_queue, false),
        AccountMeta::new(keys.market_base_vault, false),
        AccountMeta::new(keys.market_quote_vault, false),
        AccountMeta::new_readonly(keys.market_authority, false),
        AccountMeta::new(*user_source, false),
        AccountMeta::new(*user_destination, false),
        AccountMeta::new_readonly(*owner, true),
    ];

    Ok(Instruction {
        program_id: keys.amm_program,
        accounts,
        data: swap_payload(amount_in, minimum_amount_out)?,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_pool_keys;
    use super::*;
    use crate::network::{MockChainClient, TokenHolding};

    fn native() -> Pubkey {
        spl_token::native_mint::id()
    }

    fn assembler() -> SwapAssembler {
        SwapAssembler::new(&ExecutionConfig::default(), native())
    }

    fn buy_plan(token: Pubkey) -> SwapPlan {
        SwapPlan {
            input_mint: native(),
            output_mint: token,
            amount_in: 50_000_000,
            minimum_amount_out: 1_234,
        }
    }

    #[test]
    fn test_payload_layout() {
        let data = swap_payload(0x0102030405060708, 42).unwrap();
        assert_eq!(data.len(), 17);
        assert_eq!(data[0], 9);
        assert_eq!(&data[1..9], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&data[9..17], &42u64.to_le_bytes());
    }

    #[test]
    fn test_swap_instruction_accounts() {
        let keys = sample_pool_keys(Pubkey::new_unique(), native());
        let (source, dest, owner) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let ix = swap_instruction(&keys, &source, &dest, &owner, 10, 5).unwrap();

        assert_eq!(ix.program_id, keys.amm_program);
        assert_eq!(ix.accounts.len(), 18);
        assert_eq!(ix.accounts[0].pubkey, spl_token::id());
        assert_eq!(ix.accounts[1].pubkey, keys.amm_id);
        assert_eq!(ix.accounts[14].pubkey, keys.market_authority);
        assert!(!ix.accounts[14].is_writable);
        assert_eq!(ix.accounts[15].pubkey, source);
        assert_eq!(ix.accounts[16].pubkey, dest);
        assert!(ix.accounts[17].is_signer);
        assert_eq!(ix.accounts.iter().filter(|m| m.is_signer).count(), 1);
    }

    #[test]
    fn test_buy_wraps_funds_and_closes() {
        let owner = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let wsol = get_associated_token_address(&owner, &native());
        let token_ata = get_associated_token_address(&owner, &token);
        let keys = sample_pool_keys(token, native());
        let accounts = WalletAccounts {
            owner,
            source: AccountResolution::Ephemeral(wsol),
            destination: AccountResolution::CreationRequired(token_ata),
        };

        let set = assembler().assemble(&buy_plan(token), &keys, &accounts).unwrap();
        assert_eq!(
            set.kinds(),
            vec![
                StepKind::ComputeBudget,
                StepKind::ComputeBudget,
                StepKind::CreateAccount(wsol),
                StepKind::FundAccount { account: wsol, lamports: 50_000_000 },
                StepKind::SyncNative(wsol),
                StepKind::CreateAccount(token_ata),
                StepKind::Swap,
                StepKind::CloseAccount(wsol),
            ]
        );
        set.verify(&[wsol]).unwrap();
    }

    #[test]
    fn test_token_steps_target_classic_token_program() {
        let owner = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let accounts = WalletAccounts {
            owner,
            source: AccountResolution::Ephemeral(get_associated_token_address(&owner, &native())),
            destination: AccountResolution::CreationRequired(get_associated_token_address(&owner, &token)),
        };

        let set = assembler()
            .assemble(&buy_plan(token), &sample_pool_keys(token, native()), &accounts)
            .unwrap();
        for step in &set.steps {
            match step.kind {
                StepKind::SyncNative(_) | StepKind::CloseAccount(_) => {
                    assert_eq!(step.instruction.program_id, spl_token::id())
                }
                StepKind::CreateAccount(_) => {
                    assert_eq!(step.instruction.accounts[5].pubkey, spl_token::id())
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_sell_into_native_closes_destination() {
        let owner = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let wsol = get_associated_token_address(&owner, &native());
        let held = Pubkey::new_unique();
        let keys = sample_pool_keys(token, native());
        let plan = SwapPlan {
            input_mint: token,
            output_mint: native(),
            amount_in: 1_000,
            minimum_amount_out: 900,
        };
        let accounts = WalletAccounts {
            owner,
            source: AccountResolution::Existing(held),
            destination: AccountResolution::Ephemeral(wsol),
        };

        let set = assembler().assemble(&plan, &keys, &accounts).unwrap();
        assert_eq!(
            set.kinds()[2..],
            [
                StepKind::CreateAccount(wsol),
                StepKind::SyncNative(wsol),
                StepKind::Swap,
                StepKind::CloseAccount(wsol),
            ]
        );
        set.verify(&[wsol]).unwrap();

        let swap = &set.steps[4].instruction;
        assert_eq!(swap.accounts[15].pubkey, held);
        assert_eq!(swap.accounts[16].pubkey, wsol);
    }

    #[test]
    fn test_existing_accounts_need_no_lifecycle() {
        let owner = Pubkey::new_unique();
        let stable = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let plan = SwapPlan {
            input_mint: stable,
            output_mint: token,
            amount_in: 5_000_000,
            minimum_amount_out: 1,
        };
        let accounts = WalletAccounts {
            owner,
            source: AccountResolution::Existing(Pubkey::new_unique()),
            destination: AccountResolution::Existing(Pubkey::new_unique()),
        };

        let set = assembler().assemble(&plan, &sample_pool_keys(token, stable), &accounts).unwrap();
        assert_eq!(set.kinds(), vec![StepKind::ComputeBudget, StepKind::ComputeBudget, StepKind::Swap]);
    }

    #[test]
    fn test_verify_flags_missing_close() {
        let wsol = Pubkey::new_unique();
        let mut set = SwapInstructionSet::default();
        let dummy = Instruction::new_with_bytes(Pubkey::new_unique(), &[], vec![]);
        set.push(StepKind::CreateAccount(wsol), dummy.clone());
        set.push(StepKind::Swap, dummy);
        assert!(set.verify(&[wsol]).is_err());
    }

    #[tokio::test]
    async fn test_resolve_accounts_for_buy() {
        let owner = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let mut chain = MockChainClient::new();
        chain.expect_find_token_account().returning(|_, _| Ok(None));

        let accounts = resolve_accounts(&chain, &owner, &buy_plan(token), &native()).await.unwrap();
        assert_eq!(
            accounts.source,
            AccountResolution::Ephemeral(get_associated_token_address(&owner, &native()))
        );
        assert_eq!(
            accounts.destination,
            AccountResolution::CreationRequired(get_associated_token_address(&owner, &token))
        );
    }

    #[tokio::test]
    async fn test_resolve_accounts_reuses_existing() {
        let owner = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let existing = Pubkey::new_unique();
        let mut chain = MockChainClient::new();
        chain.expect_find_token_account().returning(move |_, _| {
            Ok(Some(TokenHolding { address: existing, amount: 7, decimals: 6 }))
        });

        let accounts = resolve_accounts(&chain, &owner, &buy_plan(token), &native()).await.unwrap();
        assert_eq!(accounts.destination, AccountResolution::Existing(existing));
    }

    #[tokio::test]
    async fn test_resolve_accounts_sell_without_holding_fails() {
        let mut chain = MockChainClient::new();
        chain.expect_find_token_account().returning(|_, _| Ok(None));
        let plan = SwapPlan {
            input_mint: Pubkey::new_unique(),
            output_mint: native(),
            amount_in: 1,
            minimum_amount_out: 0,
        };

        let err = resolve_accounts(&chain, &Pubkey::new_unique(), &plan, &native()).await.unwrap_err();
        assert!(matches!(err, SwapError::InvalidPlanInput(_)));
    }
}
