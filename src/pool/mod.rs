//! Pool resolution
//!
//! Locates the AMM pool for a mint pair and decodes everything a direct
//! swap instruction needs:
//! - Pool, market and vault addresses
//! - Per-side decimals
//! - Live vault reserves

pub mod layout;
pub mod resolver;

pub use resolver::{rank_pairs, DiscoveryPair, HttpDiscovery, PoolDiscovery, PoolResolver};

#[cfg(test)]
pub use resolver::MockPoolDiscovery;

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;

/// Accounts and precisions for one AMM v4 pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolKeys {
    pub amm_id: Pubkey,
    pub amm_program: Pubkey,
    pub authority: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub market_program: Pubkey,
    pub market_id: Pubkey,
    pub market_authority: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub event_queue: Pubkey,
}

impl PoolKeys {
    pub fn decimals_of(&self, mint: &Pubkey) -> Option<u8> {
        if *mint == self.base_mint {
            Some(self.base_decimals)
        } else if *mint == self.quote_mint {
            Some(self.quote_decimals)
        } else {
            None
        }
    }
}

/// Vault balances in UI units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReserves {
    pub base: Decimal,
    pub quote: Decimal,
}

impl PoolReserves {
    /// `(input_reserve, output_reserve)` for a swap that spends `input_mint`
    pub fn oriented(&self, keys: &PoolKeys, input_mint: &Pubkey) -> Option<(Decimal, Decimal)> {
        if *input_mint == keys.base_mint {
            Some((self.base, self.quote))
        } else if *input_mint == keys.quote_mint {
            Some((self.quote, self.base))
        } else {
            None
        }
    }
}
