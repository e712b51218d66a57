//! On-chain account layouts for AMM v4 pools and their order-book markets
//!
//! Only the fields needed to build a swap are decoded. Offsets are fixed by
//! the programs' packed structs.

use solana_sdk::pubkey::Pubkey;

use crate::error::SwapError;

pub const LIQUIDITY_STATE_V4_LEN: usize = 752;
pub const MARKET_STATE_V3_LEN: usize = 388;
const MAX_DECIMALS: u8 = 28;

mod liquidity_offsets {
    pub const BASE_DECIMALS: usize = 32;
    pub const QUOTE_DECIMALS: usize = 40;
    pub const BASE_VAULT: usize = 336;
    pub const QUOTE_VAULT: usize = 368;
    pub const BASE_MINT: usize = 400;
    pub const QUOTE_MINT: usize = 432;
    pub const LP_MINT: usize = 464;
    pub const OPEN_ORDERS: usize = 496;
    pub const MARKET_ID: usize = 528;
    pub const MARKET_PROGRAM: usize = 560;
    pub const TARGET_ORDERS: usize = 592;
}

mod market_offsets {
    pub const OWN_ADDRESS: usize = 13;
    pub const VAULT_SIGNER_NONCE: usize = 45;
    pub const BASE_MINT: usize = 53;
    pub const QUOTE_MINT: usize = 85;
    pub const BASE_VAULT: usize = 117;
    pub const QUOTE_VAULT: usize = 165;
    pub const EVENT_QUEUE: usize = 253;
    pub const BIDS: usize = 285;
    pub const ASKS: usize = 317;
}

/// AMM v4 pool state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityStateV4 {
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program: Pubkey,
    pub target_orders: Pubkey,
}

/// Order-book market state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketStateV3 {
    pub own_address: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
}

struct Reader<'a> {
    what: &'static str,
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(what: &'static str, data: &'a [u8], expected_len: usize) -> Result<Self, SwapError> {
        if data.len() < expected_len {
            return Err(SwapError::decode(
                what,
                format!("expected {} bytes, got {}", expected_len, data.len()),
            ));
        }
        Ok(Self { what, data })
    }

    fn bytes<const N: usize>(&self, offset: usize) -> Result<[u8; N], SwapError> {
        self.data
            .get(offset..offset + N)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| SwapError::decode(self.what, format!("offset {} out of range", offset)))
    }

    fn u64(&self, offset: usize) -> Result<u64, SwapError> {
        self.bytes::<8>(offset).map(u64::from_le_bytes)
    }

    /// Stored as u64; anything past the decimal scale limit is corrupt
    fn decimals(&self, offset: usize) -> Result<u8, SwapError> {
        let raw = self.u64(offset)?;
        match u8::try_from(raw) {
            Ok(decimals) if decimals <= MAX_DECIMALS => Ok(decimals),
            _ => Err(SwapError::decode(self.what, format!("decimals {} out of range", raw))),
        }
    }

    fn pubkey(&self, offset: usize) -> Result<Pubkey, SwapError> {
        self.bytes::<32>(offset).map(Pubkey::new_from_array)
    }
}

pub fn decode_liquidity_state(data: &[u8]) -> Result<LiquidityStateV4, SwapError> {
    use liquidity_offsets::*;
    let r = Reader::new("amm v4 liquidity state", data, LIQUIDITY_STATE_V4_LEN)?;

    Ok(LiquidityStateV4 {
        base_decimals: r.decimals(BASE_DECIMALS)?,
        quote_decimals: r.decimals(QUOTE_DECIMALS)?,
        base_vault: r.pubkey(BASE_VAULT)?,
        quote_vault: r.pubkey(QUOTE_VAULT)?,
        base_mint: r.pubkey(BASE_MINT)?,
        quote_mint: r.pubkey(QUOTE_MINT)?,
        lp_mint: r.pubkey(LP_MINT)?,
        open_orders: r.pubkey(OPEN_ORDERS)?,
        market_id: r.pubkey(MARKET_ID)?,
        market_program: r.pubkey(MARKET_PROGRAM)?,
        target_orders: r.pubkey(TARGET_ORDERS)?,
    })
}

pub fn decode_market_state(data: &[u8]) -> Result<MarketStateV3, SwapError> {
    use market_offsets::*;
    let r = Reader::new("market v3 state", data, MARKET_STATE_V3_LEN)?;

    Ok(MarketStateV3 {
        own_address: r.pubkey(OWN_ADDRESS)?,
        vault_signer_nonce: r.u64(VAULT_SIGNER_NONCE)?,
        base_mint: r.pubkey(BASE_MINT)?,
        quote_mint: r.pubkey(QUOTE_MINT)?,
        base_vault: r.pubkey(BASE_VAULT)?,
        quote_vault: r.pubkey(QUOTE_VAULT)?,
        event_queue: r.pubkey(EVENT_QUEUE)?,
        bids: r.pubkey(BIDS)?,
        asks: r.pubkey(ASKS)?,
    })
}

/// Vault signer of a market: `[market, nonce_le]` under the market program
pub fn market_authority(
    market: &Pubkey,
    nonce: u64,
    market_program: &Pubkey,
) -> Result<Pubkey, SwapError> {
    let nonce_bytes = nonce.to_le_bytes();
    Pubkey::create_program_address(&[market.as_ref(), &nonce_bytes], market_program)
        .map_err(|e| SwapError::decode("market authority", e))
}
