//! Swap Planner
//!
//! Constant-product pricing with a slippage-bounded minimum output.
//! Amounts are planned in UI units and truncated toward zero when converted
//! to integer base units, so the on-chain minimum never exceeds the quoted
//! output.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;

use crate::error::SwapError;

const BPS_DENOMINATOR: u32 = 10_000;

/// Planned amounts in UI units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAmounts {
    pub amount_in: Decimal,
    /// Output at the current reserves
    pub amount_out: Decimal,
    /// Output after the slippage allowance
    pub minimum_out: Decimal,
}

/// Quote a swap of `amount_in` against `(input_reserve, output_reserve)`
pub fn plan(
    amount_in: Decimal,
    input_reserve: Decimal,
    output_reserve: Decimal,
    slippage_bps: u16,
) -> Result<PlannedAmounts, SwapError> {
    if amount_in <= Decimal::ZERO {
        return Err(SwapError::invalid_input(format!("amount {} must be positive", amount_in)));
    }
    if input_reserve <= Decimal::ZERO || output_reserve <= Decimal::ZERO {
        return Err(SwapError::invalid_input(format!(
            "reserves must be positive, got {} / {}",
            input_reserve, output_reserve
        )));
    }
    if u32::from(slippage_bps) > BPS_DENOMINATOR {
        return Err(SwapError::invalid_input(format!("slippage {} bps above 100%", slippage_bps)));
    }

    let overflow = || SwapError::invalid_input("reserve product overflows");
    let k = input_reserve.checked_mul(output_reserve).ok_or_else(overflow)?;
    let new_input_reserve = input_reserve.checked_add(amount_in).ok_or_else(overflow)?;
    let new_output_reserve = k.checked_div(new_input_reserve).ok_or_else(overflow)?;
    let amount_out = output_reserve - new_output_reserve;

    let keep = Decimal::ONE - Decimal::from(slippage_bps) / Decimal::from(BPS_DENOMINATOR);
    let minimum_out = (amount_out * keep).max(Decimal::ZERO);

    Ok(PlannedAmounts {
        amount_in,
        amount_out,
        minimum_out,
    })
}

/// Integer base units, truncated toward zero
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<u64, SwapError> {
    let scale = Decimal::from(10u64.checked_pow(decimals as u32).ok_or_else(|| {
        SwapError::invalid_input(format!("{} decimals out of range", decimals))
    })?);
    amount
        .checked_mul(scale)
        .map(|scaled| scaled.trunc())
        .and_then(|units| units.to_u64())
        .ok_or_else(|| SwapError::invalid_input(format!("{} does not fit base units", amount)))
}

/// UI units from integer base units
pub fn from_base_units(amount: u64, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(amount as i128, decimals.min(28) as u32)
}

/// A fully sized swap, ready for assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPlan {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Smallest units of `input_mint`
    pub amount_in: u64,
    /// Smallest units of `output_mint`
    pub minimum_amount_out: u64,
}

impl SwapPlan {
    pub fn from_amounts(
        input_mint: Pubkey,
        output_mint: Pubkey,
        amounts: &PlannedAmounts,
        input_decimals: u8,
        output_decimals: u8,
    ) -> Result<Self, SwapError> {
        let amount_in = to_base_units(amounts.amount_in, input_decimals)?;
        if amount_in == 0 {
            return Err(SwapError::invalid_input(format!(
                "amount {} is below one base unit",
                amounts.amount_in
            )));
        }

        Ok(Self {
            input_mint,
            output_mint,
            amount_in,
            minimum_amount_out: to_base_units(amounts.minimum_out, output_decimals)?,
        })
    }
}
