//! Fee & Sanity Policy
//!
//! Fees are charged on the computed reserve amount, never on the order's face
//! amount. Fees round up and user payouts round down, so rounding can only
//! ever favour the fee address and the reserve.

use crate::errors::{BondError, BondResult};
use lib_types::{Coins, DecCoins};
use rust_decimal::Decimal;

/// Checks tx and exit fee percentages: each in [0, 100) and summing below 100.
pub fn validate_fee_percentages(tx_fee: Decimal, exit_fee: Decimal) -> BondResult<()> {
    if tx_fee.is_sign_negative() && !tx_fee.is_zero() {
        return Err(BondError::ArgumentCannotBeNegative("tx_fee_percentage".to_string()));
    }
    if exit_fee.is_sign_negative() && !exit_fee.is_zero() {
        return Err(BondError::ArgumentCannotBeNegative("exit_fee_percentage".to_string()));
    }
    let total = tx_fee.checked_add(exit_fee).ok_or(BondError::Overflow)?;
    if total >= Decimal::ONE_HUNDRED {
        return Err(BondError::FeesCannotBeOrExceed100Percent);
    }
    Ok(())
}

/// Unrounded `percentage`% of `gross`
pub fn fee_for(percentage: Decimal, gross: Decimal) -> BondResult<Decimal> {
    gross
        .checked_mul(percentage)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(BondError::Overflow)
}

/// Per-denom fee on `gross`, rounded up
pub fn fee_coins(percentage: Decimal, gross: &DecCoins) -> BondResult<Coins> {
    let mut fees = DecCoins::new();
    for (denom, amount) in gross.iter() {
        fees.insert(denom, fee_for(percentage, amount)?);
    }
    Ok(fees.ceil()?)
}

/// Caps each fee denom at the matching return so that
/// `returns - fees` can never underflow.
pub fn adjust_fees(fees: &Coins, returns: &Coins) -> Coins {
    fees.capped_by(returns)
}

/// Sanity band check on the ratio `reserve_a / reserve_b`.
///
/// A zero `sanity_rate` disables the check. A zero `reserve_b` always
/// violates. The lower bound is floored at zero.
pub fn violates_sanity_rate(
    sanity_rate: Decimal,
    margin_percentage: Decimal,
    reserve_a: Decimal,
    reserve_b: Decimal,
) -> BondResult<bool> {
    if sanity_rate.is_zero() {
        return Ok(false);
    }
    if reserve_b.is_zero() {
        return Ok(true);
    }
    let rate = reserve_a.checked_div(reserve_b).ok_or(BondError::Overflow)?;
    let margin = margin_percentage
        .checked_div(Decimal::ONE_HUNDRED)
        .ok_or(BondError::Overflow)?;
    let max_rate = sanity_rate
        .checked_mul(Decimal::ONE + margin)
        .ok_or(BondError::Overflow)?;
    let min_rate = sanity_rate
        .checked_mul(Decimal::ONE - margin)
        .ok_or(BondError::Overflow)?
        .max(Decimal::ZERO);
    Ok(rate < min_rate || rate > max_rate)
}
