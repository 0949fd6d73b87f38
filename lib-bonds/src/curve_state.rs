//! Curve State
//!
//! The supply and reserve point a bond's curve is evaluated at. Admission,
//! the unfulfillable-order sweep, queries and settlement all walk the same
//! state forward one order at a time, so they agree on every price.
//!
//! Each `apply_*` either advances the state and returns the quote, or fails
//! and leaves the state untouched.

use crate::bond::{Bond, SwapReturn};
use crate::errors::{BondError, BondResult};
use crate::fees;
use crate::order::{BuyOrder, SellOrder, SwapOrder};
use lib_types::{Amount, Coin, Coins, DecCoins};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rounded cost of a buy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    /// Reserve cost, rounded up; what the reserve receives
    pub prices: Coins,
    /// Transaction fee on the unrounded cost, rounded up
    pub tx_fees: Coins,
    /// `prices + tx_fees`; what the buyer pays
    pub total_prices: Coins,
}

/// Rounded proceeds of a sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellQuote {
    /// Reserve returns, rounded down; what leaves the reserve
    pub returns: Coins,
    pub tx_fees: Coins,
    pub exit_fees: Coins,
    /// `tx_fees + exit_fees`, capped per denom at `returns`
    pub total_fees: Coins,
    /// `returns - total_fees`; what the seller receives
    pub total_returns: Coins,
}

/// Supply and reserve levels of one bond
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    pub supply: Amount,
    pub reserves: Coins,
}

impl CurveState {
    pub fn new(supply: Amount, reserves: Coins) -> Self {
        Self { supply, reserves }
    }

    /// State from the bond's supply and the reserve address balances
    pub fn live(bond: &Bond, reserve_address_balances: &Coins) -> Self {
        Self::new(
            bond.current_supply.amount,
            bond.reserve_balances(reserve_address_balances),
        )
    }

    /// Prices minting `amount` here, enforcing the max supply.
    pub fn quote_buy(&self, bond: &Bond, amount: Amount) -> BondResult<BuyQuote> {
        let would_have = self.supply.checked_add(amount).ok_or(BondError::Overflow)?;
        if would_have > bond.max_supply.amount {
            return Err(BondError::CannotMintMoreThanMaxSupply {
                max: bond.max_supply.to_string(),
                would_have: Coin::new(bond.token.clone(), would_have).to_string(),
            });
        }
        let gross = bond.prices_to_mint(self.supply, amount, &self.reserves)?;
        let prices = gross.ceil()?;
        let tx_fees = bond.tx_fees(&gross)?;
        let total_prices = prices.checked_add(&tx_fees)?;
        Ok(BuyQuote {
            prices,
            tx_fees,
            total_prices,
        })
    }

    /// Prices burning `amount` here.
    pub fn quote_sell(&self, bond: &Bond, amount: Amount) -> BondResult<SellQuote> {
        if amount > self.supply {
            return Err(BondError::CannotBurnMoreThanSupply {
                supply: Coin::new(bond.token.clone(), self.supply).to_string(),
                amount: Coin::new(bond.token.clone(), amount).to_string(),
            });
        }
        let gross = bond.returns_for_burn(self.supply, amount, &self.reserves)?;
        let returns = gross.floor()?;
        let tx_fees = bond.tx_fees(&gross)?;
        let exit_fees = bond.exit_fees(&gross)?;
        let total_fees = fees::adjust_fees(&tx_fees.checked_add(&exit_fees)?, &returns);
        let total_returns = returns.checked_sub(&total_fees)?;
        Ok(SellQuote {
            returns,
            tx_fees,
            exit_fees,
            total_fees,
            total_returns,
        })
    }

    pub fn quote_swap(&self, bond: &Bond, from: &Coin, to_denom: &str) -> BondResult<SwapReturn> {
        bond.returns_for_swap(from, to_denom, &self.reserves)
    }

    /// Executes a buy against this state if its total stays within
    /// `max_prices`.
    pub fn apply_buy(&mut self, bond: &Bond, order: &BuyOrder) -> BondResult<BuyQuote> {
        let amount = order.base.amount.amount;
        let quote = self.quote_buy(bond, amount)?;
        if quote.total_prices.is_any_gt(&order.max_prices) {
            return Err(BondError::MaxPricesExceeded {
                total: quote.total_prices.to_string(),
                max: order.max_prices.to_string(),
            });
        }
        let reserves = self.reserves.checked_add(&quote.prices)?;
        self.supply = self.supply.checked_add(amount).ok_or(BondError::Overflow)?;
        self.reserves = reserves;
        Ok(quote)
    }

    pub fn apply_sell(&mut self, bond: &Bond, order: &SellOrder) -> BondResult<SellQuote> {
        let amount = order.base.amount.amount;
        let quote = self.quote_sell(bond, amount)?;
        let reserves = self.reserves.checked_sub(&quote.returns)?;
        self.supply -= amount;
        self.reserves = reserves;
        Ok(quote)
    }

    pub fn apply_swap(&mut self, bond: &Bond, order: &SwapOrder) -> BondResult<SwapReturn> {
        let quote = self.quote_swap(bond, &order.base.amount, &order.to_token)?;
        let reserves = self
            .reserves
            .checked_add(&Coins::from(quote.net_in.clone()))?
            .checked_sub(&Coins::from(quote.returns.clone()))?;
        self.reserves = reserves;
        Ok(quote)
    }

    /// Marginal price per reserve token at this state. An empty swapper pool
    /// lists zero for each reserve.
    pub fn marginal_prices(&self, bond: &Bond) -> BondResult<DecCoins> {
        if bond.function.is_swapper() && self.supply == 0 {
            let mut zeros = DecCoins::new();
            for denom in &bond.reserve_tokens {
                zeros.insert(denom.clone(), Decimal::ZERO);
            }
            return Ok(zeros);
        }
        bond.current_prices(self.supply, &self.reserves)
    }
}
