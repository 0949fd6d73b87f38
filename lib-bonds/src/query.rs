//! Read-Only Queries
//!
//! Projections over stored bonds and batches and the live reserve balances.
//! Nothing here writes to the store or the ledger.
//!
//! Quotes are priced where the order would actually execute: buys after the
//! pending buys, sells after the pending buys and sells, swaps after the
//! whole batch.
//!
//! # Paths
//! ```text
//!   bonds
//!   bond            <token>
//!   batch           <token>
//!   last_batch      <token>
//!   current_price   <token>
//!   current_reserve <token>
//!   custom_price    <token> <supply>
//!   buy_price       <token> <amount>
//!   sell_return     <token> <amount>
//!   swap_return     <token> <from_denom> <from_amount> <to_denom>
//! ```

use crate::batch::{Batch, BatchProjection};
use crate::bond::Bond;
use crate::curve_state::CurveState;
use crate::errors::{BondError, BondResult};
use crate::ledger::Ledger;
use crate::storage::BondStore;
use lib_types::{Amount, Coin, DecCoins};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Quote for buying an amount of bond tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBuyPrice {
    /// Supply the quote was priced at
    pub adjusted_supply: Coin,
    pub prices: Vec<Coin>,
    pub tx_fees: Vec<Coin>,
    pub total_prices: Vec<Coin>,
    pub total_fees: Vec<Coin>,
}

/// Quote for selling an amount of bond tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySellReturn {
    pub adjusted_supply: Coin,
    pub returns: Vec<Coin>,
    pub tx_fees: Vec<Coin>,
    pub exit_fees: Vec<Coin>,
    pub total_returns: Vec<Coin>,
    pub total_fees: Vec<Coin>,
}

/// Quote for a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySwapReturn {
    pub total_returns: Coin,
    pub total_fees: Coin,
}

pub struct Querier<'a, S: BondStore, L: Ledger> {
    store: &'a S,
    ledger: &'a L,
}

impl<'a, S: BondStore, L: Ledger> Querier<'a, S, L> {
    pub fn new(store: &'a S, ledger: &'a L) -> Self {
        Self { store, ledger }
    }

    pub fn bonds(&self) -> BondResult<Vec<String>> {
        Ok(self.store.bond_tokens()?)
    }

    pub fn bond(&self, token: &str) -> BondResult<Bond> {
        self.store
            .get_bond(token)?
            .ok_or_else(|| BondError::BondDoesNotExist(token.to_string()))
    }

    pub fn batch(&self, token: &str) -> BondResult<Batch> {
        self.store
            .get_batch(token)?
            .ok_or_else(|| BondError::BatchDoesNotExist(token.to_string()))
    }

    /// Most recently settled batch
    pub fn last_batch(&self, token: &str) -> BondResult<Batch> {
        self.store
            .get_last_batch(token)?
            .ok_or_else(|| BondError::BatchDoesNotExist(token.to_string()))
    }

    pub fn current_price(&self, token: &str) -> BondResult<DecCoins> {
        let bond = self.bond(token)?;
        self.live_state(&bond).marginal_prices(&bond)
    }

    /// Reserve balances, one entry per reserve token even when empty
    pub fn current_reserve(&self, token: &str) -> BondResult<Vec<Coin>> {
        let bond = self.bond(token)?;
        Ok(bond.reserve_listing(&self.ledger.balances(&bond.reserve_address)))
    }

    /// Curve price at an arbitrary supply
    pub fn custom_price(&self, token: &str, supply: Amount) -> BondResult<DecCoins> {
        self.bond(token)?.prices_at_supply(supply)
    }

    pub fn buy_price(&self, token: &str, amount: Amount) -> BondResult<QueryBuyPrice> {
        let bond = self.bond(token)?;
        let state = self.projection(&bond)?.after_buys;
        let quote = state.quote_buy(&bond, amount)?;
        Ok(QueryBuyPrice {
            adjusted_supply: Coin::new(bond.token.clone(), state.supply),
            prices: bond.reserve_listing(&quote.prices),
            tx_fees: bond.reserve_listing(&quote.tx_fees),
            total_prices: bond.reserve_listing(&quote.total_prices),
            total_fees: bond.reserve_listing(&quote.tx_fees),
        })
    }

    pub fn sell_return(&self, token: &str, amount: Amount) -> BondResult<QuerySellReturn> {
        let bond = self.bond(token)?;
        if !bond.allow_sells {
            return Err(BondError::SellingDisabled);
        }
        let state = self.projection(&bond)?.after_sells;
        let quote = state.quote_sell(&bond, amount)?;
        Ok(QuerySellReturn {
            adjusted_supply: Coin::new(bond.token.clone(), state.supply),
            returns: bond.reserve_listing(&quote.returns),
            tx_fees: bond.reserve_listing(&quote.tx_fees),
            exit_fees: bond.reserve_listing(&quote.exit_fees),
            total_returns: bond.reserve_listing(&quote.total_returns),
            total_fees: bond.reserve_listing(&quote.total_fees),
        })
    }

    pub fn swap_return(&self, token: &str, from: &Coin, to_denom: &str) -> BondResult<QuerySwapReturn> {
        let bond = self.bond(token)?;
        let quote = self.projection(&bond)?.after_swaps.quote_swap(&bond, from, to_denom)?;
        Ok(QuerySwapReturn {
            total_returns: quote.returns,
            total_fees: quote.fee,
        })
    }

    /// Route a query path to its handler and encode the result as JSON.
    pub fn handle(&self, path: &[&str]) -> BondResult<Value> {
        match path {
            ["bonds"] => encode(&self.bonds()?),
            ["bond", token] => encode(&self.bond(token)?),
            ["batch", token] => encode(&self.batch(token)?),
            ["last_batch", token] => encode(&self.last_batch(token)?),
            ["current_price", token] => encode(&self.current_price(token)?),
            ["current_reserve", token] => encode(&self.current_reserve(token)?),
            ["custom_price", token, supply] => encode(&self.custom_price(token, parse_amount(supply)?)?),
            ["buy_price", token, amount] => encode(&self.buy_price(token, parse_amount(amount)?)?),
            ["sell_return", token, amount] => encode(&self.sell_return(token, parse_amount(amount)?)?),
            ["swap_return", token, from_denom, from_amount, to_denom] => {
                let from = Coin::new(*from_denom, parse_amount(from_amount)?);
                encode(&self.swap_return(token, &from, to_denom)?)
            }
            _ => Err(BondError::InvalidArgument(format!(
                "unknown bonds query path '{}'",
                path.join("/")
            ))),
        }
    }

    fn live_state(&self, bond: &Bond) -> CurveState {
        CurveState::live(bond, &self.ledger.balances(&bond.reserve_address))
    }

    fn projection(&self, bond: &Bond) -> BondResult<BatchProjection> {
        self.batch(&bond.token)?.project(bond, &self.live_state(bond))
    }
}

fn parse_amount(value: &str) -> BondResult<Amount> {
    value
        .parse()
        .map_err(|_| BondError::InvalidArgument(format!("amount '{value}'")))
}

fn encode<T: Serialize>(value: &T) -> BondResult<Value> {
    serde_json::to_value(value).map_err(|e| BondError::InvalidArgument(format!("response encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::order::BuyOrder;
    use crate::storage::InMemoryBondStore;
    use crate::test_support::{addr, power_bond_msg, swapper_bond_msg};
    use lib_types::Coins;
    use rust_decimal_macros::dec;

    fn setup() -> (InMemoryBondStore, InMemoryLedger) {
        let mut store = InMemoryBondStore::new();
        let bond = Bond::new(power_bond_msg("abc", &["res", "xyz"])).unwrap();
        store.set_bond(&bond).unwrap();
        store.set_batch(&Batch::new("abc", 1)).unwrap();
        (store, InMemoryLedger::new())
    }

    #[test]
    fn test_current_reserve_lists_empty_reserves() {
        let (store, ledger) = setup();
        let querier = Querier::new(&store, &ledger);
        assert_eq!(
            querier.current_reserve("abc").unwrap(),
            vec![Coin::new("res", 0), Coin::new("xyz", 0)]
        );
    }

    #[test]
    fn test_buy_price_accounts_for_pending_buys() {
        let (mut store, ledger) = setup();
        let mut batch = Batch::new("abc", 1);
        batch
            .buys
            .push(BuyOrder::new(addr(2), Coin::new("abc", 10), "5000res,5000xyz".parse().unwrap()));
        store.set_batch(&batch).unwrap();

        let quote = Querier::new(&store, &ledger).buy_price("abc", 10).unwrap();
        assert_eq!(quote.adjusted_supply, Coin::new("abc", 10));
        assert_eq!(quote.prices, vec![Coin::new("res", 29000), Coin::new("xyz", 29000)]);
    }

    #[test]
    fn test_sell_return_requires_supply() {
        let (store, ledger) = setup();
        let querier = Querier::new(&store, &ledger);
        assert!(matches!(
            querier.sell_return("abc", 1),
            Err(BondError::CannotBurnMoreThanSupply { .. })
        ));
    }

    #[test]
    fn test_swap_return_quotes_net_of_fee() {
        let mut store = InMemoryBondStore::new();
        let mut msg = swapper_bond_msg("swp", "aaa", "bbb");
        msg.tx_fee_percentage = dec!(1);
        let mut bond = Bond::new(msg).unwrap();
        bond.current_supply = Coin::new("swp", 1);
        store.set_bond(&bond).unwrap();
        store.set_batch(&Batch::new("swp", 1)).unwrap();
        let mut ledger = InMemoryLedger::new();
        ledger
            .mint(&bond.reserve_address, &"1000aaa,1000bbb".parse::<Coins>().unwrap())
            .unwrap();

        let quote = Querier::new(&store, &ledger)
            .swap_return("swp", &Coin::new("aaa", 101), "bbb")
            .unwrap();
        assert_eq!(quote.total_fees, Coin::new("aaa", 2));
        assert_eq!(quote.total_returns, Coin::new("bbb", 90));
    }

    #[test]
    fn test_handle_routes_paths() {
        let (store, ledger) = setup();
        let querier = Querier::new(&store, &ledger);

        assert_eq!(querier.handle(&["bonds"]).unwrap(), serde_json::json!(["abc"]));
        let bond = querier.handle(&["bond", "abc"]).unwrap();
        assert_eq!(bond["token"], "abc");
        let price = querier.handle(&["custom_price", "abc", "10"]).unwrap();
        assert_eq!(price["res"], "1300");

        assert!(matches!(
            querier.handle(&["nope"]),
            Err(BondError::InvalidArgument(_))
        ));
        assert!(matches!(
            querier.handle(&["last_batch", "abc"]),
            Err(BondError::BatchDoesNotExist(_))
        ));
        assert!(matches!(
            querier.handle(&["buy_price", "abc", "x"]),
            Err(BondError::InvalidArgument(_))
        ));
    }
}
