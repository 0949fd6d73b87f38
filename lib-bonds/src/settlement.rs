//! Batch Settlement
//!
//! Executes a due batch against the live curve state and moves the escrowed
//! funds accordingly.
//!
//! # Execution order
//! ```text
//!   live state (supply, reserve balances)
//!        │
//!        ├── buys   arrival order: cost → reserve, fee → fee address, surplus → buyer, mint
//!        ├── sells  arrival order: returns − fees → seller, fees → fee address
//!        ├── swaps  arrival order: net in → reserve, fee → fee address, out → swapper
//!        │
//!        └── reserve address balance must equal the tracked reserves
//! ```
//!
//! An order that no longer prices within its limits is cancelled and its
//! escrow returned; it never fails the batch. A ledger failure while moving
//! escrow does fail it, as [`BondError::InvariantViolation`].
//!
//! [`SettlementEngine::settle_atomic`] runs the batch over a
//! [`StagedLedger`] and holds events back, so a failed batch leaves the
//! ledger, the sink, the bond and the batch exactly as they were.

use crate::batch::Batch;
use crate::bond::Bond;
use crate::curve_state::CurveState;
use crate::errors::{BondError, BondResult};
use crate::events::{BondEvent, EventSink};
use crate::ledger::{Ledger, LedgerResult, StagedLedger};
use crate::order::OrderKind;
use lib_types::{Address, BlockHeight, Coin, Coins};
use tracing::{debug, error, info, warn};

/// Outcome of one settled batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReport {
    pub fulfilled: usize,
    pub cancelled: usize,
    pub supply: Coin,
    pub reserves: Coins,
}

/// Settles batches against a ledger, emitting one event per order
pub struct SettlementEngine<'a, L: Ledger, E: EventSink> {
    ledger: &'a mut L,
    events: &'a mut E,
    intermediary: Address,
    height: BlockHeight,
}

impl<'a, L: Ledger, E: EventSink> SettlementEngine<'a, L, E> {
    pub fn new(ledger: &'a mut L, events: &'a mut E, intermediary: Address, height: BlockHeight) -> Self {
        Self {
            ledger,
            events,
            intermediary,
            height,
        }
    }

    /// Settle a due batch with all-or-nothing effects.
    ///
    /// Same contract as [`SettlementEngine::settle`], except that on `Err`
    /// nothing has been written to the ledger or emitted to the sink and
    /// `bond` and `batch` are unchanged.
    pub fn settle_atomic(&mut self, bond: &mut Bond, batch: &mut Batch) -> BondResult<SettlementReport> {
        let mut staged = StagedLedger::new(&mut *self.ledger);
        let mut held: Vec<BondEvent> = Vec::new();
        let mut staged_bond = bond.clone();
        let mut staged_batch = batch.clone();

        let report = SettlementEngine::new(&mut staged, &mut held, self.intermediary, self.height)
            .settle(&mut staged_bond, &mut staged_batch)?;

        debug!("Settlement staged: bond={}, moves={}", bond.token, staged.pending_ops());
        staged.commit().map_err(|e| {
            error!("Settlement commit failed: bond={}, {}", bond.token, e);
            BondError::invariant(&bond.token, format!("commit: {e}"))
        })?;

        for event in held {
            self.events.emit(event);
        }
        *bond = staged_bond;
        *batch = staged_batch;
        Ok(report)
    }

    /// Settle a due batch, writing through to the ledger as it goes
    ///
    /// # Arguments
    ///
    /// * `bond` - Bond the batch belongs to; `current_supply` is updated
    /// * `batch` - Batch to execute; order statuses are updated in place
    ///
    /// # Returns
    ///
    /// * `Ok(SettlementReport)` - Counts and the post-settlement state
    /// * `Err(BondError)` - Always fatal: a ledger move failed or the reserve
    ///   address disagrees with the tracked reserves
    pub fn settle(&mut self, bond: &mut Bond, batch: &mut Batch) -> BondResult<SettlementReport> {
        let intermediary = self.intermediary;
        let mut state = CurveState::live(bond, &self.ledger.balances(&bond.reserve_address));
        let mut fulfilled = 0;
        let mut cancelled = 0;

        // =====================================================================
        // Buys
        // =====================================================================
        for index in 0..batch.buys.len() {
            if !batch.buys[index].base.is_pending() {
                continue;
            }
            let order = batch.buys[index].clone();
            let buyer = order.base.account;
            match state.apply_buy(bond, &order) {
                Ok(quote) => {
                    let refund = order
                        .max_prices
                        .checked_sub(&quote.total_prices)
                        .map_err(|e| self.fatal(bond, format!("buy surplus: {e}")))?;
                    self.pay(bond, &intermediary, &bond.reserve_address, &quote.prices)?;
                    self.pay(bond, &intermediary, &bond.fee_address, &quote.tx_fees)?;
                    self.pay(bond, &intermediary, &buyer, &refund)?;
                    self.moved(bond, "mint bought tokens", |l| {
                        l.mint(&buyer, &Coins::from(order.base.amount.clone()))
                    })?;

                    debug!(
                        "Buy fulfilled: bond={}, buyer={}, amount={}, prices={}, fees={}",
                        bond.token, buyer, order.base.amount, quote.prices, quote.tx_fees
                    );
                    batch.buys[index].base.fulfil();
                    fulfilled += 1;
                    self.events.emit(BondEvent::BuyOrderFulfilled {
                        token: bond.token.clone(),
                        buyer,
                        amount: order.base.amount.clone(),
                        charged_prices: quote.prices,
                        charged_fees: quote.tx_fees,
                        returned_to_buyer: refund,
                        block_height: self.height,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let escrow = order.escrow();
                    self.pay(bond, &intermediary, &buyer, &escrow)?;
                    batch.cancel_buy(index, &e.to_string());
                    cancelled += 1;
                    self.cancelled(bond, OrderKind::Buy, buyer, order.base.amount, escrow, e);
                }
            }
        }

        // =====================================================================
        // Sells
        // =====================================================================
        for index in 0..batch.sells.len() {
            if !batch.sells[index].base.is_pending() {
                continue;
            }
            let order = batch.sells[index].clone();
            let seller = order.base.account;
            match state.apply_sell(bond, &order) {
                Ok(quote) => {
                    self.pay(bond, &bond.reserve_address, &seller, &quote.total_returns)?;
                    self.pay(bond, &bond.reserve_address, &bond.fee_address, &quote.total_fees)?;

                    debug!(
                        "Sell fulfilled: bond={}, seller={}, amount={}, returns={}, fees={}",
                        bond.token, seller, order.base.amount, quote.total_returns, quote.total_fees
                    );
                    batch.sells[index].base.fulfil();
                    fulfilled += 1;
                    self.events.emit(BondEvent::SellOrderFulfilled {
                        token: bond.token.clone(),
                        seller,
                        amount: order.base.amount.clone(),
                        charged_fees: quote.total_fees,
                        returned_to_seller: quote.total_returns,
                        block_height: self.height,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let escrow = order.escrow();
                    self.moved(bond, "re-mint sold tokens", |l| l.mint(&seller, &escrow))?;
                    batch.sells[index].base.cancel(e.to_string());
                    batch.total_sell_amount = batch.total_sell_amount.saturating_sub(order.base.amount.amount);
                    cancelled += 1;
                    self.cancelled(bond, OrderKind::Sell, seller, order.base.amount, escrow, e);
                }
            }
        }

        // =====================================================================
        // Swaps
        // =====================================================================
        for index in 0..batch.swaps.len() {
            if !batch.swaps[index].base.is_pending() {
                continue;
            }
            let order = batch.swaps[index].clone();
            let swapper = order.base.account;
            match state.apply_swap(bond, &order) {
                Ok(quote) => {
                    self.pay(bond, &intermediary, &bond.reserve_address, &Coins::from(quote.net_in.clone()))?;
                    self.pay(bond, &intermediary, &bond.fee_address, &Coins::from(quote.fee.clone()))?;
                    self.pay(bond, &bond.reserve_address, &swapper, &Coins::from(quote.returns.clone()))?;

                    debug!(
                        "Swap fulfilled: bond={}, swapper={}, from={}, fee={}, out={}",
                        bond.token, swapper, order.base.amount, quote.fee, quote.returns
                    );
                    batch.swaps[index].base.fulfil();
                    fulfilled += 1;
                    self.events.emit(BondEvent::SwapOrderFulfilled {
                        token: bond.token.clone(),
                        swapper,
                        from: order.base.amount.clone(),
                        charged_fee: quote.fee,
                        returned_to_swapper: quote.returns,
                        block_height: self.height,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let escrow = order.escrow();
                    self.pay(bond, &intermediary, &swapper, &escrow)?;
                    batch.swaps[index].base.cancel(e.to_string());
                    cancelled += 1;
                    self.cancelled(bond, OrderKind::Swap, swapper, order.base.amount, escrow, e);
                }
            }
        }

        // =====================================================================
        // Reserve check
        // =====================================================================
        let actual = bond.reserve_balances(&self.ledger.balances(&bond.reserve_address));
        if actual != state.reserves {
            return Err(self.fatal(
                bond,
                format!("reserve address holds {actual}, expected {}", state.reserves),
            ));
        }
        if state.supply > bond.max_supply.amount {
            return Err(self.fatal(bond, format!("supply {} exceeds max supply {}", state.supply, bond.max_supply)));
        }

        bond.current_supply = Coin::new(bond.token.clone(), state.supply);

        info!(
            "Batch settled: bond={}, fulfilled={}, cancelled={}, supply={}, reserves={}",
            bond.token, fulfilled, cancelled, bond.current_supply, state.reserves
        );
        self.events.emit(BondEvent::BatchSettled {
            token: bond.token.clone(),
            fulfilled,
            cancelled,
            supply: bond.current_supply.clone(),
            reserves: state.reserves.clone(),
            block_height: self.height,
        });

        Ok(SettlementReport {
            fulfilled,
            cancelled,
            supply: bond.current_supply.clone(),
            reserves: state.reserves,
        })
    }

    fn fatal(&self, bond: &Bond, reason: String) -> BondError {
        error!("Settlement invariant violated: bond={}, {}", bond.token, reason);
        BondError::invariant(&bond.token, reason)
    }

    fn moved<F>(&mut self, bond: &Bond, what: &str, op: F) -> BondResult<()>
    where
        F: FnOnce(&mut L) -> LedgerResult<()>,
    {
        op(&mut *self.ledger).map_err(|e| self.fatal(bond, format!("{what}: {e}")))
    }

    fn pay(&mut self, bond: &Bond, from: &Address, to: &Address, coins: &Coins) -> BondResult<()> {
        if coins.is_empty() {
            return Ok(());
        }
        self.moved(bond, "transfer", |l| l.transfer(from, to, coins))
    }

    fn cancelled(&mut self, bond: &Bond, kind: OrderKind, account: Address, amount: Coin, refunded: Coins, reason: BondError) {
        warn!(
            "Order cancelled at settlement: bond={}, kind={}, account={}, amount={}, reason={}",
            bond.token, kind, account, amount, reason
        );
        self.events.emit(BondEvent::OrderCancelled {
            token: bond.token.clone(),
            kind,
            account,
            amount,
            refunded,
            reason: reason.to_string(),
            block_height: self.height,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventSink;
    use crate::ledger::InMemoryLedger;
    use crate::order::{BuyOrder, OrderStatus, SellOrder, SwapOrder};
    use crate::test_support::{addr, power_bond_msg, swapper_bond_msg};
    use rust_decimal_macros::dec;

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn intermediary() -> Address {
        addr(200)
    }

    /// Queues a buy the way admission does: escrow into the intermediary.
    fn queue_buy(ledger: &mut InMemoryLedger, batch: &mut Batch, buyer: Address, amount: u128, max: &str) {
        ledger.mint(&buyer, &coins(max)).unwrap();
        ledger.transfer(&buyer, &intermediary(), &coins(max)).unwrap();
        batch.buys.push(BuyOrder::new(buyer, Coin::new(batch.token.clone(), amount), coins(max)));
    }

    #[test]
    fn test_buy_settlement_moves_cost_fee_and_surplus() {
        let mut msg = power_bond_msg("abc", &["res"]);
        msg.tx_fee_percentage = dec!(1);
        let mut bond = Bond::new(msg).unwrap();
        let mut ledger = InMemoryLedger::new();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        queue_buy(&mut ledger, &mut batch, addr(2), 10, "6000res");

        let report = SettlementEngine::new(&mut ledger, &mut events, intermediary(), 5)
            .settle(&mut bond, &mut batch)
            .unwrap();

        // cost 5000, fee 50, surplus 950
        assert_eq!(report.fulfilled, 1);
        assert_eq!(bond.current_supply, Coin::new("abc", 10));
        assert_eq!(ledger.balance(&bond.reserve_address, "res"), 5000);
        assert_eq!(ledger.balance(&bond.fee_address, "res"), 50);
        assert_eq!(ledger.balance(&addr(2), "res"), 950);
        assert_eq!(ledger.balance(&addr(2), "abc"), 10);
        assert!(ledger.balances(&intermediary()).is_empty());
        assert_eq!(events.events_of_type("batch_settled").len(), 1);
    }

    #[test]
    fn test_unaffordable_buy_is_refunded_in_full() {
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        let mut ledger = InMemoryLedger::new();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        queue_buy(&mut ledger, &mut batch, addr(2), 10, "5000res");
        queue_buy(&mut ledger, &mut batch, addr(3), 10, "5000res");

        let report = SettlementEngine::new(&mut ledger, &mut events, intermediary(), 1)
            .settle(&mut bond, &mut batch)
            .unwrap();

        assert_eq!(report.fulfilled, 1);
        assert_eq!(report.cancelled, 1);
        assert!(batch.buys[1].base.is_cancelled());
        assert_eq!(batch.total_buy_amount, 0);
        assert_eq!(ledger.balance(&addr(3), "res"), 5000);
        assert_eq!(ledger.balance(&addr(3), "abc"), 0);
        assert_eq!(bond.current_supply.amount, 10);
    }

    #[test]
    fn test_sell_settlement_pays_seller_and_fees() {
        let mut msg = power_bond_msg("abc", &["res"]);
        msg.exit_fee_percentage = dec!(10);
        let mut bond = Bond::new(msg).unwrap();
        bond.current_supply = Coin::new("abc", 20);
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&bond.reserve_address, &coins("34000res")).unwrap();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        batch.sells.push(SellOrder::new(addr(2), Coin::new("abc", 10)));

        SettlementEngine::new(&mut ledger, &mut events, intermediary(), 1)
            .settle(&mut bond, &mut batch)
            .unwrap();

        // returns 29000, exit fee 2900
        assert_eq!(ledger.balance(&addr(2), "res"), 26100);
        assert_eq!(ledger.balance(&bond.fee_address, "res"), 2900);
        assert_eq!(ledger.balance(&bond.reserve_address, "res"), 5000);
        assert_eq!(bond.current_supply.amount, 10);
    }

    #[test]
    fn test_oversized_sell_is_reminted() {
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        bond.current_supply = Coin::new("abc", 5);
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&bond.reserve_address, &coins("1000res")).unwrap();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        batch.sells.push(SellOrder::new(addr(2), Coin::new("abc", 6)));

        let report = SettlementEngine::new(&mut ledger, &mut events, intermediary(), 1)
            .settle(&mut bond, &mut batch)
            .unwrap();

        assert_eq!(report.cancelled, 1);
        assert_eq!(ledger.balance(&addr(2), "abc"), 6);
        assert_eq!(ledger.balance(&bond.reserve_address, "res"), 1000);
        assert_eq!(events.events_of_type("order_cancel").len(), 1);
    }

    #[test]
    fn test_swap_settlement_moves_both_legs() {
        let mut bond = Bond::new(swapper_bond_msg("swp", "aaa", "bbb")).unwrap();
        bond.current_supply = Coin::new("swp", 1);
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&bond.reserve_address, &coins("1000aaa,1000bbb")).unwrap();
        ledger.mint(&intermediary(), &coins("100aaa")).unwrap();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("swp", 0);
        batch.swaps.push(SwapOrder::new(addr(2), Coin::new("aaa", 100), "bbb"));

        SettlementEngine::new(&mut ledger, &mut events, intermediary(), 1)
            .settle(&mut bond, &mut batch)
            .unwrap();

        assert_eq!(ledger.balance(&addr(2), "bbb"), 90);
        assert_eq!(ledger.balances(&bond.reserve_address), coins("1100aaa,910bbb"));
    }

    #[test]
    fn test_missing_escrow_is_an_invariant_violation() {
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        let mut ledger = InMemoryLedger::new();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        // queued without escrow
        batch.buys.push(BuyOrder::new(addr(2), Coin::new("abc", 10), coins("5000res")));

        let err = SettlementEngine::new(&mut ledger, &mut events, intermediary(), 1)
            .settle(&mut bond, &mut batch)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reserve_drift_is_detected() {
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        let mut ledger = InMemoryLedger::new();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        // the fee address doubles as the reserve address, so the tracked
        // reserves miss the fee
        bond.fee_address = bond.reserve_address;
        bond.tx_fee_percentage = dec!(1);
        queue_buy(&mut ledger, &mut batch, addr(2), 10, "6000res");

        let err = SettlementEngine::new(&mut ledger, &mut events, intermediary(), 1)
            .settle(&mut bond, &mut batch)
            .unwrap_err();
        assert!(matches!(err, BondError::InvariantViolation { .. }));
    }

    #[test]
    fn test_failed_atomic_settlement_has_no_effects() {
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        let mut ledger = InMemoryLedger::new();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        queue_buy(&mut ledger, &mut batch, addr(2), 10, "5000res");
        // second buy costs 1424 but its escrow is gone
        queue_buy(&mut ledger, &mut batch, addr(3), 1, "10000res");
        ledger.burn(&intermediary(), &coins("9000res")).unwrap();
        let ledger_before = ledger.clone();
        let bond_before = bond.clone();
        let batch_before = batch.clone();

        let err = SettlementEngine::new(&mut ledger, &mut events, intermediary(), 1)
            .settle_atomic(&mut bond, &mut batch)
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(ledger.balance(&addr(2), "abc"), 0);
        assert_eq!(ledger.supply_of("abc"), 0);
        assert_eq!(ledger.balances(&intermediary()), ledger_before.balances(&intermediary()));
        assert_eq!(ledger.balance(&bond.reserve_address, "res"), 0);
        assert_eq!(events.event_count(), 0);
        assert_eq!(bond, bond_before);
        assert_eq!(batch, batch_before);
    }

    #[test]
    fn test_atomic_settlement_commits_on_success() {
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        let mut ledger = InMemoryLedger::new();
        let mut events = InMemoryEventSink::new();
        let mut batch = Batch::new("abc", 0);
        queue_buy(&mut ledger, &mut batch, addr(2), 10, "5500res");

        let report = SettlementEngine::new(&mut ledger, &mut events, intermediary(), 3)
            .settle_atomic(&mut bond, &mut batch)
            .unwrap();

        assert_eq!(report.fulfilled, 1);
        assert_eq!(batch.buys[0].base.status, OrderStatus::Fulfilled);
        assert_eq!(bond.current_supply.amount, 10);
        assert_eq!(ledger.balance(&addr(2), "abc"), 10);
        assert_eq!(ledger.balance(&addr(2), "res"), 500);
        assert_eq!(ledger.balance(&bond.reserve_address, "res"), 5000);
        assert_eq!(events.events_of_type("order_fulfill").len(), 1);
        assert_eq!(events.events_of_type("batch_settled").len(), 1);
    }
}
