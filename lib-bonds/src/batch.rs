//! Batch
//!
//! Per-bond queue of orders for the current settlement period, plus the
//! running prices shown to the next arrival.
//!
//! # Lifecycle
//! ```text
//!   new(batch_blocks) ──▶ accumulating ──tick()==0──▶ settled ──▶ archived as last batch
//!                             ▲                                        │
//!                             └──────────── new(batch_blocks) ◀────────┘
//! ```
//!
//! A batch whose settlement violates an invariant is halted instead: it
//! keeps its orders and their escrow, is never ticked or settled again and
//! refuses new orders.
//!
//! # Running prices
//! `buy_prices` is the marginal price after all pending buys; `sell_prices`
//! after all pending buys and then all pending sells. Admission advances
//! them one order at a time; [`Batch::project`] recomputes them from the
//! full order list. Both must agree.

use crate::bond::Bond;
use crate::curve_state::CurveState;
use crate::errors::{BondError, BondResult};
use crate::order::{BuyOrder, SellOrder, SwapOrder};
use lib_types::{Amount, DecCoins};
use serde::{Deserialize, Serialize};

/// Marginal prices after the queued buys, and after buys then sells
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningPrices {
    pub buy_prices: DecCoins,
    pub sell_prices: DecCoins,
}

impl RunningPrices {
    pub fn from_states(bond: &Bond, after_buys: &CurveState, after_sells: &CurveState) -> BondResult<Self> {
        Ok(Self {
            buy_prices: after_buys.marginal_prices(bond)?,
            sell_prices: after_sells.marginal_prices(bond)?,
        })
    }
}

/// Replay of a batch's pending orders in settlement order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProjection {
    pub after_buys: CurveState,
    pub after_sells: CurveState,
    pub after_swaps: CurveState,
    /// Indices into `Batch::buys` of pending buys that fail against the
    /// state left by the buys ahead of them
    pub unfulfillable_buys: Vec<usize>,
}

impl BatchProjection {
    pub fn running_prices(&self, bond: &Bond) -> BondResult<RunningPrices> {
        RunningPrices::from_states(bond, &self.after_buys, &self.after_sells)
    }
}

/// Orders queued for one bond in the current period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub token: String,
    pub blocks_remaining: u64,
    /// Sum of pending buy amounts
    pub total_buy_amount: Amount,
    /// Sum of pending sell amounts
    pub total_sell_amount: Amount,
    pub buy_prices: DecCoins,
    pub sell_prices: DecCoins,
    pub buys: Vec<BuyOrder>,
    pub sells: Vec<SellOrder>,
    pub swaps: Vec<SwapOrder>,
    /// Reason settlement failed; set once and never cleared
    #[serde(default)]
    pub halted: Option<String>,
}

impl Batch {
    pub fn new(token: impl Into<String>, blocks_remaining: u64) -> Self {
        Self {
            token: token.into(),
            blocks_remaining,
            total_buy_amount: 0,
            total_sell_amount: 0,
            buy_prices: DecCoins::new(),
            sell_prices: DecCoins::new(),
            buys: Vec::new(),
            sells: Vec::new(),
            swaps: Vec::new(),
            halted: None,
        }
    }

    /// Counts down one block. Returns true once the batch is due.
    pub fn tick(&mut self) -> bool {
        self.blocks_remaining = self.blocks_remaining.saturating_sub(1);
        self.is_due()
    }

    pub fn is_due(&self) -> bool {
        self.blocks_remaining == 0
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Freezes the batch. Later calls keep the first reason.
    pub fn halt(&mut self, reason: impl Into<String>) {
        if self.halted.is_none() {
            self.halted = Some(reason.into());
        }
    }

    pub fn has_orders(&self) -> bool {
        !(self.buys.is_empty() && self.sells.is_empty() && self.swaps.is_empty())
    }

    pub fn pending_buys(&self) -> impl Iterator<Item = &BuyOrder> {
        self.buys.iter().filter(|o| o.base.is_pending())
    }

    pub fn pending_sells(&self) -> impl Iterator<Item = &SellOrder> {
        self.sells.iter().filter(|o| o.base.is_pending())
    }

    pub fn pending_swaps(&self) -> impl Iterator<Item = &SwapOrder> {
        self.swaps.iter().filter(|o| o.base.is_pending())
    }

    pub fn set_prices(&mut self, prices: RunningPrices) {
        self.buy_prices = prices.buy_prices;
        self.sell_prices = prices.sell_prices;
    }

    pub fn running_prices(&self) -> RunningPrices {
        RunningPrices {
            buy_prices: self.buy_prices.clone(),
            sell_prices: self.sell_prices.clone(),
        }
    }

    pub fn push_buy(&mut self, order: BuyOrder, prices: RunningPrices) -> BondResult<()> {
        self.total_buy_amount = self
            .total_buy_amount
            .checked_add(order.base.amount.amount)
            .ok_or(BondError::Overflow)?;
        self.buys.push(order);
        self.set_prices(prices);
        Ok(())
    }

    pub fn push_sell(&mut self, order: SellOrder, prices: RunningPrices) -> BondResult<()> {
        self.total_sell_amount = self
            .total_sell_amount
            .checked_add(order.base.amount.amount)
            .ok_or(BondError::Overflow)?;
        self.sells.push(order);
        self.set_prices(prices);
        Ok(())
    }

    pub fn push_swap(&mut self, order: SwapOrder) {
        self.swaps.push(order);
    }

    /// Cancels a pending buy and removes it from the pending total.
    /// Returns the cancelled order, or `None` if it was not pending.
    pub fn cancel_buy(&mut self, index: usize, reason: &str) -> Option<&BuyOrder> {
        let order = self.buys.get_mut(index)?;
        if !order.base.is_pending() {
            return None;
        }
        order.base.cancel(reason);
        self.total_buy_amount = self.total_buy_amount.saturating_sub(order.base.amount.amount);
        Some(&*order)
    }

    /// Applies the pending sells, in arrival order, on top of `start`.
    pub fn replay_sells(&self, bond: &Bond, start: &CurveState) -> BondResult<CurveState> {
        let mut state = start.clone();
        for order in self.pending_sells() {
            if let Err(e) = state.apply_sell(bond, order) {
                if e.is_fatal() {
                    return Err(e);
                }
            }
        }
        Ok(state)
    }

    /// Replays the pending orders from `start` in settlement order: buys,
    /// then sells, then swaps, each in arrival order. Orders that would fail
    /// are skipped, exactly as settlement refunds them.
    pub fn project(&self, bond: &Bond, start: &CurveState) -> BondResult<BatchProjection> {
        let mut state = start.clone();
        let mut unfulfillable_buys = Vec::new();
        for (index, order) in self.buys.iter().enumerate() {
            if !order.base.is_pending() {
                continue;
            }
            match state.apply_buy(bond, order) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => unfulfillable_buys.push(index),
            }
        }
        let after_buys = state;
        let after_sells = self.replay_sells(bond, &after_buys)?;

        let mut state = after_sells.clone();
        for order in self.pending_swaps() {
            if let Err(e) = state.apply_swap(bond, order) {
                if e.is_fatal() {
                    return Err(e);
                }
            }
        }

        Ok(BatchProjection {
            after_buys,
            after_sells,
            after_swaps: state,
            unfulfillable_buys,
        })
    }
}
