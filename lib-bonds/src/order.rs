//! Orders
//!
//! The three order kinds a batch queues. Economic content is fixed at
//! admission; only the status moves, and only forward:
//! `Pending -> Fulfilled` or `Pending -> Cancelled`.

use lib_types::{Address, Coin, Coins};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order kind, used in events and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Buy,
    Sell,
    Swap,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Buy => write!(f, "buy"),
            OrderKind::Sell => write!(f, "sell"),
            OrderKind::Swap => write!(f, "swap"),
        }
    }
}

/// Lifecycle of a queued order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Fulfilled,
    Cancelled { reason: String },
}

/// Fields shared by every order kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseOrder {
    pub account: Address,
    pub amount: Coin,
    pub status: OrderStatus,
}

impl BaseOrder {
    pub fn new(account: Address, amount: Coin) -> Self {
        Self {
            account,
            amount,
            status: OrderStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, OrderStatus::Cancelled { .. })
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = OrderStatus::Cancelled {
            reason: reason.into(),
        };
    }

    pub fn fulfil(&mut self) {
        self.status = OrderStatus::Fulfilled;
    }
}

/// Buy `base.amount` bonded tokens paying at most `max_prices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub base: BaseOrder,
    pub max_prices: Coins,
}

impl BuyOrder {
    pub fn new(buyer: Address, amount: Coin, max_prices: Coins) -> Self {
        Self {
            base: BaseOrder::new(buyer, amount),
            max_prices,
        }
    }

    /// Funds held in the intermediary account until settlement
    pub fn escrow(&self) -> Coins {
        self.max_prices.clone()
    }
}

/// Sell `base.amount` bonded tokens back to the curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrder {
    pub base: BaseOrder,
}

impl SellOrder {
    pub fn new(seller: Address, amount: Coin) -> Self {
        Self {
            base: BaseOrder::new(seller, amount),
        }
    }

    /// Tokens burned at admission, re-minted if the order is cancelled
    pub fn escrow(&self) -> Coins {
        Coins::from(self.base.amount.clone())
    }
}

/// Swap `base.amount` of one reserve for `to_token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOrder {
    pub base: BaseOrder,
    pub to_token: String,
}

impl SwapOrder {
    pub fn new(swapper: Address, from: Coin, to_token: impl Into<String>) -> Self {
        Self {
            base: BaseOrder::new(swapper, from),
            to_token: to_token.into(),
        }
    }

    pub fn escrow(&self) -> Coins {
        Coins::from(self.base.amount.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let mut order = BuyOrder::new(Address::new([1; 32]), Coin::new("abc", 10), "5res".parse().unwrap());
        assert!(order.base.is_pending());

        order.base.cancel("max prices exceeded");
        assert!(order.base.is_cancelled());
        assert!(!order.base.is_pending());

        let mut sell = SellOrder::new(Address::new([2; 32]), Coin::new("abc", 3));
        sell.base.fulfil();
        assert_eq!(sell.base.status, OrderStatus::Fulfilled);
    }

    #[test]
    fn test_escrow_requirements() {
        let buy = BuyOrder::new(Address::zero(), Coin::new("abc", 10), "5res,7xyz".parse().unwrap());
        assert_eq!(buy.escrow().to_string(), "5res,7xyz");

        let sell = SellOrder::new(Address::zero(), Coin::new("abc", 3));
        assert_eq!(sell.escrow().to_string(), "3abc");

        let swap = SwapOrder::new(Address::zero(), Coin::new("aaa", 9), "bbb");
        assert_eq!(swap.escrow().to_string(), "9aaa");
        assert_eq!(OrderKind::Swap.to_string(), "swap");
    }
}
