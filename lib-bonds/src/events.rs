//! Bond Events
//!
//! Every accepted request and every settlement outcome emits one event.
//! Events are for external observers; the engine never reads them back.

use crate::curve::FunctionType;
use crate::order::OrderKind;
use lib_types::{Address, BlockHeight, Coin, Coins};
use serde::{Deserialize, Serialize};

/// Bond lifecycle and order events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BondEvent {
    /// Bond registered
    BondCreated {
        token: String,
        creator: Address,
        function_type: FunctionType,
        /// `name:value` pairs, e.g. `c:100,m:12,n:2`
        function_parameters: String,
        reserve_tokens: Vec<String>,
        reserve_address: Address,
        max_supply: Coin,
        block_height: BlockHeight,
    },

    /// Editable fields changed
    BondEdited {
        token: String,
        editor: Address,
        name: Option<String>,
        description: Option<String>,
        order_quantity_limits: Option<Coins>,
        sanity_rate: Option<String>,
        sanity_margin_percentage: Option<String>,
        block_height: BlockHeight,
    },

    /// Buy queued, `max_prices` escrowed
    BuyOrderPlaced {
        token: String,
        buyer: Address,
        amount: Coin,
        max_prices: Coins,
        block_height: BlockHeight,
    },

    /// First buy on an empty swapper pool, settled immediately
    SwapperInitialized {
        token: String,
        buyer: Address,
        amount: Coin,
        charged_prices: Coins,
        block_height: BlockHeight,
    },

    /// Sell queued, tokens burned
    SellOrderPlaced {
        token: String,
        seller: Address,
        amount: Coin,
        block_height: BlockHeight,
    },

    /// Swap queued, input escrowed
    SwapOrderPlaced {
        token: String,
        swapper: Address,
        from: Coin,
        to_token: String,
        block_height: BlockHeight,
    },

    /// Order cancelled and its escrow returned
    OrderCancelled {
        token: String,
        kind: OrderKind,
        account: Address,
        amount: Coin,
        refunded: Coins,
        reason: String,
        block_height: BlockHeight,
    },

    BuyOrderFulfilled {
        token: String,
        buyer: Address,
        amount: Coin,
        charged_prices: Coins,
        charged_fees: Coins,
        returned_to_buyer: Coins,
        block_height: BlockHeight,
    },

    SellOrderFulfilled {
        token: String,
        seller: Address,
        amount: Coin,
        charged_fees: Coins,
        returned_to_seller: Coins,
        block_height: BlockHeight,
    },

    SwapOrderFulfilled {
        token: String,
        swapper: Address,
        from: Coin,
        charged_fee: Coin,
        returned_to_swapper: Coin,
        block_height: BlockHeight,
    },

    /// Batch executed and rotated
    BatchSettled {
        token: String,
        fulfilled: usize,
        cancelled: usize,
        supply: Coin,
        reserves: Coins,
        block_height: BlockHeight,
    },

    /// Settlement failed an invariant; the batch is frozen with its escrow
    BatchHalted {
        token: String,
        reason: String,
        block_height: BlockHeight,
    },
}

impl BondEvent {
    /// Bond token the event belongs to
    pub fn token(&self) -> &str {
        match self {
            BondEvent::BondCreated { token, .. }
            | BondEvent::BondEdited { token, .. }
            | BondEvent::BuyOrderPlaced { token, .. }
            | BondEvent::SwapperInitialized { token, .. }
            | BondEvent::SellOrderPlaced { token, .. }
            | BondEvent::SwapOrderPlaced { token, .. }
            | BondEvent::OrderCancelled { token, .. }
            | BondEvent::BuyOrderFulfilled { token, .. }
            | BondEvent::SellOrderFulfilled { token, .. }
            | BondEvent::SwapOrderFulfilled { token, .. }
            | BondEvent::BatchSettled { token, .. }
            | BondEvent::BatchHalted { token, .. } => token,
        }
    }

    pub fn block_height(&self) -> BlockHeight {
        match self {
            BondEvent::BondCreated { block_height, .. }
            | BondEvent::BondEdited { block_height, .. }
            | BondEvent::BuyOrderPlaced { block_height, .. }
            | BondEvent::SwapperInitialized { block_height, .. }
            | BondEvent::SellOrderPlaced { block_height, .. }
            | BondEvent::SwapOrderPlaced { block_height, .. }
            | BondEvent::OrderCancelled { block_height, .. }
            | BondEvent::BuyOrderFulfilled { block_height, .. }
            | BondEvent::SellOrderFulfilled { block_height, .. }
            | BondEvent::SwapOrderFulfilled { block_height, .. }
            | BondEvent::BatchSettled { block_height, .. }
            | BondEvent::BatchHalted { block_height, .. } => *block_height,
        }
    }

    /// Event type string for indexing
    pub fn event_type(&self) -> &'static str {
        match self {
            BondEvent::BondCreated { .. } => "create_bond",
            BondEvent::BondEdited { .. } => "edit_bond",
            BondEvent::BuyOrderPlaced { .. } => "buy",
            BondEvent::SwapperInitialized { .. } => "init_swapper",
            BondEvent::SellOrderPlaced { .. } => "sell",
            BondEvent::SwapOrderPlaced { .. } => "swap",
            BondEvent::OrderCancelled { .. } => "order_cancel",
            BondEvent::BuyOrderFulfilled { .. } => "order_fulfill",
            BondEvent::SellOrderFulfilled { .. } => "order_fulfill",
            BondEvent::SwapOrderFulfilled { .. } => "order_fulfill",
            BondEvent::BatchSettled { .. } => "batch_settled",
            BondEvent::BatchHalted { .. } => "batch_halted",
        }
    }
}

/// Receiver of bond events
pub trait EventSink {
    fn emit(&mut self, event: BondEvent);
}

/// In-memory event sink for tests and embedded use
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    events: Vec<BondEvent>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[BondEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn token_events(&self, token: &str) -> Vec<&BondEvent> {
        self.events.iter().filter(|e| e.token() == token).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&BondEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_in_range(&self, start_block: BlockHeight, end_block: BlockHeight) -> Vec<&BondEvent> {
        self.events
            .iter()
            .filter(|e| e.block_height() >= start_block && e.block_height() <= end_block)
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&mut self, event: BondEvent) {
        self.events.push(event);
    }
}

/// Buffer for events held back until an operation commits
impl EventSink for Vec<BondEvent> {
    fn emit(&mut self, event: BondEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(token: &str, height: BlockHeight) -> BondEvent {
        BondEvent::SellOrderPlaced {
            token: token.to_string(),
            seller: Address::new([1; 32]),
            amount: Coin::new(token, 5),
            block_height: height,
        }
    }

    #[test]
    fn test_event_accessors() {
        let event = placed("abc", 7);
        assert_eq!(event.token(), "abc");
        assert_eq!(event.block_height(), 7);
        assert_eq!(event.event_type(), "sell");
    }

    #[test]
    fn test_in_memory_sink_filters() {
        let mut sink = InMemoryEventSink::new();
        sink.emit(placed("abc", 1));
        sink.emit(placed("def", 2));
        sink.emit(placed("abc", 3));

        assert_eq!(sink.event_count(), 3);
        assert_eq!(sink.token_events("abc").len(), 2);
        assert_eq!(sink.events_in_range(2, 3).len(), 2);
        assert_eq!(sink.events_of_type("sell").len(), 3);

        sink.clear();
        assert_eq!(sink.event_count(), 0);
    }

    #[test]
    fn test_vec_buffers_events() {
        let mut buffer: Vec<BondEvent> = Vec::new();
        buffer.emit(placed("abc", 1));
        buffer.emit(BondEvent::BatchHalted {
            token: "abc".to_string(),
            reason: "reserve drift".to_string(),
            block_height: 2,
        });

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[1].event_type(), "batch_halted");
        assert_eq!(buffer[1].block_height(), 2);
    }
}
