//! Bonding-curve market maker with batched order settlement
//!
//! Tokens are minted and burned against reserve pools priced by a curve.
//! Orders accumulate in a per-bond batch for a fixed number of blocks and
//! are settled together at the end of the period.
//!
//! # Layout
//! - [`curve`]: curve families and their pure evaluation
//! - [`bond`]: bond configuration, live supply and pricing projections
//! - [`order`], [`batch`], [`curve_state`]: queued orders and their replay
//! - [`settlement`]: end-of-period execution
//! - [`keeper`]: request handlers and `end_block`
//! - [`query`]: read-only projections and the JSON path router
//! - [`ledger`], [`storage`], [`events`]: host-facing seams

pub mod batch;
pub mod bond;
pub mod config;
pub mod curve;
pub mod curve_state;
pub mod errors;
pub mod events;
pub mod fees;
pub mod keeper;
pub mod ledger;
pub mod msgs;
pub mod order;
pub mod query;
pub mod settlement;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use batch::{Batch, BatchProjection, RunningPrices};
pub use bond::{reserve_address_for, Bond, SwapReturn};
pub use config::BondsConfig;
pub use curve::{BondingFunction, FunctionParams, FunctionType};
pub use curve_state::{BuyQuote, CurveState, SellQuote};
pub use errors::{BondError, BondResult, ErrorKind};
pub use events::{BondEvent, EventSink, InMemoryEventSink};
pub use keeper::{batches_intermediary_account, BondsKeeper, EndBlockReport};
pub use ledger::{InMemoryLedger, Ledger, LedgerError, LedgerResult, StagedLedger};
pub use msgs::{MsgBuy, MsgCreateBond, MsgEditBond, MsgSell, MsgSwap, SanityParams};
pub use order::{BuyOrder, OrderKind, OrderStatus, SellOrder, SwapOrder};
pub use query::{Querier, QueryBuyPrice, QuerySellReturn, QuerySwapReturn};
pub use settlement::{SettlementEngine, SettlementReport};
pub use storage::{BondStore, InMemoryBondStore, SledBondStore, StorageError, StorageResult};
