//! Bonds Keeper
//!
//! The entry point a host drives: request handlers for create, edit, buy,
//! sell and swap, and `end_block` once per block.
//!
//! # Admission
//!
//! Every handler runs all of its checks before touching the ledger or the
//! store, so a rejected request has no side effects. Accepted orders escrow
//! their funds immediately:
//!
//! | Order | Escrow                                      |
//! |-------|---------------------------------------------|
//! | buy   | `max_prices` → batches intermediary account |
//! | sell  | bond tokens burned from the seller          |
//! | swap  | `from` → batches intermediary account       |
//!
//! A buy on a swapper bond with zero supply skips the batch and settles on
//! the spot, seeding the pool.
//!
//! # Block processing
//!
//! Each bond settles on its own. A batch whose settlement fails is rolled
//! back, persisted as halted and skipped from then on; the other bonds in
//! the same block are unaffected.

use crate::batch::{Batch, RunningPrices};
use crate::bond::{reserve_address_for, Bond};
use crate::config::BondsConfig;
use crate::curve_state::CurveState;
use crate::errors::{BondError, BondResult};
use crate::events::{BondEvent, EventSink};
use crate::ledger::Ledger;
use crate::msgs::{MsgBuy, MsgCreateBond, MsgEditBond, MsgSell, MsgSwap};
use crate::order::{BuyOrder, OrderKind, SellOrder, SwapOrder};
use crate::query::Querier;
use crate::settlement::{SettlementEngine, SettlementReport};
use crate::storage::BondStore;
use lib_types::{Address, BlockHeight, Coin, Coins};
use tracing::{debug, error, info, warn};

/// Domain tag for module account derivation
pub const MODULE_ACCOUNT_DOMAIN: &[u8] = b"lib-bonds/module-account/v1";

/// Holds buy and swap escrow until settlement
pub fn batches_intermediary_account() -> Address {
    Address::derive(MODULE_ACCOUNT_DOMAIN, b"batches_intermediary")
}

const UNFULFILLABLE_REASON: &str = "order no longer fulfillable after earlier orders in the batch";

/// Outcome of one `end_block` pass, in token order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndBlockReport {
    pub settled: Vec<(String, SettlementReport)>,
    /// Bonds whose batch failed to settle this block and is now halted
    pub halted: Vec<(String, BondError)>,
}

/// Bond state machine over a store, a ledger and an event sink
pub struct BondsKeeper<S: BondStore, L: Ledger, E: EventSink> {
    staking_denom: String,
    intermediary: Address,
    store: S,
    ledger: L,
    events: E,
}

impl<S: BondStore, L: Ledger, E: EventSink> BondsKeeper<S, L, E> {
    pub fn new(config: &BondsConfig, store: S, ledger: L, events: E) -> Self {
        Self {
            staking_denom: config.bonds.staking_denom.clone(),
            intermediary: batches_intermediary_account(),
            store,
            ledger,
            events,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for the host (genesis funding, external moves)
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn intermediary(&self) -> Address {
        self.intermediary
    }

    /// Hand the store, ledger and sink back to the host
    pub fn into_parts(self) -> (S, L, E) {
        (self.store, self.ledger, self.events)
    }

    pub fn querier(&self) -> Querier<'_, S, L> {
        Querier::new(&self.store, &self.ledger)
    }

    pub fn get_bond(&self, token: &str) -> BondResult<Bond> {
        self.store
            .get_bond(token)?
            .ok_or_else(|| BondError::BondDoesNotExist(token.to_string()))
    }

    pub fn get_batch(&self, token: &str) -> BondResult<Batch> {
        self.store
            .get_batch(token)?
            .ok_or_else(|| BondError::BatchDoesNotExist(token.to_string()))
    }

    /// Batch that still accepts orders
    fn open_batch(&self, token: &str) -> BondResult<Batch> {
        let batch = self.get_batch(token)?;
        if let Some(reason) = batch.halted.clone() {
            return Err(BondError::BatchHalted {
                token: token.to_string(),
                reason,
            });
        }
        Ok(batch)
    }

    fn live_state(&self, bond: &Bond) -> CurveState {
        CurveState::live(bond, &self.ledger.balances(&bond.reserve_address))
    }

    // ========================================================================
    // Create / edit
    // ========================================================================

    pub fn create_bond(&mut self, msg: MsgCreateBond, height: BlockHeight) -> BondResult<()> {
        msg.validate_basic()?;
        if msg.token == self.staking_denom {
            return Err(BondError::BondTokenCannotBeStakingToken(msg.token));
        }
        if msg.fee_address == reserve_address_for(&msg.token) {
            return Err(BondError::FeeAddressIsModuleAccount(format!(
                "{} is the reserve address of {}",
                msg.fee_address, msg.token
            )));
        }
        if msg.fee_address == self.intermediary {
            return Err(BondError::FeeAddressIsModuleAccount(format!(
                "{} is the batches intermediary account",
                msg.fee_address
            )));
        }
        if self.store.has_bond(&msg.token)? {
            return Err(BondError::BondAlreadyExists(msg.token));
        }

        let bond = Bond::new(msg)?;
        self.store.set_bond(&bond)?;
        self.store.set_batch(&Batch::new(bond.token.clone(), bond.batch_blocks))?;

        info!(
            "Bond created: token={}, function={}, reserves={:?}, max_supply={}",
            bond.token,
            bond.function_type(),
            bond.reserve_tokens,
            bond.max_supply
        );
        self.events.emit(BondEvent::BondCreated {
            token: bond.token.clone(),
            creator: bond.creator,
            function_type: bond.function_type(),
            function_parameters: bond.function.parameters().to_string(),
            reserve_tokens: bond.reserve_tokens.clone(),
            reserve_address: bond.reserve_address,
            max_supply: bond.max_supply.clone(),
            block_height: height,
        });
        Ok(())
    }

    pub fn edit_bond(&mut self, msg: MsgEditBond, height: BlockHeight) -> BondResult<()> {
        msg.validate_basic()?;
        let mut bond = self.get_bond(&msg.token)?;
        if !bond.signers_equal_to(&msg.signers) {
            return Err(BondError::SignersMismatch);
        }

        bond.apply_edit(&msg);
        self.store.set_bond(&bond)?;

        info!("Bond edited: token={}, editor={}", bond.token, msg.editor);
        self.events.emit(BondEvent::BondEdited {
            token: msg.token,
            editor: msg.editor,
            name: msg.name,
            description: msg.description,
            order_quantity_limits: msg.order_quantity_limits,
            sanity_rate: msg.sanity.map(|s| s.rate.to_string()),
            sanity_margin_percentage: msg.sanity.map(|s| s.margin_percentage.to_string()),
            block_height: height,
        });
        Ok(())
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Queue a buy order
    ///
    /// # Enforcement
    ///
    /// - **Reserve denoms**: `max_prices` lists exactly the bond's reserves
    /// - **Quantity limit**: the bond's per-order cap
    /// - **Max supply**: pending buys plus this one stay within `max_supply`
    /// - **Slippage**: cost and fee, priced after the pending buys, fit in
    ///   `max_prices`
    ///
    /// On success the escrow is taken and pending buys that can no longer be
    /// filled are cancelled and refunded.
    pub fn buy(&mut self, msg: MsgBuy, height: BlockHeight) -> BondResult<()> {
        msg.validate_basic()?;
        let token = msg.amount.denom.clone();
        let bond = self.get_bond(&token)?;

        // =====================================================================
        // Check 1: Reserve denoms
        // =====================================================================
        if !bond.reserve_denoms_equal_to(&msg.max_prices) {
            return Err(BondError::ReserveDenomsMismatch {
                got: msg.max_prices.denoms().collect::<Vec<_>>().join(","),
                expected: bond.reserve_tokens.join(","),
            });
        }

        // =====================================================================
        // Check 2: Quantity limit
        // =====================================================================
        if bond.any_order_quantity_limits_exceeded(&Coins::from(msg.amount.clone())) {
            return Err(BondError::OrderQuantityLimitExceeded);
        }

        let mut batch = self.open_batch(&token)?;
        if bond.function.is_swapper() && bond.current_supply.is_zero() {
            return self.bootstrap_swapper(bond, msg, height);
        }

        // =====================================================================
        // Check 3: Price against the state after the pending buys
        // =====================================================================
        let projection = batch.project(&bond, &self.live_state(&bond))?;
        let order = BuyOrder::new(msg.buyer, msg.amount.clone(), msg.max_prices.clone());
        let mut after_buys = projection.after_buys;
        let quote = after_buys.apply_buy(&bond, &order)?;
        let after_sells = batch.replay_sells(&bond, &after_buys)?;
        let prices = RunningPrices::from_states(&bond, &after_buys, &after_sells)?;

        debug!(
            "Buy priced: bond={}, buyer={}, amount={}, total={}, max={}",
            token, msg.buyer, msg.amount, quote.total_prices, msg.max_prices
        );

        // =====================================================================
        // Escrow and queue
        // =====================================================================
        self.ledger.transfer(&msg.buyer, &self.intermediary, &order.escrow())?;
        batch.push_buy(order, prices)?;
        self.events.emit(BondEvent::BuyOrderPlaced {
            token: token.clone(),
            buyer: msg.buyer,
            amount: msg.amount,
            max_prices: msg.max_prices,
            block_height: height,
        });

        self.cancel_unfulfillable_buys(&bond, &mut batch, height)?;
        self.store.set_batch(&batch)?;
        Ok(())
    }

    /// First buy on an empty swapper pool: `max_prices` becomes the pool and
    /// the buyer is minted the full requested `amount` immediately, which
    /// need not be a single token. The pool ratio, not the amount, sets the
    /// opening price.
    fn bootstrap_swapper(&mut self, mut bond: Bond, msg: MsgBuy, height: BlockHeight) -> BondResult<()> {
        if bond.reserves_violate_sanity_rate(&msg.max_prices)? {
            return Err(BondError::ValuesViolateSanityRate);
        }
        if msg.amount.amount > bond.max_supply.amount {
            return Err(BondError::CannotMintMoreThanMaxSupply {
                max: bond.max_supply.to_string(),
                would_have: msg.amount.to_string(),
            });
        }

        self.ledger
            .transfer(&msg.buyer, &bond.reserve_address, &msg.max_prices)?;
        self.ledger
            .mint(&msg.buyer, &Coins::from(msg.amount.clone()))
            .map_err(|e| {
                error!("Swapper bootstrap mint failed: bond={}, {}", bond.token, e);
                BondError::invariant(&bond.token, format!("bootstrap mint: {e}"))
            })?;
        bond.current_supply = Coin::new(bond.token.clone(), msg.amount.amount);
        self.store.set_bond(&bond)?;

        info!(
            "Swapper initialized: bond={}, buyer={}, amount={}, pool={}",
            bond.token, msg.buyer, msg.amount, msg.max_prices
        );
        self.events.emit(BondEvent::SwapperInitialized {
            token: bond.token,
            buyer: msg.buyer,
            amount: msg.amount,
            charged_prices: msg.max_prices,
            block_height: height,
        });
        Ok(())
    }

    /// Queue a sell order, burning the tokens up front
    pub fn sell(&mut self, msg: MsgSell, height: BlockHeight) -> BondResult<()> {
        msg.validate_basic()?;
        let token = msg.amount.denom.clone();
        let bond = self.get_bond(&token)?;

        if !bond.allow_sells {
            return Err(BondError::SellingDisabled);
        }
        if bond.any_order_quantity_limits_exceeded(&Coins::from(msg.amount.clone())) {
            return Err(BondError::OrderQuantityLimitExceeded);
        }

        let mut batch = self.open_batch(&token)?;
        let projection = batch.project(&bond, &self.live_state(&bond))?;
        let order = SellOrder::new(msg.seller, msg.amount.clone());
        let mut after_sells = projection.after_sells;
        let quote = after_sells.apply_sell(&bond, &order)?;
        let prices = RunningPrices::from_states(&bond, &projection.after_buys, &after_sells)?;

        debug!(
            "Sell priced: bond={}, seller={}, amount={}, returns={}",
            token, msg.seller, msg.amount, quote.total_returns
        );

        self.ledger.burn(&msg.seller, &order.escrow())?;
        batch.push_sell(order, prices)?;
        self.store.set_batch(&batch)?;

        // Sells never trigger the unfulfillable-order sweep.
        self.events.emit(BondEvent::SellOrderPlaced {
            token,
            seller: msg.seller,
            amount: msg.amount,
            block_height: height,
        });
        Ok(())
    }

    /// Queue a swap order. Only the pair is checked here; pricing happens at
    /// settlement.
    pub fn swap(&mut self, msg: MsgSwap, height: BlockHeight) -> BondResult<()> {
        msg.validate_basic()?;
        let bond = self.get_bond(&msg.bond_token)?;

        if bond.any_order_quantity_limits_exceeded(&Coins::from(msg.from.clone())) {
            return Err(BondError::OrderQuantityLimitExceeded);
        }
        bond.check_swap_pair(&msg.from.denom, &msg.to_token)?;
        let mut batch = self.open_batch(&msg.bond_token)?;

        let order = SwapOrder::new(msg.swapper, msg.from.clone(), msg.to_token.clone());
        self.ledger.transfer(&msg.swapper, &self.intermediary, &order.escrow())?;
        batch.push_swap(order);
        self.store.set_batch(&batch)?;

        debug!(
            "Swap queued: bond={}, swapper={}, from={}, to={}",
            msg.bond_token, msg.swapper, msg.from, msg.to_token
        );
        self.events.emit(BondEvent::SwapOrderPlaced {
            token: msg.bond_token,
            swapper: msg.swapper,
            from: msg.from,
            to_token: msg.to_token,
            block_height: height,
        });
        Ok(())
    }

    /// Cancels and refunds pending buys that fail against the live state
    /// plus the buys ahead of them. Returns the number cancelled.
    fn cancel_unfulfillable_buys(&mut self, bond: &Bond, batch: &mut Batch, height: BlockHeight) -> BondResult<usize> {
        let projection = batch.project(bond, &self.live_state(bond))?;
        if projection.unfulfillable_buys.is_empty() {
            return Ok(0);
        }

        let mut cancelled = 0;
        for index in &projection.unfulfillable_buys {
            let order = match batch.cancel_buy(*index, UNFULFILLABLE_REASON) {
                Some(order) => order.clone(),
                None => continue,
            };
            let buyer = order.base.account;
            let escrow = order.escrow();
            self.ledger
                .transfer(&self.intermediary, &buyer, &escrow)
                .map_err(|e| {
                    error!("Sweep refund failed: bond={}, buyer={}, {}", bond.token, buyer, e);
                    BondError::invariant(&bond.token, format!("sweep refund: {e}"))
                })?;

            warn!(
                "Buy cancelled by sweep: bond={}, buyer={}, amount={}",
                bond.token, buyer, order.base.amount
            );
            self.events.emit(BondEvent::OrderCancelled {
                token: bond.token.clone(),
                kind: OrderKind::Buy,
                account: buyer,
                amount: order.base.amount,
                refunded: escrow,
                reason: UNFULFILLABLE_REASON.to_string(),
                block_height: height,
            });
            cancelled += 1;
        }

        batch.set_prices(projection.running_prices(bond)?);
        Ok(cancelled)
    }

    // ========================================================================
    // Block processing
    // ========================================================================

    /// Advance every bond's batch by one block and settle the due ones.
    ///
    /// Bonds are visited in token order. A bond whose settlement fails is
    /// rolled back and its batch halted; the pass continues with the next
    /// bond. Only store failures abort the pass.
    pub fn end_block(&mut self, height: BlockHeight) -> BondResult<EndBlockReport> {
        let mut report = EndBlockReport::default();
        for token in self.store.bond_tokens()? {
            let mut batch = self.get_batch(&token)?;
            if batch.is_halted() {
                continue;
            }
            if !batch.tick() {
                self.store.set_batch(&batch)?;
                continue;
            }

            let mut bond = self.get_bond(&token)?;
            let mut settled = batch.clone();
            let outcome = SettlementEngine::new(&mut self.ledger, &mut self.events, self.intermediary, height)
                .settle_atomic(&mut bond, &mut settled);

            match outcome {
                Ok(summary) => {
                    let fresh = Batch::new(token.clone(), bond.batch_blocks);
                    self.store.commit_settlement(&bond, &settled, &fresh)?;
                    report.settled.push((token, summary));
                }
                Err(e) => {
                    error!("Batch halted: bond={}, height={}, {}", token, height, e);
                    batch.halt(e.to_string());
                    self.store.set_batch(&batch)?;
                    self.events.emit(BondEvent::BatchHalted {
                        token: token.clone(),
                        reason: e.to_string(),
                        block_height: height,
                    });
                    report.halted.push((token, e));
                }
            }
        }
        Ok(report)
    }
}
