//! Ledger Seam
//!
//! The engine never owns account balances. It moves them through this trait,
//! which the host chain implements over its bank/account store.
//!
//! # Contract
//!
//! - Multi-denom operations are all-or-nothing: on error no balance changed.
//! - A short balance fails with [`LedgerError::InsufficientFunds`].
//!
//! [`StagedLedger`] layers buffered writes over any ledger so a sequence of
//! moves can be kept or thrown away as a whole.

use lib_types::{Address, Amount, Coins, CoinsError};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error during a ledger operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds in {account}: have {have}{denom}, need {need}{denom}")]
    InsufficientFunds {
        account: Address,
        denom: String,
        have: Amount,
        need: Amount,
    },

    #[error("Balance overflow for {0}")]
    Overflow(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Account balance store used by the bonds engine
pub trait Ledger {
    /// Balance of one denom held by `account`
    fn balance(&self, account: &Address, denom: &str) -> Amount;

    /// All balances held by `account`
    fn balances(&self, account: &Address) -> Coins;

    /// Move `coins` from one account to another
    fn transfer(&mut self, from: &Address, to: &Address, coins: &Coins) -> LedgerResult<()>;

    /// Create `coins` in `to`
    fn mint(&mut self, to: &Address, coins: &Coins) -> LedgerResult<()>;

    /// Destroy `coins` held by `from`
    fn burn(&mut self, from: &Address, coins: &Coins) -> LedgerResult<()>;
}

fn debit(account: &Address, balance: &Coins, coins: &Coins) -> LedgerResult<Coins> {
    balance.checked_sub(coins).map_err(|e| match e {
        CoinsError::Insufficient { denom, have, need } => LedgerError::InsufficientFunds {
            account: *account,
            denom,
            have,
            need,
        },
        other => LedgerError::Overflow(other.to_string()),
    })
}

fn credit(balance: &Coins, coins: &Coins) -> LedgerResult<Coins> {
    balance
        .checked_add(coins)
        .map_err(|e| LedgerError::Overflow(e.to_string()))
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// In-memory ledger for tests and embedded use.
///
/// Tracks total supply per denom so mint/burn conservation can be asserted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    accounts: BTreeMap<Address, Coins>,
    supply: Coins,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total minted minus burned for `denom`
    pub fn supply_of(&self, denom: &str) -> Amount {
        self.supply.amount_of(denom)
    }

    /// Accounts with a non-empty balance, in address order
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Coins)> {
        self.accounts.iter().filter(|(_, coins)| !coins.is_empty())
    }

    fn store(&mut self, account: &Address, coins: Coins) {
        if coins.is_empty() {
            self.accounts.remove(account);
        } else {
            self.accounts.insert(*account, coins);
        }
    }
}

impl Ledger for InMemoryLedger {
    fn balance(&self, account: &Address, denom: &str) -> Amount {
        self.accounts
            .get(account)
            .map(|coins| coins.amount_of(denom))
            .unwrap_or(0)
    }

    fn balances(&self, account: &Address) -> Coins {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    fn transfer(&mut self, from: &Address, to: &Address, coins: &Coins) -> LedgerResult<()> {
        let from_after = debit(from, &self.balances(from), coins)?;
        if from == to {
            return Ok(());
        }
        let to_after = credit(&self.balances(to), coins)?;
        self.store(from, from_after);
        self.store(to, to_after);
        Ok(())
    }

    fn mint(&mut self, to: &Address, coins: &Coins) -> LedgerResult<()> {
        let to_after = credit(&self.balances(to), coins)?;
        let supply_after = credit(&self.supply, coins)?;
        self.store(to, to_after);
        self.supply = supply_after;
        Ok(())
    }

    fn burn(&mut self, from: &Address, coins: &Coins) -> LedgerResult<()> {
        let from_after = debit(from, &self.balances(from), coins)?;
        let supply_after = self
            .supply
            .checked_sub(coins)
            .map_err(|e| LedgerError::Overflow(e.to_string()))?;
        self.store(from, from_after);
        self.supply = supply_after;
        Ok(())
    }
}

// ============================================================================
// Staged Writes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum StagedOp {
    Transfer { from: Address, to: Address, coins: Coins },
    Mint { to: Address, coins: Coins },
    Burn { from: Address, coins: Coins },
}

/// Buffers writes over a base ledger.
///
/// Reads see the staged balances. Nothing reaches the base until
/// [`StagedLedger::commit`]; dropping the stage discards every write.
pub struct StagedLedger<'a, L: Ledger> {
    base: &'a mut L,
    /// Post-write balances of every account touched so far
    touched: BTreeMap<Address, Coins>,
    ops: Vec<StagedOp>,
}

impl<'a, L: Ledger> StagedLedger<'a, L> {
    pub fn new(base: &'a mut L) -> Self {
        Self {
            base,
            touched: BTreeMap::new(),
            ops: Vec::new(),
        }
    }

    /// Number of buffered writes
    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    /// Replays the buffered writes onto the base ledger in order.
    ///
    /// Every write already succeeded against the staged balances, so an
    /// error here means the base ledger changed underneath the stage.
    pub fn commit(self) -> LedgerResult<()> {
        for op in self.ops {
            match op {
                StagedOp::Transfer { from, to, coins } => self.base.transfer(&from, &to, &coins)?,
                StagedOp::Mint { to, coins } => self.base.mint(&to, &coins)?,
                StagedOp::Burn { from, coins } => self.base.burn(&from, &coins)?,
            }
        }
        Ok(())
    }
}

impl<L: Ledger> Ledger for StagedLedger<'_, L> {
    fn balance(&self, account: &Address, denom: &str) -> Amount {
        match self.touched.get(account) {
            Some(coins) => coins.amount_of(denom),
            None => self.base.balance(account, denom),
        }
    }

    fn balances(&self, account: &Address) -> Coins {
        match self.touched.get(account) {
            Some(coins) => coins.clone(),
            None => self.base.balances(account),
        }
    }

    fn transfer(&mut self, from: &Address, to: &Address, coins: &Coins) -> LedgerResult<()> {
        let from_after = debit(from, &self.balances(from), coins)?;
        if from == to {
            return Ok(());
        }
        let to_after = credit(&self.balances(to), coins)?;
        self.touched.insert(*from, from_after);
        self.touched.insert(*to, to_after);
        self.ops.push(StagedOp::Transfer {
            from: *from,
            to: *to,
            coins: coins.clone(),
        });
        Ok(())
    }

    fn mint(&mut self, to: &Address, coins: &Coins) -> LedgerResult<()> {
        let to_after = credit(&self.balances(to), coins)?;
        self.touched.insert(*to, to_after);
        self.ops.push(StagedOp::Mint {
            to: *to,
            coins: coins.clone(),
        });
        Ok(())
    }

    fn burn(&mut self, from: &Address, coins: &Coins) -> LedgerResult<()> {
        let from_after = debit(from, &self.balances(from), coins)?;
        self.touched.insert(*from, from_after);
        self.ops.push(StagedOp::Burn {
            from: *from,
            coins: coins.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: u8) -> Address {
        Address::new([id; 32])
    }

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    #[test]
    fn test_mint_transfer_burn() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr(1), &coins("100abc,50def")).unwrap();
        ledger.transfer(&addr(1), &addr(2), &coins("30abc")).unwrap();
        ledger.burn(&addr(2), &coins("10abc")).unwrap();

        assert_eq!(ledger.balance(&addr(1), "abc"), 70);
        assert_eq!(ledger.balance(&addr(2), "abc"), 20);
        assert_eq!(ledger.supply_of("abc"), 90);
        assert_eq!(ledger.supply_of("def"), 50);
    }

    #[test]
    fn test_multi_denom_transfer_is_all_or_nothing() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr(1), &coins("100abc,5def")).unwrap();

        let err = ledger
            .transfer(&addr(1), &addr(2), &coins("10abc,6def"))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: addr(1),
                denom: "def".to_string(),
                have: 5,
                need: 6,
            }
        );
        assert_eq!(ledger.balances(&addr(1)), coins("100abc,5def"));
        assert!(ledger.balances(&addr(2)).is_empty());
    }

    #[test]
    fn test_burn_more_than_held_fails() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr(1), &coins("5abc")).unwrap();
        assert!(ledger.burn(&addr(1), &coins("6abc")).is_err());
        assert_eq!(ledger.supply_of("abc"), 5);
    }

    #[test]
    fn test_self_transfer_checks_balance_only() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr(1), &coins("5abc")).unwrap();
        ledger.transfer(&addr(1), &addr(1), &coins("5abc")).unwrap();
        assert_eq!(ledger.balance(&addr(1), "abc"), 5);
        assert!(ledger.transfer(&addr(1), &addr(1), &coins("6abc")).is_err());
    }

    #[test]
    fn test_empty_accounts_are_dropped() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr(1), &coins("5abc")).unwrap();
        ledger.transfer(&addr(1), &addr(2), &coins("5abc")).unwrap();
        let holders: Vec<_> = ledger.accounts().map(|(a, _)| *a).collect();
        assert_eq!(holders, vec![addr(2)]);
    }

    #[test]
    fn test_staged_writes_are_invisible_until_commit() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr(1), &coins("100abc")).unwrap();

        let mut staged = StagedLedger::new(&mut ledger);
        staged.transfer(&addr(1), &addr(2), &coins("40abc")).unwrap();
        staged.mint(&addr(2), &coins("5def")).unwrap();
        staged.burn(&addr(1), &coins("10abc")).unwrap();
        assert_eq!(staged.balance(&addr(1), "abc"), 50);
        assert_eq!(staged.balances(&addr(2)), coins("40abc,5def"));
        assert_eq!(staged.pending_ops(), 3);
        staged.commit().unwrap();

        assert_eq!(ledger.balance(&addr(1), "abc"), 50);
        assert_eq!(ledger.balances(&addr(2)), coins("40abc,5def"));
        assert_eq!(ledger.supply_of("abc"), 90);
        assert_eq!(ledger.supply_of("def"), 5);
    }

    #[test]
    fn test_dropped_stage_leaves_base_untouched() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr(1), &coins("100abc")).unwrap();

        {
            let mut staged = StagedLedger::new(&mut ledger);
            staged.transfer(&addr(1), &addr(2), &coins("60abc")).unwrap();
            // second move overdraws the staged balance, not the base one
            assert!(staged.transfer(&addr(1), &addr(3), &coins("60abc")).is_err());
            staged.mint(&addr(3), &coins("7abc")).unwrap();
        }

        assert_eq!(ledger.balance(&addr(1), "abc"), 100);
        assert_eq!(ledger.balance(&addr(2), "abc"), 0);
        assert_eq!(ledger.balance(&addr(3), "abc"), 0);
        assert_eq!(ledger.supply_of("abc"), 100);
    }
}
