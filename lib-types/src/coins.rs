//! Coin Types
//!
//! Integer coin amounts keyed by denomination, plus the decimal variant used
//! for curve prices before they are rounded into base units.
//!
//! # Invariants
//!
//! - `Coins` never stores a zero amount; a missing denom reads as zero.
//! - Both collections are `BTreeMap`-backed, so iteration order is the
//!   lexical denom order on every node.

use crate::primitives::Amount;
use rust_decimal::prelude::{Decimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from coin parsing and arithmetic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoinsError {
    #[error("Invalid denomination: {0}")]
    InvalidDenom(String),

    #[error("Invalid coin expression: {0}")]
    InvalidCoin(String),

    #[error("Duplicate denomination: {0}")]
    DuplicateDenom(String),

    #[error("Arithmetic overflow in {0}")]
    Overflow(String),

    #[error("Insufficient {denom}: have {have}, need {need}")]
    Insufficient { denom: String, have: Amount, need: Amount },

    #[error("Decimal amount out of range for {denom}: {value}")]
    OutOfRange { denom: String, value: String },
}

/// Checks a denomination against `[a-z][a-z0-9]{2,15}`.
pub fn is_valid_denom(denom: &str) -> bool {
    let bytes = denom.as_bytes();
    if !(3..=16).contains(&bytes.len()) {
        return false;
    }
    bytes[0].is_ascii_lowercase()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

// ============================================================================
// COIN
// ============================================================================

/// A single amount of one denomination
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Amount) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = CoinsError;

    /// Parses `<amount><denom>`, e.g. `100abc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| CoinsError::InvalidCoin(s.to_string()))?;
        if split == 0 {
            return Err(CoinsError::InvalidCoin(s.to_string()));
        }
        let (amount, denom) = s.split_at(split);
        let amount = amount
            .parse::<Amount>()
            .map_err(|_| CoinsError::InvalidCoin(s.to_string()))?;
        if !is_valid_denom(denom) {
            return Err(CoinsError::InvalidDenom(denom.to_string()));
        }
        Ok(Coin::new(denom, amount))
    }
}

// ============================================================================
// COINS
// ============================================================================

/// A set of integer amounts keyed by denom
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coins(BTreeMap<String, Amount>);

impl Coins {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn single(denom: impl Into<String>, amount: Amount) -> Self {
        let mut coins = Self::new();
        coins.set(denom, amount);
        coins
    }

    /// Builds a set from individual coins, summing repeated denoms.
    pub fn try_from_coins<I>(coins: I) -> Result<Self, CoinsError>
    where
        I: IntoIterator<Item = Coin>,
    {
        let mut out = Self::new();
        for coin in coins {
            if !is_valid_denom(&coin.denom) {
                return Err(CoinsError::InvalidDenom(coin.denom));
            }
            out.add_coin(&coin)?;
        }
        Ok(out)
    }

    pub fn amount_of(&self, denom: &str) -> Amount {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Amount)> + '_ {
        self.0.iter().map(|(denom, amount)| (denom.as_str(), *amount))
    }

    pub fn denoms(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    pub fn to_coin_vec(&self) -> Vec<Coin> {
        self.iter().map(|(denom, amount)| Coin::new(denom, amount)).collect()
    }

    /// Sets the amount for `denom`; zero removes the entry.
    pub fn set(&mut self, denom: impl Into<String>, amount: Amount) {
        let denom = denom.into();
        if amount == 0 {
            self.0.remove(&denom);
        } else {
            self.0.insert(denom, amount);
        }
    }

    pub fn add_coin(&mut self, coin: &Coin) -> Result<(), CoinsError> {
        let sum = self
            .amount_of(&coin.denom)
            .checked_add(coin.amount)
            .ok_or_else(|| CoinsError::Overflow(coin.denom.clone()))?;
        self.set(coin.denom.clone(), sum);
        Ok(())
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            out.add_coin(&Coin::new(denom, amount))?;
        }
        Ok(out)
    }

    /// Subtracts `other`, failing if any denom would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut out = self.clone();
        for (denom, need) in other.iter() {
            let have = self.amount_of(denom);
            let rest = have.checked_sub(need).ok_or_else(|| CoinsError::Insufficient {
                denom: denom.to_string(),
                have,
                need,
            })?;
            out.set(denom, rest);
        }
        Ok(out)
    }

    /// True if every denom in `other` is covered by `self`.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.iter().all(|(denom, amount)| self.amount_of(denom) >= amount)
    }

    /// True if any denom in `self` exceeds the amount in `other`.
    pub fn is_any_gt(&self, other: &Coins) -> bool {
        self.iter().any(|(denom, amount)| amount > other.amount_of(denom))
    }

    /// True if the stored denoms are exactly `denoms`, as a set.
    pub fn has_denoms_exactly(&self, denoms: &[String]) -> bool {
        self.0.len() == denoms.len() && denoms.iter().all(|d| self.0.contains_key(d))
    }

    /// Per-denom minimum of `self` and `cap`.
    pub fn capped_by(&self, cap: &Coins) -> Coins {
        let mut out = Coins::new();
        for (denom, amount) in self.iter() {
            out.set(denom, amount.min(cap.amount_of(denom)));
        }
        out
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        Coins::single(coin.denom, coin.amount)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, amount)| format!("{amount}{denom}"))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for Coins {
    type Err = CoinsError;

    /// Parses a comma-separated list such as `100abc,20def`.
    /// Zero amounts are accepted and dropped; repeated denoms are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Coins::new();
        let mut seen = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let coin: Coin = part.parse()?;
            if seen.contains(&coin.denom) {
                return Err(CoinsError::DuplicateDenom(coin.denom));
            }
            seen.push(coin.denom.clone());
            out.set(coin.denom, coin.amount);
        }
        Ok(out)
    }
}

// ============================================================================
// DEC COINS
// ============================================================================

/// Decimal amounts keyed by denom. Zero entries are kept so that price
/// listings show every reserve denom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecCoins(BTreeMap<String, Decimal>);

impl DecCoins {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, denom: impl Into<String>, amount: Decimal) {
        self.0.insert(denom.into(), amount);
    }

    pub fn get(&self, denom: &str) -> Decimal {
        self.0.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> + '_ {
        self.0.iter().map(|(denom, amount)| (denom.as_str(), *amount))
    }

    /// Rounds every amount up into base units.
    pub fn ceil(&self) -> Result<Coins, CoinsError> {
        self.round_with(Decimal::ceil)
    }

    /// Rounds every amount down into base units.
    pub fn floor(&self) -> Result<Coins, CoinsError> {
        self.round_with(Decimal::floor)
    }

    fn round_with(&self, round: fn(&Decimal) -> Decimal) -> Result<Coins, CoinsError> {
        let mut out = Coins::new();
        for (denom, amount) in self.iter() {
            let rounded = round(&amount);
            let value = if rounded.is_sign_negative() && !rounded.is_zero() {
                None
            } else {
                rounded.to_u128()
            };
            let value = value.ok_or_else(|| CoinsError::OutOfRange {
                denom: denom.to_string(),
                value: amount.to_string(),
            })?;
            out.set(denom, value);
        }
        Ok(out)
    }
}

impl fmt::Display for DecCoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, amount)| format!("{}{denom}", amount.normalize()))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

// ============================================================================
// TESTS
// ============================================================================
