//! Bonds engine primitives.
//! Stable, protocol-neutral, behavior-free.
//!
//! Rule: amounts are integers, prices are decimals, and every collection
//! that reaches state is ordered.

pub mod coins;
pub mod primitives;

pub use coins::{is_valid_denom, Coin, Coins, CoinsError, DecCoins};
pub use primitives::{Address, AddressParseError, Amount, BlockHeight};
