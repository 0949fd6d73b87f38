//! Key Encoding Helpers
//!
//! Key encoding is PROTOCOL. These functions define the canonical byte layout
//! for all bond store keys. Never inline key construction in business logic.
//!
//! # Format
//!
//! `[prefix: 1][token: utf-8 bytes]`
//!
//! | Prefix | Record     |
//! |--------|------------|
//! | `0x00` | Bond       |
//! | `0x01` | Batch      |
//! | `0x02` | Last batch |
//!
//! A prefix scan over `0x00` yields bonds in lexical token order.

pub const BOND_PREFIX: u8 = 0x00;
pub const BATCH_PREFIX: u8 = 0x01;
pub const LAST_BATCH_PREFIX: u8 = 0x02;

#[inline]
fn prefixed(prefix: u8, token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + token.len());
    key.push(prefix);
    key.extend_from_slice(token.as_bytes());
    key
}

/// Key for a bond record
#[inline]
pub fn bond_key(token: &str) -> Vec<u8> {
    prefixed(BOND_PREFIX, token)
}

/// Key for a bond's live batch
#[inline]
pub fn batch_key(token: &str) -> Vec<u8> {
    prefixed(BATCH_PREFIX, token)
}

/// Key for a bond's most recently settled batch
#[inline]
pub fn last_batch_key(token: &str) -> Vec<u8> {
    prefixed(LAST_BATCH_PREFIX, token)
}

/// Extract the token from a bond key
#[inline]
pub fn parse_bond_key(key: &[u8]) -> Option<&str> {
    match key.split_first() {
        Some((&BOND_PREFIX, rest)) if !rest.is_empty() => std::str::from_utf8(rest).ok(),
        _ => None,
    }
}
