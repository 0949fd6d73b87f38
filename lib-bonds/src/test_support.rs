//! Shared fixtures for unit tests

use crate::curve::FunctionType;
use crate::msgs::MsgCreateBond;
use lib_types::{Address, Coin, Coins};
use rust_decimal::Decimal;

pub(crate) fn addr(id: u8) -> Address {
    Address::new([id; 32])
}

/// Power bond `12·x² + 100` with no fees, max supply 1,000,000, one-block
/// batches and `addr(1)` as sole signer.
pub(crate) fn power_bond_msg(token: &str, reserves: &[&str]) -> MsgCreateBond {
    MsgCreateBond {
        token: token.to_string(),
        name: format!("{token} bond"),
        description: "test bond".to_string(),
        creator: addr(1),
        function_type: FunctionType::PowerFunction,
        function_parameters: "m:12,n:2,c:100".parse().unwrap(),
        reserve_tokens: reserves.iter().map(|r| r.to_string()).collect(),
        tx_fee_percentage: Decimal::ZERO,
        exit_fee_percentage: Decimal::ZERO,
        fee_address: addr(9),
        max_supply: Coin::new(token, 1_000_000),
        order_quantity_limits: Coins::new(),
        sanity_rate: Decimal::ZERO,
        sanity_margin_percentage: Decimal::ZERO,
        allow_sells: true,
        signers: vec![addr(1)],
        batch_blocks: 1,
    }
}

pub(crate) fn swapper_bond_msg(token: &str, reserve_a: &str, reserve_b: &str) -> MsgCreateBond {
    MsgCreateBond {
        function_type: FunctionType::SwapperFunction,
        function_parameters: Default::default(),
        ..power_bond_msg(token, &[reserve_a, reserve_b])
    }
}
