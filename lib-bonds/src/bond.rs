//! Bond
//!
//! Persistent configuration and live supply of one bonded token, plus the
//! supply-parameterised pricing projections the batch and settlement code
//! evaluate against.
//!
//! # Mutability
//! - `name`, `description`, `order_quantity_limits` and the sanity pair are
//!   editable by the exact signer set.
//! - The curve, reserves, fees and addresses are fixed at creation.
//! - `current_supply` moves only through settlement and swapper bootstrap.

use crate::curve::{BondingFunction, FunctionType};
use crate::errors::{BondError, BondResult};
use crate::fees;
use crate::msgs::{MsgCreateBond, MsgEditBond};
use lib_types::{Address, Amount, Coin, Coins, DecCoins};
use rust_decimal::prelude::{Decimal, FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Domain tag for reserve address derivation
pub const RESERVE_ADDRESS_DOMAIN: &[u8] = b"lib-bonds/reserve-address/v1";

/// Converts a base-unit amount into a decimal.
pub fn to_dec(amount: Amount) -> BondResult<Decimal> {
    Decimal::from_u128(amount).ok_or(BondError::Overflow)
}

/// Converts an already-rounded, non-negative decimal into base units.
pub fn to_amount(value: Decimal) -> BondResult<Amount> {
    value.to_u128().ok_or(BondError::Overflow)
}

/// Address holding the reserve pool of the bond `token`
pub fn reserve_address_for(token: &str) -> Address {
    Address::derive(RESERVE_ADDRESS_DOMAIN, token.as_bytes())
}

/// Output of a swap quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReturn {
    /// Input left after the fee; this is what enters the pool
    pub net_in: Coin,
    /// Fee, in the input denom
    pub fee: Coin,
    /// Output paid to the swapper
    pub returns: Coin,
}

/// A bonded token and its curve configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub token: String,
    pub name: String,
    pub description: String,
    pub creator: Address,
    pub function: BondingFunction,
    pub reserve_tokens: Vec<String>,
    pub reserve_address: Address,
    pub tx_fee_percentage: Decimal,
    pub exit_fee_percentage: Decimal,
    pub fee_address: Address,
    pub max_supply: Coin,
    pub order_quantity_limits: Coins,
    pub sanity_rate: Decimal,
    pub sanity_margin_percentage: Decimal,
    pub allow_sells: bool,
    pub signers: Vec<Address>,
    pub batch_blocks: u64,
    pub current_supply: Coin,
}

impl Bond {
    /// Builds a bond from a creation request, running its stateless checks.
    pub fn new(msg: MsgCreateBond) -> BondResult<Self> {
        msg.validate_basic()?;
        let function = BondingFunction::new(msg.function_type, &msg.function_parameters)?;
        Ok(Self {
            reserve_address: reserve_address_for(&msg.token),
            current_supply: Coin::zero(msg.token.clone()),
            token: msg.token,
            name: msg.name,
            description: msg.description,
            creator: msg.creator,
            function,
            reserve_tokens: msg.reserve_tokens,
            tx_fee_percentage: msg.tx_fee_percentage,
            exit_fee_percentage: msg.exit_fee_percentage,
            fee_address: msg.fee_address,
            max_supply: msg.max_supply,
            order_quantity_limits: msg.order_quantity_limits,
            sanity_rate: msg.sanity_rate,
            sanity_margin_percentage: msg.sanity_margin_percentage,
            allow_sells: msg.allow_sells,
            signers: msg.signers,
            batch_blocks: msg.batch_blocks,
        })
    }

    pub fn function_type(&self) -> FunctionType {
        self.function.function_type()
    }

    /// Order-insensitive equality with the stored signer set
    pub fn signers_equal_to(&self, signers: &[Address]) -> bool {
        let stored: BTreeSet<&Address> = self.signers.iter().collect();
        let given: BTreeSet<&Address> = signers.iter().collect();
        stored == given
    }

    /// Applies an already-authorised edit. Fields left as `None` are kept.
    pub fn apply_edit(&mut self, edit: &MsgEditBond) {
        if let Some(name) = &edit.name {
            self.name = name.clone();
        }
        if let Some(description) = &edit.description {
            self.description = description.clone();
        }
        if let Some(limits) = &edit.order_quantity_limits {
            self.order_quantity_limits = limits.clone();
        }
        if let Some(sanity) = &edit.sanity {
            self.sanity_rate = sanity.rate;
            self.sanity_margin_percentage = sanity.margin_percentage;
        }
    }

    pub fn is_reserve_token(&self, denom: &str) -> bool {
        self.reserve_tokens.iter().any(|t| t == denom)
    }

    pub fn reserve_denoms_equal_to(&self, coins: &Coins) -> bool {
        coins.has_denoms_exactly(&self.reserve_tokens)
    }

    /// True if any amount is above its configured limit. A missing or zero
    /// limit means unlimited.
    pub fn any_order_quantity_limits_exceeded(&self, amounts: &Coins) -> bool {
        amounts.iter().any(|(denom, amount)| {
            let limit = self.order_quantity_limits.amount_of(denom);
            limit != 0 && amount > limit
        })
    }

    /// Sanity band check over the first two reserves
    pub fn reserves_violate_sanity_rate(&self, reserves: &Coins) -> BondResult<bool> {
        if self.reserve_tokens.len() < 2 {
            return Ok(false);
        }
        fees::violates_sanity_rate(
            self.sanity_rate,
            self.sanity_margin_percentage,
            to_dec(reserves.amount_of(&self.reserve_tokens[0]))?,
            to_dec(reserves.amount_of(&self.reserve_tokens[1]))?,
        )
    }

    /// `balances` restricted to this bond's reserve denoms
    pub fn reserve_balances(&self, balances: &Coins) -> Coins {
        let mut out = Coins::new();
        for denom in &self.reserve_tokens {
            out.set(denom.clone(), balances.amount_of(denom));
        }
        out
    }

    /// One entry per reserve token, in reserve order, zero where absent
    pub fn reserve_listing(&self, coins: &Coins) -> Vec<Coin> {
        self.reserve_tokens
            .iter()
            .map(|denom| Coin::new(denom.clone(), coins.amount_of(denom)))
            .collect()
    }

    // ========================================================================
    // Pricing projections
    // ========================================================================

    fn per_reserve<F>(&self, mut f: F) -> BondResult<DecCoins>
    where
        F: FnMut(&str) -> BondResult<Decimal>,
    {
        let mut out = DecCoins::new();
        for denom in &self.reserve_tokens {
            out.insert(denom.clone(), f(denom)?);
        }
        Ok(out)
    }

    /// Marginal price per reserve token at a hypothetical supply.
    /// Not defined for the swapper family.
    pub fn prices_at_supply(&self, supply: Amount) -> BondResult<DecCoins> {
        let price = self.function.price_at_supply(to_dec(supply)?)?;
        self.per_reserve(|_| Ok(price))
    }

    /// Marginal price per reserve token at the given state. For the swapper
    /// this is the cost of minting one token.
    pub fn current_prices(&self, supply: Amount, reserves: &Coins) -> BondResult<DecCoins> {
        if self.function.is_swapper() {
            self.prices_to_mint(supply, 1, reserves)
        } else {
            self.prices_at_supply(supply)
        }
    }

    /// Unrounded reserve cost of minting `amount` at `supply`
    pub fn prices_to_mint(&self, supply: Amount, amount: Amount, reserves: &Coins) -> BondResult<DecCoins> {
        let supply = to_dec(supply)?;
        let amount = to_dec(amount)?;
        self.per_reserve(|denom| {
            self.function
                .cost_to_mint(supply, amount, to_dec(reserves.amount_of(denom))?)
        })
    }

    /// Unrounded reserve returns for burning `amount` at `supply`
    pub fn returns_for_burn(&self, supply: Amount, amount: Amount, reserves: &Coins) -> BondResult<DecCoins> {
        let supply = to_dec(supply)?;
        let amount = to_dec(amount)?;
        self.per_reserve(|denom| {
            self.function
                .return_for_burn(supply, amount, to_dec(reserves.amount_of(denom))?)
        })
    }

    /// Constant-product swap quote, fee taken from the input.
    ///
    /// # Errors
    /// - `FunctionNotAvailableForFunctionType` unless the bond is a swapper
    /// - `InvalidToken` if either denom is not a reserve, or they are equal
    /// - `SwapAmountTooSmallToGiveAnyReturn` if nothing is left after the
    ///   fee or the rounded output is zero
    pub fn returns_for_swap(&self, from: &Coin, to_denom: &str, reserves: &Coins) -> BondResult<SwapReturn> {
        self.check_swap_pair(&from.denom, to_denom)?;

        let gross_in = to_dec(from.amount)?;
        let fee = fees::fee_for(self.tx_fee_percentage, gross_in)?
            .ceil()
            .min(gross_in);
        let fee = to_amount(fee)?;
        let net_in = from.amount - fee;
        if net_in == 0 {
            return Err(BondError::SwapAmountTooSmallToGiveAnyReturn(from.to_string()));
        }

        let out = self.function.swap_return(
            to_dec(net_in)?,
            to_dec(reserves.amount_of(&from.denom))?,
            to_dec(reserves.amount_of(to_denom))?,
        )?;
        let returns = Coin::new(to_denom, to_amount(out.floor())?);
        if returns.is_zero() {
            return Err(BondError::SwapAmountTooSmallToGiveAnyReturn(from.to_string()));
        }
        let fee = Coin::new(from.denom.clone(), fee);
        let net_in = Coin::new(from.denom.clone(), net_in);
        Ok(SwapReturn { net_in, fee, returns })
    }

    /// Static validity of a swap pair, independent of reserve levels
    pub fn check_swap_pair(&self, from_denom: &str, to_denom: &str) -> BondResult<()> {
        if !self.function.is_swapper() {
            return Err(BondError::FunctionNotAvailableForFunctionType(
                self.function_type().to_string(),
            ));
        }
        if !self.is_reserve_token(from_denom) {
            return Err(BondError::InvalidToken(format!("{from_denom} is not a reserve token")));
        }
        if !self.is_reserve_token(to_denom) {
            return Err(BondError::InvalidToken(format!("{to_denom} is not a reserve token")));
        }
        if from_denom == to_denom {
            return Err(BondError::InvalidToken(format!("cannot swap {from_denom} for itself")));
        }
        Ok(())
    }

    /// Transaction fees on unrounded reserve amounts, rounded up
    pub fn tx_fees(&self, gross: &DecCoins) -> BondResult<Coins> {
        fees::fee_coins(self.tx_fee_percentage, gross)
    }

    /// Exit fees on unrounded reserve returns, rounded up
    pub fn exit_fees(&self, gross: &DecCoins) -> BondResult<Coins> {
        fees::fee_coins(self.exit_fee_percentage, gross)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::SanityParams;
    use crate::test_support::{addr, power_bond_msg, swapper_bond_msg};
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_bond_defaults() {
        let bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        assert_eq!(bond.current_supply, Coin::zero("abc"));
        assert_eq!(bond.reserve_address, reserve_address_for("abc"));
        assert_eq!(bond.function_type(), FunctionType::PowerFunction);
        assert_ne!(reserve_address_for("abc"), reserve_address_for("abd"));
    }

    #[test]
    fn test_signer_set_equality_ignores_order() {
        let mut msg = power_bond_msg("abc", &["res"]);
        msg.signers = vec![addr(1), addr(2)];
        let bond = Bond::new(msg).unwrap();

        assert!(bond.signers_equal_to(&[addr(2), addr(1)]));
        assert!(!bond.signers_equal_to(&[addr(1)]));
        assert!(!bond.signers_equal_to(&[addr(1), addr(2), addr(3)]));
    }

    #[test]
    fn test_apply_edit_only_touches_given_fields() {
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        let before = bond.clone();
        let edit = MsgEditBond {
            token: "abc".to_string(),
            name: Some("renamed".to_string()),
            description: None,
            order_quantity_limits: Some("10abc".parse().unwrap()),
            sanity: Some(SanityParams::disabled()),
            editor: addr(1),
            signers: before.signers.clone(),
        };
        bond.apply_edit(&edit);

        assert_eq!(bond.name, "renamed");
        assert_eq!(bond.description, before.description);
        assert_eq!(bond.order_quantity_limits.amount_of("abc"), 10);
        assert_eq!(bond.sanity_rate, Decimal::ZERO);
        assert_eq!(bond.function, before.function);
    }

    #[test]
    fn test_order_quantity_limits() {
        let mut msg = power_bond_msg("abc", &["res"]);
        msg.order_quantity_limits = "100abc".parse().unwrap();
        let bond = Bond::new(msg).unwrap();

        assert!(!bond.any_order_quantity_limits_exceeded(&Coins::single("abc", 100)));
        assert!(bond.any_order_quantity_limits_exceeded(&Coins::single("abc", 101)));
        // no limit configured for this denom
        assert!(!bond.any_order_quantity_limits_exceeded(&Coins::single("res", 1_000_000)));
    }

    #[test]
    fn test_prices_to_mint_per_reserve() {
        let bond = Bond::new(power_bond_msg("abc", &["res", "xyz"])).unwrap();
        let reserves: Coins = "5000res".parse().unwrap();
        let prices = bond.prices_to_mint(10, 10, &reserves).unwrap();
        // each reserve is priced against its own balance
        assert_eq!(prices.get("res"), dec!(29000));
        assert_eq!(prices.get("xyz"), dec!(34000));
    }

    #[test]
    fn test_prices_at_supply_lists_every_reserve() {
        let bond = Bond::new(power_bond_msg("abc", &["res", "xyz"])).unwrap();
        let prices = bond.prices_at_supply(10).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices.get("res"), dec!(1300));
    }

    #[test]
    fn test_swapper_current_prices_are_pool_shares() {
        let bond = Bond::new(swapper_bond_msg("swp", "aaa", "bbb")).unwrap();
        let reserves: Coins = "100aaa,400bbb".parse().unwrap();
        let prices = bond.current_prices(2, &reserves).unwrap();
        assert_eq!(prices.get("aaa"), dec!(50));
        assert_eq!(prices.get("bbb"), dec!(200));
    }

    #[test]
    fn test_returns_for_swap_nets_fee_from_input() {
        let mut msg = swapper_bond_msg("swp", "aaa", "bbb");
        msg.tx_fee_percentage = dec!(1);
        let bond = Bond::new(msg).unwrap();
        let reserves: Coins = "1000aaa,1000bbb".parse().unwrap();

        let quote = bond
            .returns_for_swap(&Coin::new("aaa", 101), "bbb", &reserves)
            .unwrap();
        // fee = ceil(1.01) = 2, net = 99, out = floor(99 * 1000 / 1099) = 90
        assert_eq!(quote.fee, Coin::new("aaa", 2));
        assert_eq!(quote.net_in, Coin::new("aaa", 99));
        assert_eq!(quote.returns, Coin::new("bbb", 90));
    }

    #[test]
    fn test_returns_for_swap_rejects_bad_pairs() {
        let bond = Bond::new(swapper_bond_msg("swp", "aaa", "bbb")).unwrap();
        let reserves: Coins = "1000aaa,1000bbb".parse().unwrap();

        assert!(matches!(
            bond.returns_for_swap(&Coin::new("aaa", 10), "aaa", &reserves),
            Err(BondError::InvalidToken(_))
        ));
        assert!(matches!(
            bond.returns_for_swap(&Coin::new("ccc", 10), "bbb", &reserves),
            Err(BondError::InvalidToken(_))
        ));
        assert!(matches!(
            bond.returns_for_swap(&Coin::new("aaa", 1), "bbb", &"1aaa,1bbb".parse().unwrap()),
            Err(BondError::SwapAmountTooSmallToGiveAnyReturn(_))
        ));

        let power = Bond::new(power_bond_msg("abc", &["aaa", "bbb"])).unwrap();
        assert!(matches!(
            power.returns_for_swap(&Coin::new("aaa", 10), "bbb", &reserves),
            Err(BondError::FunctionNotAvailableForFunctionType(_))
        ));
    }

    #[test]
    fn test_sanity_rate_uses_first_two_reserves() {
        let mut msg = swapper_bond_msg("swp", "aaa", "bbb");
        msg.sanity_rate = dec!(1);
        msg.sanity_margin_percentage = dec!(10);
        let bond = Bond::new(msg).unwrap();

        assert!(!bond.reserves_violate_sanity_rate(&"100aaa,100bbb".parse().unwrap()).unwrap());
        assert!(bond.reserves_violate_sanity_rate(&"200aaa,100bbb".parse().unwrap()).unwrap());
    }

    #[test]
    fn test_reserve_listing_is_zero_filled() {
        let bond = Bond::new(power_bond_msg("abc", &["res", "xyz"])).unwrap();
        let listing = bond.reserve_listing(&"7xyz".parse().unwrap());
        assert_eq!(listing, vec![Coin::new("res", 0), Coin::new("xyz", 7)]);
    }
}
