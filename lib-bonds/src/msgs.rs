//! Request Messages
//!
//! Typed requests the host hands to the keeper, with their stateless
//! `validate_basic` checks, plus parsers for the string forms clients submit
//! (`m:12,n:2,c:100`, `res,xyz`, `100abc,20def`, hex signer lists).
//!
//! Nothing in this module reads bond or ledger state.

use crate::curve::{BondingFunction, FunctionParams, FunctionType};
use crate::errors::{BondError, BondResult};
use crate::fees;
use lib_types::{is_valid_denom, Address, Coin, Coins};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

fn check_denom(denom: &str) -> BondResult<()> {
    if is_valid_denom(denom) {
        Ok(())
    } else {
        Err(BondError::InvalidDenom(denom.to_string()))
    }
}

fn check_non_negative(name: &str, value: Decimal) -> BondResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(BondError::ArgumentCannotBeNegative(name.to_string()));
    }
    Ok(())
}

fn check_positive_coin(field: &str, coin: &Coin) -> BondResult<()> {
    check_denom(&coin.denom)?;
    if coin.is_zero() {
        return Err(BondError::InvalidArgument(format!("{field} must be positive")));
    }
    Ok(())
}

fn check_signers(signers: &[Address]) -> BondResult<()> {
    if signers.is_empty() {
        return Err(BondError::MissingSigners);
    }
    let distinct: BTreeSet<&Address> = signers.iter().collect();
    if distinct.len() != signers.len() {
        return Err(BondError::InvalidArgument("duplicate signer".to_string()));
    }
    Ok(())
}

// ============================================================================
// CREATE / EDIT
// ============================================================================

/// Request to register a new bond
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateBond {
    pub token: String,
    pub name: String,
    pub description: String,
    pub creator: Address,
    pub function_type: FunctionType,
    pub function_parameters: FunctionParams,
    pub reserve_tokens: Vec<String>,
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
}

impl MsgCreateBond {
    /// Stateless creation checks. Existence and the staking denom are
    /// checked by the keeper.
    pub fn validate_basic(&self) -> BondResult<()> {
        check_denom(&self.token)?;
        if self.name.trim().is_empty() {
            return Err(BondError::InvalidArgument("name cannot be empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(BondError::InvalidArgument("description cannot be empty".to_string()));
        }

        BondingFunction::new(self.function_type, &self.function_parameters)?;

        self.function_type.check_reserve_count(self.reserve_tokens.len())?;
        let mut seen = BTreeSet::new();
        for denom in &self.reserve_tokens {
            check_denom(denom)?;
            if denom == &self.token {
                return Err(BondError::BondTokenCannotAlsoBeReserveToken(denom.clone()));
            }
            if !seen.insert(denom.as_str()) {
                return Err(BondError::DuplicateReserveToken(denom.clone()));
            }
        }

        fees::validate_fee_percentages(self.tx_fee_percentage, self.exit_fee_percentage)?;

        if self.max_supply.denom != self.token {
            return Err(BondError::MaxSupplyDenomMismatch {
                expected: self.token.clone(),
                got: self.max_supply.denom.clone(),
            });
        }

        check_non_negative("sanity_rate", self.sanity_rate)?;
        check_non_negative("sanity_margin_percentage", self.sanity_margin_percentage)?;

        check_signers(&self.signers)?;
        if self.batch_blocks == 0 {
            return Err(BondError::InvalidBatchBlocks);
        }
        Ok(())
    }
}

/// Sanity rate and margin, always edited together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityParams {
    pub rate: Decimal,
    pub margin_percentage: Decimal,
}

impl SanityParams {
    pub fn disabled() -> Self {
        Self {
            rate: Decimal::ZERO,
            margin_percentage: Decimal::ZERO,
        }
    }

    /// Parses a rate/margin pair. An empty rate disables the check and the
    /// margin is ignored.
    pub fn parse(rate: &str, margin_percentage: &str) -> BondResult<Self> {
        if rate.trim().is_empty() {
            return Ok(Self::disabled());
        }
        let rate = parse_decimal("sanity_rate", rate)?;
        let margin_percentage = parse_decimal("sanity_margin_percentage", margin_percentage)?;
        check_non_negative("sanity_rate", rate)?;
        check_non_negative("sanity_margin_percentage", margin_percentage)?;
        Ok(Self {
            rate,
            margin_percentage,
        })
    }
}

/// Request to change a bond's editable fields. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditBond {
    pub token: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub order_quantity_limits: Option<Coins>,
    pub sanity: Option<SanityParams>,
    pub editor: Address,
    pub signers: Vec<Address>,
}

impl MsgEditBond {
    pub fn validate_basic(&self) -> BondResult<()> {
        check_denom(&self.token)?;
        check_signers(&self.signers)?;
        if self.name.is_none()
            && self.description.is_none()
            && self.order_quantity_limits.is_none()
            && self.sanity.is_none()
        {
            return Err(BondError::InvalidArgument("no fields to edit".to_string()));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(BondError::InvalidArgument("name cannot be empty".to_string()));
            }
        }
        if let Some(description) = &self.description {
            if description.trim().is_empty() {
                return Err(BondError::InvalidArgument("description cannot be empty".to_string()));
            }
        }
        if let Some(sanity) = &self.sanity {
            check_non_negative("sanity_rate", sanity.rate)?;
            check_non_negative("sanity_margin_percentage", sanity.margin_percentage)?;
        }
        Ok(())
    }
}

// ============================================================================
// ORDERS
// ============================================================================

/// Buy `amount` bonded tokens, paying at most `max_prices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBuy {
    pub buyer: Address,
    /// Denom is the bond token
    pub amount: Coin,
    pub max_prices: Coins,
}

impl MsgBuy {
    pub fn validate_basic(&self) -> BondResult<()> {
        check_positive_coin("amount", &self.amount)?;
        if self.max_prices.is_empty() {
            return Err(BondError::InvalidArgument("max prices cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Sell `amount` bonded tokens back to the curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSell {
    pub seller: Address,
    pub amount: Coin,
}

impl MsgSell {
    pub fn validate_basic(&self) -> BondResult<()> {
        check_positive_coin("amount", &self.amount)
    }
}

/// Swap one reserve token for the other through a swapper bond
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSwap {
    pub swapper: Address,
    pub bond_token: String,
    pub from: Coin,
    pub to_token: String,
}

impl MsgSwap {
    pub fn validate_basic(&self) -> BondResult<()> {
        check_denom(&self.bond_token)?;
        check_positive_coin("from", &self.from)?;
        check_denom(&self.to_token)?;
        if self.from.denom == self.to_token {
            return Err(BondError::InvalidToken(format!(
                "cannot swap {} for itself",
                self.to_token
            )));
        }
        Ok(())
    }
}

// ============================================================================
// STRING PARSERS
// ============================================================================

/// Parses a named decimal argument.
pub fn parse_decimal(name: &str, value: &str) -> BondResult<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| BondError::ArgumentMissingOrNonDecimal(name.to_string()))
}

/// Parses `m:12,n:2,c:100`.
pub fn parse_function_parameters(value: &str) -> BondResult<FunctionParams> {
    value.parse()
}

/// Parses a comma-separated list of reserve denoms, keeping order.
pub fn parse_reserve_tokens(value: &str) -> BondResult<Vec<String>> {
    let mut tokens = Vec::new();
    for denom in value.split(',').map(str::trim) {
        check_denom(denom)?;
        tokens.push(denom.to_string());
    }
    Ok(tokens)
}

/// Parses a comma-separated list of hex addresses.
pub fn parse_signers(value: &str) -> BondResult<Vec<Address>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Address::from_str(s).map_err(|e| BondError::InvalidArgument(format!("signer '{s}': {e}")))
        })
        .collect()
}

pub fn parse_batch_blocks(value: &str) -> BondResult<u64> {
    let blocks = value
        .trim()
        .parse::<u64>()
        .map_err(|_| BondError::InvalidArgument(format!("batch blocks '{}'", value.trim())))?;
    if blocks == 0 {
        return Err(BondError::InvalidBatchBlocks);
    }
    Ok(blocks)
}

/// Builds a coin from separate amount and denom strings.
pub fn parse_two_part_coin(amount: &str, denom: &str) -> BondResult<Coin> {
    let denom = denom.trim();
    check_denom(denom)?;
    let amount = amount
        .trim()
        .parse()
        .map_err(|_| BondError::InvalidArgument(format!("amount '{}'", amount.trim())))?;
    Ok(Coin::new(denom, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{addr, power_bond_msg, swapper_bond_msg};
    use rust_decimal_macros::dec;

    #[test]
    fn test_valid_create_messages_pass() {
        power_bond_msg("abc", &["res"]).validate_basic().unwrap();
        swapper_bond_msg("swp", "aaa", "bbb").validate_basic().unwrap();
    }

    #[test]
    fn test_create_rejects_bad_reserves() {
        let msg = power_bond_msg("abc", &["res", "res"]);
        assert_eq!(
            msg.validate_basic(),
            Err(BondError::DuplicateReserveToken("res".to_string()))
        );

        let msg = power_bond_msg("abc", &["abc"]);
        assert_eq!(
            msg.validate_basic(),
            Err(BondError::BondTokenCannotAlsoBeReserveToken("abc".to_string()))
        );

        let mut msg = swapper_bond_msg("swp", "aaa", "bbb");
        msg.reserve_tokens.push("ccc".to_string());
        assert!(matches!(
            msg.validate_basic(),
            Err(BondError::IncorrectNumberOfReserveTokens { got: 3, .. })
        ));

        let msg = power_bond_msg("abc", &[]);
        assert!(matches!(
            msg.validate_basic(),
            Err(BondError::IncorrectNumberOfReserveTokens { got: 0, .. })
        ));
    }

    #[test]
    fn test_create_rejects_bad_fees_and_supply() {
        let mut msg = power_bond_msg("abc", &["res"]);
        msg.tx_fee_percentage = dec!(60);
        msg.exit_fee_percentage = dec!(40);
        assert_eq!(msg.validate_basic(), Err(BondError::FeesCannotBeOrExceed100Percent));

        let mut msg = power_bond_msg("abc", &["res"]);
        msg.max_supply = Coin::new("xyz", 10);
        assert!(matches!(
            msg.validate_basic(),
            Err(BondError::MaxSupplyDenomMismatch { .. })
        ));
    }

    #[test]
    fn test_create_rejects_bad_signers_and_blocks() {
        let mut msg = power_bond_msg("abc", &["res"]);
        msg.signers.clear();
        assert_eq!(msg.validate_basic(), Err(BondError::MissingSigners));

        let mut msg = power_bond_msg("abc", &["res"]);
        msg.signers = vec![addr(1), addr(1)];
        assert!(matches!(msg.validate_basic(), Err(BondError::InvalidArgument(_))));

        let mut msg = power_bond_msg("abc", &["res"]);
        msg.batch_blocks = 0;
        assert_eq!(msg.validate_basic(), Err(BondError::InvalidBatchBlocks));
    }

    #[test]
    fn test_create_rejects_wrong_parameter_set() {
        let mut msg = power_bond_msg("abc", &["res"]);
        msg.function_parameters = "m:12,n:2".parse().unwrap();
        assert_eq!(
            msg.validate_basic(),
            Err(BondError::ArgumentMissingOrNonDecimal("c".to_string()))
        );

        msg.function_parameters = "m:12,n:2,c:100,d:1".parse().unwrap();
        assert!(matches!(
            msg.validate_basic(),
            Err(BondError::InvalidFunctionParameters { .. })
        ));
    }

    #[test]
    fn test_edit_requires_some_field() {
        let edit = MsgEditBond {
            token: "abc".to_string(),
            name: None,
            description: None,
            order_quantity_limits: None,
            sanity: None,
            editor: addr(1),
            signers: vec![addr(1)],
        };
        assert!(matches!(edit.validate_basic(), Err(BondError::InvalidArgument(_))));

        let edit = MsgEditBond {
            description: Some("new".to_string()),
            ..edit
        };
        edit.validate_basic().unwrap();
    }

    #[test]
    fn test_order_messages() {
        let buy = MsgBuy {
            buyer: addr(2),
            amount: Coin::new("abc", 0),
            max_prices: "10res".parse().unwrap(),
        };
        assert!(matches!(buy.validate_basic(), Err(BondError::InvalidArgument(_))));

        let sell = MsgSell {
            seller: addr(2),
            amount: Coin::new("abc", 5),
        };
        sell.validate_basic().unwrap();

        let swap = MsgSwap {
            swapper: addr(2),
            bond_token: "swp".to_string(),
            from: Coin::new("aaa", 5),
            to_token: "aaa".to_string(),
        };
        assert!(matches!(swap.validate_basic(), Err(BondError::InvalidToken(_))));
    }

    #[test]
    fn test_sanity_params_parse() {
        assert_eq!(SanityParams::parse("", "junk").unwrap(), SanityParams::disabled());

        let parsed = SanityParams::parse("0.5", "10").unwrap();
        assert_eq!(parsed.rate, dec!(0.5));
        assert_eq!(parsed.margin_percentage, dec!(10));

        assert_eq!(
            SanityParams::parse("abc", "10"),
            Err(BondError::ArgumentMissingOrNonDecimal("sanity_rate".to_string()))
        );
        assert_eq!(
            SanityParams::parse("1", "-5"),
            Err(BondError::ArgumentCannotBeNegative("sanity_margin_percentage".to_string()))
        );
    }

    #[test]
    fn test_string_parsers() {
        assert_eq!(parse_reserve_tokens(" res , xyz").unwrap(), vec!["res", "xyz"]);
        assert!(parse_reserve_tokens("res,").is_err());

        let signers = parse_signers(&format!("{},{}", addr(1), addr(2))).unwrap();
        assert_eq!(signers, vec![addr(1), addr(2)]);
        assert!(parse_signers("zz").is_err());

        assert_eq!(parse_batch_blocks("3").unwrap(), 3);
        assert_eq!(parse_batch_blocks("0"), Err(BondError::InvalidBatchBlocks));

        assert_eq!(parse_two_part_coin("100", "abc").unwrap(), Coin::new("abc", 100));
        assert!(parse_two_part_coin("-1", "abc").is_err());

        let params = parse_function_parameters("m:12,n:2,c:100").unwrap();
        assert_eq!(params.get("m"), Some(dec!(12)));
    }
}
