//! Bonding Curve Functions
//!
//! Pure evaluation of the curve families a bond can be created with. All
//! arithmetic is checked `Decimal` arithmetic and nothing here rounds into
//! base units; rounding happens once, at the bond boundary.
//!
//! # Families
//! ```text
//!   power    price(x)   = m·x^n + c
//!            reserve(x) = m/(n+1)·x^(n+1) + c·x
//!
//!   sigmoid  price(x)   = a·((x−b)/√(c+(x−b)²) + 1)
//!            reserve(x) = a·(√(c+(x−b)²) + x) − a·√(c+b²)
//!
//!   swapper  constant product over exactly two reserves; prices are
//!            proportional shares of the pool, no closed-form curve
//! ```

use crate::errors::{BondError, BondResult};
use rust_decimal::prelude::{Decimal, MathematicalOps, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const POWER_FUNCTION: &str = "power_function";
pub const SIGMOID_FUNCTION: &str = "sigmoid_function";
pub const SWAPPER_FUNCTION: &str = "swapper_function";

/// Curve family tag, as submitted at bond creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    PowerFunction,
    SigmoidFunction,
    SwapperFunction,
}

impl FunctionType {
    pub fn name(&self) -> &'static str {
        match self {
            FunctionType::PowerFunction => POWER_FUNCTION,
            FunctionType::SigmoidFunction => SIGMOID_FUNCTION,
            FunctionType::SwapperFunction => SWAPPER_FUNCTION,
        }
    }

    /// Parameter names the family requires, and no others
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self {
            FunctionType::PowerFunction => &["m", "n", "c"],
            FunctionType::SigmoidFunction => &["a", "b", "c"],
            FunctionType::SwapperFunction => &[],
        }
    }

    /// Checks the reserve token count for this family.
    pub fn check_reserve_count(&self, count: usize) -> BondResult<()> {
        let ok = match self {
            FunctionType::SwapperFunction => count == 2,
            _ => count >= 1,
        };
        if ok {
            return Ok(());
        }
        let expected = match self {
            FunctionType::SwapperFunction => "exactly 2",
            _ => "at least 1",
        };
        Err(BondError::IncorrectNumberOfReserveTokens {
            function_type: self.name().to_string(),
            expected: expected.to_string(),
            got: count,
        })
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FunctionType {
    type Err = BondError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            POWER_FUNCTION => Ok(FunctionType::PowerFunction),
            SIGMOID_FUNCTION => Ok(FunctionType::SigmoidFunction),
            SWAPPER_FUNCTION => Ok(FunctionType::SwapperFunction),
            other => Err(BondError::UnrecognizedFunctionType(other.to_string())),
        }
    }
}

// ============================================================================
// FUNCTION PARAMETERS
// ============================================================================

/// Named decimal parameters, e.g. `m:12,n:2,c:100`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParams(BTreeMap<String, Decimal>);

impl FunctionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Decimal) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromStr for FunctionParams {
    type Err = BondError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut params = FunctionParams::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair
                .split_once(':')
                .ok_or_else(|| BondError::InvalidArgument(format!("function parameter '{pair}'")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(BondError::InvalidArgument(format!("function parameter '{pair}'")));
            }
            if params.get(name).is_some() {
                return Err(BondError::InvalidArgument(format!("duplicate function parameter '{name}'")));
            }
            let value = Decimal::from_str(value.trim())
                .map_err(|_| BondError::ArgumentMissingOrNonDecimal(name.to_string()))?;
            params.insert(name, value);
        }
        Ok(params)
    }
}

impl fmt::Display for FunctionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(name, value)| format!("{name}:{}", value.normalize()))
            .collect();
        f.write_str(&parts.join(","))
    }
}

// ============================================================================
// CHECKED DECIMAL HELPERS
// ============================================================================

fn add(a: Decimal, b: Decimal) -> BondResult<Decimal> {
    a.checked_add(b).ok_or(BondError::Overflow)
}

fn sub(a: Decimal, b: Decimal) -> BondResult<Decimal> {
    a.checked_sub(b).ok_or(BondError::Overflow)
}

fn mul(a: Decimal, b: Decimal) -> BondResult<Decimal> {
    a.checked_mul(b).ok_or(BondError::Overflow)
}

fn div(a: Decimal, b: Decimal) -> BondResult<Decimal> {
    a.checked_div(b).ok_or(BondError::Overflow)
}

fn sqrt(value: Decimal) -> BondResult<Decimal> {
    value.sqrt().ok_or(BondError::Overflow)
}

/// `base^exp` for non-negative operands. Integral exponents use exact
/// repeated multiplication; fractional ones go through `powd`.
fn pow(base: Decimal, exp: Decimal) -> BondResult<Decimal> {
    if exp.is_zero() {
        return Ok(Decimal::ONE);
    }
    if base.is_zero() {
        return Ok(Decimal::ZERO);
    }
    if exp.fract().is_zero() {
        let e = exp.to_u64().ok_or(BondError::Overflow)?;
        base.checked_powu(e).ok_or(BondError::Overflow)
    } else {
        base.checked_powd(exp).ok_or(BondError::Overflow)
    }
}

// ============================================================================
// BONDING FUNCTION
// ============================================================================

/// A bond's pricing curve, one variant per family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondingFunction {
    /// Augmented bonding curve `m·x^n + c`
    Power { m: Decimal, n: Decimal, c: Decimal },
    /// Sigmoid centred on supply `b`, saturating at `2a`
    Sigmoid { a: Decimal, b: Decimal, c: Decimal },
    /// Constant-product pool over two reserves
    Swapper,
}

impl BondingFunction {
    /// Builds a function from its tag and parameters.
    ///
    /// The parameter set must match the family exactly and every value must
    /// be non-negative; sigmoid additionally requires `c > 0`.
    pub fn new(function_type: FunctionType, params: &FunctionParams) -> BondResult<Self> {
        let required = function_type.required_parameters();
        if let Some((extra, _)) = params.iter().find(|(name, _)| !required.contains(name)) {
            return Err(BondError::InvalidFunctionParameters {
                function_type: function_type.to_string(),
                reason: format!("unexpected parameter '{extra}'"),
            });
        }

        let mut values = Vec::with_capacity(required.len());
        for name in required {
            let value = params
                .get(name)
                .ok_or_else(|| BondError::ArgumentMissingOrNonDecimal(name.to_string()))?;
            if value.is_sign_negative() && !value.is_zero() {
                return Err(BondError::ArgumentCannotBeNegative(name.to_string()));
            }
            values.push(value);
        }

        match function_type {
            FunctionType::PowerFunction => Ok(BondingFunction::Power {
                m: values[0],
                n: values[1],
                c: values[2],
            }),
            FunctionType::SigmoidFunction => {
                if values[2].is_zero() {
                    return Err(BondError::InvalidFunctionParameters {
                        function_type: function_type.to_string(),
                        reason: "c must be positive".to_string(),
                    });
                }
                Ok(BondingFunction::Sigmoid {
                    a: values[0],
                    b: values[1],
                    c: values[2],
                })
            }
            FunctionType::SwapperFunction => Ok(BondingFunction::Swapper),
        }
    }

    pub fn function_type(&self) -> FunctionType {
        match self {
            BondingFunction::Power { .. } => FunctionType::PowerFunction,
            BondingFunction::Sigmoid { .. } => FunctionType::SigmoidFunction,
            BondingFunction::Swapper => FunctionType::SwapperFunction,
        }
    }

    pub fn parameters(&self) -> FunctionParams {
        let mut params = FunctionParams::new();
        match *self {
            BondingFunction::Power { m, n, c } => {
                params.insert("m", m);
                params.insert("n", n);
                params.insert("c", c);
            }
            BondingFunction::Sigmoid { a, b, c } => {
                params.insert("a", a);
                params.insert("b", b);
                params.insert("c", c);
            }
            BondingFunction::Swapper => {}
        }
        params
    }

    pub fn is_swapper(&self) -> bool {
        matches!(self, BondingFunction::Swapper)
    }

    fn not_available(&self) -> BondError {
        BondError::FunctionNotAvailableForFunctionType(self.function_type().to_string())
    }

    /// Marginal reserve price of one bonded token at `supply`
    pub fn price_at_supply(&self, supply: Decimal) -> BondResult<Decimal> {
        match *self {
            BondingFunction::Power { m, n, c } => add(mul(m, pow(supply, n)?)?, c),
            BondingFunction::Sigmoid { a, b, c } => {
                let d = sub(supply, b)?;
                let root = sqrt(add(c, mul(d, d)?)?)?;
                mul(a, add(div(d, root)?, Decimal::ONE)?)
            }
            BondingFunction::Swapper => Err(self.not_available()),
        }
    }

    /// Reserve backing `supply` tokens: the price integral from zero
    pub fn reserve_at_supply(&self, supply: Decimal) -> BondResult<Decimal> {
        match *self {
            BondingFunction::Power { m, n, c } => {
                let n1 = add(n, Decimal::ONE)?;
                let curve = mul(div(m, n1)?, pow(supply, n1)?)?;
                add(curve, mul(c, supply)?)
            }
            BondingFunction::Sigmoid { a, b, c } => {
                let d = sub(supply, b)?;
                let upper = add(sqrt(add(c, mul(d, d)?)?)?, supply)?;
                let lower = sqrt(add(c, mul(b, b)?)?)?;
                sub(mul(a, upper)?, mul(a, lower)?)
            }
            BondingFunction::Swapper => Err(self.not_available()),
        }
    }

    /// Reserve cost, in one reserve denom, of minting `amount` at `supply`
    /// when that reserve currently holds `reserve`.
    ///
    /// Curve families price against the actual reserve level, so a reserve
    /// that already exceeds the integral yields a zero (never negative) cost.
    pub fn cost_to_mint(&self, supply: Decimal, amount: Decimal, reserve: Decimal) -> BondResult<Decimal> {
        match self {
            BondingFunction::Swapper => {
                if supply.is_zero() {
                    return Err(self.not_available());
                }
                div(mul(reserve, amount)?, supply)
            }
            _ => {
                let target = self.reserve_at_supply(add(supply, amount)?)?;
                Ok(sub(target, reserve)?.max(Decimal::ZERO))
            }
        }
    }

    /// Reserve returned, in one reserve denom, for burning `amount` at
    /// `supply`. Never negative and never more than `reserve`.
    pub fn return_for_burn(&self, supply: Decimal, amount: Decimal, reserve: Decimal) -> BondResult<Decimal> {
        if amount > supply {
            return Err(BondError::CannotBurnMoreThanSupply {
                supply: supply.to_string(),
                amount: amount.to_string(),
            });
        }
        match self {
            BondingFunction::Swapper => {
                if supply.is_zero() {
                    return Err(self.not_available());
                }
                div(mul(reserve, amount)?, supply)
            }
            _ => {
                let remaining = self.reserve_at_supply(sub(supply, amount)?)?;
                Ok(sub(reserve, remaining)?.max(Decimal::ZERO).min(reserve))
            }
        }
    }

    /// Constant-product output for `amount_in` against the two pool sides
    pub fn swap_return(&self, amount_in: Decimal, reserve_in: Decimal, reserve_out: Decimal) -> BondResult<Decimal> {
        if !self.is_swapper() {
            return Err(self.not_available());
        }
        let pool_in = add(reserve_in, amount_in)?;
        if pool_in.is_zero() {
            return Ok(Decimal::ZERO);
        }
        div(mul(amount_in, reserve_out)?, pool_in)
    }
}
