//! Bonds Engine Errors

use crate::ledger::LedgerError;
use crate::storage::StorageError;
use lib_types::CoinsError;
use thiserror::Error;

/// Broad class of a [`BondError`], used by hosts to decide how to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Well-formed request refused by an economic rule
    Economic,
    /// Signer set does not match
    Authorization,
    /// Ledger or store desynchronization; fatal for the bond this block
    Invariant,
}

/// Error during bond operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BondError {
    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Argument missing or not a decimal: {0}")]
    ArgumentMissingOrNonDecimal(String),

    #[error("Argument cannot be negative: {0}")]
    ArgumentCannotBeNegative(String),

    #[error("Invalid denomination: {0}")]
    InvalidDenom(String),

    #[error("Unrecognized function type: {0}")]
    UnrecognizedFunctionType(String),

    #[error("Invalid parameters for {function_type}: {reason}")]
    InvalidFunctionParameters { function_type: String, reason: String },

    #[error("{function_type} requires {expected} reserve token(s), got {got}")]
    IncorrectNumberOfReserveTokens {
        function_type: String,
        expected: String,
        got: usize,
    },

    #[error("Duplicate reserve token: {0}")]
    DuplicateReserveToken(String),

    #[error("Bond token {0} cannot also be a reserve token")]
    BondTokenCannotAlsoBeReserveToken(String),

    #[error("Fee percentages must each be below 100 and sum to less than 100")]
    FeesCannotBeOrExceed100Percent,

    #[error("Max supply denom {got} does not match bond token {expected}")]
    MaxSupplyDenomMismatch { expected: String, got: String },

    #[error("Bond token cannot be the staking token {0}")]
    BondTokenCannotBeStakingToken(String),

    #[error("Batch blocks must be at least 1")]
    InvalidBatchBlocks,

    #[error("At least one signer is required")]
    MissingSigners,

    #[error("Fee address cannot be a module account: {0}")]
    FeeAddressIsModuleAccount(String),

    #[error("Bond {0} already exists")]
    BondAlreadyExists(String),

    #[error("Bond {0} does not exist")]
    BondDoesNotExist(String),

    #[error("No batch found for bond {0}")]
    BatchDoesNotExist(String),

    #[error("Reserve denoms mismatch: got [{got}], expected [{expected}]")]
    ReserveDenomsMismatch { got: String, expected: String },

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Function not available for function type {0}")]
    FunctionNotAvailableForFunctionType(String),

    #[error(transparent)]
    Coins(#[from] CoinsError),

    // ------------------------------------------------------------------
    // Economic rules
    // ------------------------------------------------------------------
    #[error("Order quantity limit exceeded")]
    OrderQuantityLimitExceeded,

    #[error("Cannot mint more than max supply {max}: would reach {would_have}")]
    CannotMintMoreThanMaxSupply { max: String, would_have: String },

    #[error("Cannot burn more than supply: supply {supply}, burning {amount}")]
    CannotBurnMoreThanSupply { supply: String, amount: String },

    #[error("Bond does not allow selling")]
    SellingDisabled,

    #[error("Values violate sanity rate")]
    ValuesViolateSanityRate,

    #[error("Max prices exceeded: total {total}, max {max}")]
    MaxPricesExceeded { total: String, max: String },

    #[error("Swap amount too small to give any return: {0}")]
    SwapAmountTooSmallToGiveAnyReturn(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Batch for bond {token} is halted: {reason}")]
    BatchHalted { token: String, reason: String },

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------
    #[error("List of signers does not match the one in the bond")]
    SignersMismatch,

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------
    #[error("Invariant violated for bond {token}: {reason}")]
    InvariantViolation { token: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl BondError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BondError::OrderQuantityLimitExceeded
            | BondError::CannotMintMoreThanMaxSupply { .. }
            | BondError::CannotBurnMoreThanSupply { .. }
            | BondError::SellingDisabled
            | BondError::ValuesViolateSanityRate
            | BondError::MaxPricesExceeded { .. }
            | BondError::SwapAmountTooSmallToGiveAnyReturn(_)
            | BondError::InsufficientFunds(_)
            | BondError::Overflow
            | BondError::BatchHalted { .. } => ErrorKind::Economic,
            BondError::SignersMismatch => ErrorKind::Authorization,
            BondError::InvariantViolation { .. } | BondError::Storage(_) => ErrorKind::Invariant,
            _ => ErrorKind::Validation,
        }
    }

    /// True for errors that must abort block processing for the bond.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Invariant
    }

    pub fn invariant(token: &str, reason: impl Into<String>) -> Self {
        BondError::InvariantViolation {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for BondError {
    fn from(e: StorageError) -> Self {
        BondError::Storage(e.to_string())
    }
}

/// Ledger failures at admission time are rejections of the request.
/// Settlement maps them to [`BondError::InvariantViolation`] explicitly.
impl From<LedgerError> for BondError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { .. } => BondError::InsufficientFunds(e.to_string()),
            LedgerError::Overflow(_) => BondError::Overflow,
        }
    }
}

/// Result type for bond operations
pub type BondResult<T> = Result<T, BondError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::Address;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BondError::SellingDisabled.kind(), ErrorKind::Economic);
        assert_eq!(BondError::SignersMismatch.kind(), ErrorKind::Authorization);
        assert_eq!(BondError::FeesCannotBeOrExceed100Percent.kind(), ErrorKind::Validation);
        assert!(BondError::invariant("abc", "refund failed").is_fatal());
        assert!(!BondError::OrderQuantityLimitExceeded.is_fatal());
        assert_eq!(
            BondError::FeeAddressIsModuleAccount("reserve".to_string()).kind(),
            ErrorKind::Validation
        );
        let halted = BondError::BatchHalted {
            token: "abc".to_string(),
            reason: "reserve drift".to_string(),
        };
        assert_eq!(halted.kind(), ErrorKind::Economic);
        assert!(!halted.is_fatal());
    }

    #[test]
    fn test_ledger_error_maps_to_rejection() {
        let err: BondError = LedgerError::InsufficientFunds {
            account: Address::zero(),
            denom: "abc".to_string(),
            have: 1,
            need: 2,
        }
        .into();
        assert!(matches!(err, BondError::InsufficientFunds(_)));
        assert_eq!(err.kind(), ErrorKind::Economic);
    }
}
