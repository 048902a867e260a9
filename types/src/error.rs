//! Parse and arithmetic errors for the fundamental types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid block hash: {0}")]
    InvalidHash(String),

    #[error("invalid account address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{value} has more fractional digits than {denomination} can represent")]
    ExcessPrecision { value: String, denomination: String },

    #[error("amount overflows the raw range")]
    Overflow,

    #[error("unknown denomination: {0}")]
    UnknownDenomination(String),
}
