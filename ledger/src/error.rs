use thiserror::Error;
use troll_types::RawAmount;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("insufficient balance: have {balance} raw, need {amount} raw")]
    InsufficientBalance { balance: RawAmount, amount: RawAmount },

    #[error("account is not opened yet; only a receive can be its first block")]
    Unopened,

    #[error("resulting balance overflows")]
    BalanceOverflow,

    #[error("amount must be greater than zero")]
    ZeroAmount,
}
