use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkError {
    #[error("work difficulty {actual:#018x} below minimum {minimum:#018x}")]
    InsufficientDifficulty { actual: u64, minimum: u64 },

    #[error("work generation cancelled")]
    Cancelled,

    #[error("work generation task failed: {0}")]
    Worker(String),

    #[error("invalid work value: {0}")]
    InvalidNonce(String),
}
