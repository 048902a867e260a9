use thiserror::Error;

/// Why the node refused a request, classified from its error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The block's previous hash is not the account's frontier any more.
    StalePrevious,
    BadSignature,
    InsufficientBalance,
    InsufficientWork,
    AccountNotFound,
    InvalidAccount,
    Other,
}

impl RejectReason {
    /// Map the node's error text onto a reason.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("fork") || lower.contains("gap previous") {
            Self::StalePrevious
        } else if lower.contains("bad signature") {
            Self::BadSignature
        } else if lower.contains("negative spend") || lower.contains("insufficient balance") {
            Self::InsufficientBalance
        } else if lower.contains("work") {
            Self::InsufficientWork
        } else if lower.contains("account not found") {
            Self::AccountNotFound
        } else if lower.contains("bad account number") || lower.contains("invalid account") {
            Self::InvalidAccount
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The node could not be reached or did not answer in time.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The node answered and refused the request.
    #[error("rejected by node: {message}")]
    Rejected { reason: RejectReason, message: String },

    /// The node answered with something we could not parse.
    #[error("invalid node response: {0}")]
    InvalidResponse(String),
}

impl NodeError {
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Rejected {
            reason: RejectReason::classify(&message),
            message,
        }
    }

    pub fn is_stale_previous(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                reason: RejectReason::StalePrevious,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_node_messages() {
        assert_eq!(RejectReason::classify("Fork"), RejectReason::StalePrevious);
        assert_eq!(RejectReason::classify("Gap previous block"), RejectReason::StalePrevious);
        assert_eq!(RejectReason::classify("Bad signature"), RejectReason::BadSignature);
        assert_eq!(RejectReason::classify("Negative spend"), RejectReason::InsufficientBalance);
        assert_eq!(
            RejectReason::classify("Block work is less than threshold"),
            RejectReason::InsufficientWork
        );
        assert_eq!(RejectReason::classify("Account not found"), RejectReason::AccountNotFound);
        assert_eq!(RejectReason::classify("Something else"), RejectReason::Other);
    }

    #[test]
    fn stale_previous_is_detectable() {
        assert!(NodeError::rejected("Fork").is_stale_previous());
        assert!(!NodeError::rejected("Bad signature").is_stale_previous());
        assert!(!NodeError::Unreachable("timeout".into()).is_stale_previous());
    }
}
