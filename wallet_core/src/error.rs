use thiserror::Error;

use troll_ledger::BuildError;
use troll_node_client::{NodeError, RejectReason};
use troll_signer::SignerError;
use troll_types::{AccountAddress, RawAmount, TypesError};
use troll_work::WorkError;

/// Every way a wallet operation can fail. None of them is fatal to the
/// process; the caller may always retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient balance: have {balance} raw, need {amount} raw")]
    InsufficientBalance { balance: RawAmount, amount: RawAmount },

    #[error("amount {amount} raw is below the minimum of {minimum} raw")]
    DustAmountRejected { amount: RawAmount, minimum: RawAmount },

    #[error("wallet is locked")]
    WalletLocked,

    #[error("a transaction for {0} is already in progress")]
    TransactionInProgress(AccountAddress),

    #[error("account frontier changed while the transaction was being built")]
    StaleFrontierConflict,

    #[error("node unreachable: {0}")]
    NodeUnreachable(String),

    #[error("rejected by node: {message}")]
    RejectedByNode { reason: RejectReason, message: String },

    #[error("signing device is not connected")]
    SigningDeviceUnavailable,

    #[error("signing was rejected on the device")]
    SigningRejectedByUser,

    #[error("this environment cannot communicate with the signing device")]
    SigningTransportIncompatible,

    #[error("work computation was cancelled")]
    WorkComputationCancelled,

    #[error("transaction aborted")]
    Aborted,

    #[error("account {0} is not part of this wallet")]
    UnknownAccount(AccountAddress),

    #[error("account {0} has not been opened yet")]
    AccountNotOpened(AccountAddress),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("work error: {0}")]
    Work(String),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl WalletError {
    /// Whether retrying the whole operation later can succeed without the
    /// caller changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NodeUnreachable(_)
                | Self::TransactionInProgress(_)
                | Self::StaleFrontierConflict
                | Self::SigningDeviceUnavailable
        )
    }
}

impl From<SignerError> for WalletError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Locked => Self::WalletLocked,
            SignerError::DeviceUnavailable => Self::SigningDeviceUnavailable,
            SignerError::Rejected => Self::SigningRejectedByUser,
            SignerError::TransportIncompatible => Self::SigningTransportIncompatible,
            other => Self::Signing(other.to_string()),
        }
    }
}

impl From<NodeError> for WalletError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Unreachable(msg) => Self::NodeUnreachable(msg),
            NodeError::Rejected {
                reason: RejectReason::StalePrevious,
                ..
            } => Self::StaleFrontierConflict,
            NodeError::Rejected { reason, message } => Self::RejectedByNode { reason, message },
            NodeError::InvalidResponse(msg) => Self::NodeUnreachable(format!("bad response: {msg}")),
        }
    }
}

impl From<WorkError> for WalletError {
    fn from(e: WorkError) -> Self {
        match e {
            WorkError::Cancelled => Self::WorkComputationCancelled,
            other => Self::Work(other.to_string()),
        }
    }
}

impl From<BuildError> for WalletError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::InsufficientBalance { balance, amount } => {
                Self::InsufficientBalance { balance, amount }
            }
            BuildError::ZeroAmount => Self::InvalidAmount("amount must be greater than zero".into()),
            other => Self::InvalidAmount(other.to_string()),
        }
    }
}

impl From<TypesError> for WalletError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::InvalidAddress(addr) => Self::InvalidAddress(addr),
            other => Self::InvalidAmount(other.to_string()),
        }
    }
}

impl From<std::io::Error> for WalletError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_rejections_map_to_taxonomy() {
        assert_eq!(
            WalletError::from(NodeError::rejected("Fork")),
            WalletError::StaleFrontierConflict
        );
        assert!(matches!(
            WalletError::from(NodeError::rejected("Bad signature")),
            WalletError::RejectedByNode {
                reason: RejectReason::BadSignature,
                ..
            }
        ));
        assert!(matches!(
            WalletError::from(NodeError::Unreachable("timeout".into())),
            WalletError::NodeUnreachable(_)
        ));
    }

    #[test]
    fn signer_errors_map_to_taxonomy() {
        assert_eq!(WalletError::from(SignerError::Locked), WalletError::WalletLocked);
        assert_eq!(
            WalletError::from(SignerError::TransportIncompatible),
            WalletError::SigningTransportIncompatible
        );
    }

    #[test]
    fn retryability() {
        assert!(WalletError::NodeUnreachable("x".into()).is_retryable());
        assert!(WalletError::StaleFrontierConflict.is_retryable());
        assert!(!WalletError::WalletLocked.is_retryable());
        assert!(!WalletError::WorkComputationCancelled.is_retryable());
        assert!(!WalletError::from(NodeError::rejected("Bad signature")).is_retryable());
    }
}
