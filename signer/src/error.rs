use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("wallet is locked")]
    Locked,

    #[error("signing device is not connected")]
    DeviceUnavailable,

    #[error("signing was rejected on the device")]
    Rejected,

    #[error("this environment cannot communicate with the signing device")]
    TransportIncompatible,

    #[error("device returned a signature that does not verify for the account")]
    InvalidSignature,

    #[error("key handle was issued by a different signing backend")]
    ForeignHandle,

    #[error("device error: {0}")]
    Device(String),
}
