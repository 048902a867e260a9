//! Key material and block signing.
//!
//! The [`KeyRing`] owns the wallet seed and hands out opaque [`KeyHandle`]s;
//! private keys never leave this crate. Locking the ring invalidates every
//! handle issued so far.
//!
//! Signing goes through the [`BlockSigner`] capability, implemented by
//! [`LocalSigner`] (keys held by the key ring) and [`HardwareSigner`] (keys
//! held by an external device reached through a [`DeviceTransport`]).
//! [`ConfiguredSigner`] selects one of the two when the wallet is configured.

pub mod error;
pub mod hardware;
pub mod keyring;
pub mod local;

use std::future::Future;

use troll_ledger::Block;
use troll_types::Signature;

pub use error::SignerError;
pub use hardware::{DeviceSignRequest, DeviceTransport, HardwareSigner};
pub use keyring::{DerivedAccount, KeyHandle, KeyRing};
pub use local::LocalSigner;

/// A backend able to produce account keys and sign blocks for them.
///
/// Both backends return the same Ed25519 signature format; callers do not
/// need to know which one is in use.
pub trait BlockSigner: Send + Sync {
    /// The account at derivation `index`.
    fn account(&self, index: u32) -> impl Future<Output = Result<DerivedAccount, SignerError>> + Send;

    /// Fail fast, before any network traffic, if signing for `account`
    /// cannot succeed right now.
    fn check_ready(&self, account: &DerivedAccount) -> Result<(), SignerError>;

    /// Sign `block` (which must belong to `account`).
    fn sign(
        &self,
        account: &DerivedAccount,
        block: &Block,
    ) -> impl Future<Output = Result<Signature, SignerError>> + Send;

    /// Whether the host environment can reach this backend at all.
    fn environment_supported(&self) -> bool {
        true
    }
}

/// The signing backend chosen in the wallet configuration.
pub enum ConfiguredSigner<T> {
    Local(LocalSigner),
    Hardware(HardwareSigner<T>),
}

impl<T: DeviceTransport> BlockSigner for ConfiguredSigner<T> {
    async fn account(&self, index: u32) -> Result<DerivedAccount, SignerError> {
        match self {
            Self::Local(signer) => signer.account(index).await,
            Self::Hardware(signer) => signer.account(index).await,
        }
    }

    fn check_ready(&self, account: &DerivedAccount) -> Result<(), SignerError> {
        match self {
            Self::Local(signer) => signer.check_ready(account),
            Self::Hardware(signer) => signer.check_ready(account),
        }
    }

    async fn sign(&self, account: &DerivedAccount, block: &Block) -> Result<Signature, SignerError> {
        match self {
            Self::Local(signer) => signer.sign(account, block).await,
            Self::Hardware(signer) => signer.sign(account, block).await,
        }
    }

    fn environment_supported(&self) -> bool {
        match self {
            Self::Local(signer) => signer.environment_supported(),
            Self::Hardware(signer) => signer.environment_supported(),
        }
    }
}
