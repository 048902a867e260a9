//! Signing delegated to an external device.
//!
//! The device holds the keys. Each signature waits on the user confirming on
//! the device, so there is no timeout here; callers that need to abort drop
//! the future.

use std::future::Future;

use troll_crypto::{derive_address, verify_hash};
use troll_ledger::Block;
use troll_types::{PublicKey, Signature};

use crate::{BlockSigner, DerivedAccount, KeyHandle, SignerError};

/// What is sent to the device: the unsigned block and which key to use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSignRequest {
    pub account_index: u32,
    pub block: Block,
}

/// Link to a signing device.
pub trait DeviceTransport: Send + Sync + 'static {
    /// Whether the host environment can talk to the device at all.
    fn environment_supported(&self) -> bool;

    fn public_key(&self, index: u32) -> impl Future<Output = Result<PublicKey, SignerError>> + Send;

    fn sign_block(
        &self,
        request: DeviceSignRequest,
    ) -> impl Future<Output = Result<Signature, SignerError>> + Send;
}

impl<T: DeviceTransport> DeviceTransport for std::sync::Arc<T> {
    fn environment_supported(&self) -> bool {
        (**self).environment_supported()
    }

    fn public_key(&self, index: u32) -> impl Future<Output = Result<PublicKey, SignerError>> + Send {
        (**self).public_key(index)
    }

    fn sign_block(
        &self,
        request: DeviceSignRequest,
    ) -> impl Future<Output = Result<Signature, SignerError>> + Send {
        (**self).sign_block(request)
    }
}

pub struct HardwareSigner<T> {
    transport: T,
}

impl<T: DeviceTransport> HardwareSigner<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn ensure_environment(&self) -> Result<(), SignerError> {
        if self.transport.environment_supported() {
            Ok(())
        } else {
            Err(SignerError::TransportIncompatible)
        }
    }
}

impl<T: DeviceTransport> BlockSigner for HardwareSigner<T> {
    async fn account(&self, index: u32) -> Result<DerivedAccount, SignerError> {
        self.ensure_environment()?;
        let public_key = self.transport.public_key(index).await?;
        Ok(DerivedAccount {
            index,
            address: derive_address(&public_key),
            public_key,
            handle: KeyHandle::device(index),
        })
    }

    fn check_ready(&self, account: &DerivedAccount) -> Result<(), SignerError> {
        self.ensure_environment()?;
        if !account.handle.is_device() {
            return Err(SignerError::ForeignHandle);
        }
        Ok(())
    }

    async fn sign(&self, account: &DerivedAccount, block: &Block) -> Result<Signature, SignerError> {
        self.check_ready(account)?;
        tracing::info!(account = %account.address, "waiting for confirmation on signing device");
        let signature = self
            .transport
            .sign_block(DeviceSignRequest {
                account_index: account.index,
                block: block.clone(),
            })
            .await?;
        if !verify_hash(&block.hash(), &signature, &account.public_key) {
            tracing::warn!(account = %account.address, "device signature failed verification");
            return Err(SignerError::InvalidSignature);
        }
        Ok(signature)
    }

    fn environment_supported(&self) -> bool {
        self.transport.environment_supported()
    }
}
