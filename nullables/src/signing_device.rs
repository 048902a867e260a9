//! Nullable signing device. Signs with a fixed seed and can be scripted to fail.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use troll_crypto::{derive_keypair, sign_hash};
use troll_signer::{DeviceSignRequest, DeviceTransport, SignerError};
use troll_types::{PublicKey, Signature};

/// A test signing device.
///
/// Keys are derived from a seed given at construction, the way the real
/// device derives them from its own. Confirmation can be held back to model
/// a user who has not pressed the button yet.
pub struct NullSigningDevice {
    seed: [u8; 32],
    supported: AtomicBool,
    outcomes: Mutex<VecDeque<SignerError>>,
    requests: Mutex<Vec<DeviceSignRequest>>,
    held: watch::Sender<bool>,
}

impl NullSigningDevice {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            supported: AtomicBool::new(true),
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            held: watch::channel(false).0,
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pretend the host cannot reach the device at all.
    pub fn set_environment_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    /// The next signing request fails with `error`.
    pub fn fail_next(&self, error: SignerError) {
        Self::lock(&self.outcomes).push_back(error);
    }

    /// Keep signing requests waiting until [`confirm`](Self::confirm).
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn confirm(&self) {
        self.held.send_replace(false);
    }

    /// Every request the device received, in order.
    pub fn requests(&self) -> Vec<DeviceSignRequest> {
        Self::lock(&self.requests).clone()
    }
}

impl DeviceTransport for NullSigningDevice {
    fn environment_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    async fn public_key(&self, index: u32) -> Result<PublicKey, SignerError> {
        Ok(derive_keypair(&self.seed, index).public)
    }

    async fn sign_block(&self, request: DeviceSignRequest) -> Result<Signature, SignerError> {
        Self::lock(&self.requests).push(request.clone());
        let scripted = Self::lock(&self.outcomes).pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;
        let keypair = derive_keypair(&self.seed, request.account_index);
        Ok(sign_hash(&request.block.hash(), &keypair.private))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troll_ledger::{BlockBuilder, ChainHead};
    use troll_signer::{BlockSigner, HardwareSigner};
    use troll_types::{BlockHash, RawAmount};

    #[tokio::test]
    async fn signs_through_hardware_signer() {
        let signer = HardwareSigner::new(NullSigningDevice::new([6; 32]));
        let account = signer.account(2).await.unwrap();
        let head = ChainHead {
            account: account.public_key,
            frontier: Some(BlockHash::new([1; 32])),
            balance: RawAmount::new(9),
            representative: account.public_key,
        };
        let block = BlockBuilder::new(&head).change(PublicKey([8; 32])).unwrap();
        let sig = signer.sign(&account, &block).await.unwrap();
        assert!(block.clone().with_signature(sig).has_valid_signature());
        assert_eq!(signer.transport().requests()[0].account_index, 2);
    }

    #[tokio::test]
    async fn scripted_rejection() {
        let device = NullSigningDevice::new([6; 32]);
        device.fail_next(SignerError::Rejected);
        let request = DeviceSignRequest {
            account_index: 0,
            block: BlockBuilder::new(&ChainHead {
                account: PublicKey([1; 32]),
                frontier: Some(BlockHash::new([1; 32])),
                balance: RawAmount::ZERO,
                representative: PublicKey([1; 32]),
            })
            .change(PublicKey([2; 32]))
            .unwrap(),
        };
        assert_eq!(device.sign_block(request.clone()).await, Err(SignerError::Rejected));
        assert!(device.sign_block(request).await.is_ok());
    }
}
