//! Signing with keys held in memory by the [`KeyRing`].

use std::sync::Arc;

use troll_ledger::Block;
use troll_types::Signature;

use crate::{BlockSigner, DerivedAccount, KeyRing, SignerError};

/// Signs synchronously with the key ring. Fails only when the ring is locked.
#[derive(Clone)]
pub struct LocalSigner {
    keyring: Arc<KeyRing>,
}

impl LocalSigner {
    pub fn new(keyring: Arc<KeyRing>) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }
}

impl BlockSigner for LocalSigner {
    async fn account(&self, index: u32) -> Result<DerivedAccount, SignerError> {
        self.keyring.derive_account(index)
    }

    fn check_ready(&self, account: &DerivedAccount) -> Result<(), SignerError> {
        self.keyring.check(&account.handle)
    }

    async fn sign(&self, account: &DerivedAccount, block: &Block) -> Result<Signature, SignerError> {
        self.keyring.sign(&account.handle, &block.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troll_ledger::{BlockBuilder, ChainHead};
    use troll_types::{BlockHash, RawAmount};
    use zeroize::Zeroizing;

    #[tokio::test]
    async fn signs_block_hash_for_account() {
        let signer = LocalSigner::new(Arc::new(KeyRing::unlocked(Zeroizing::new([1; 32]))));
        let account = signer.account(0).await.unwrap();
        let head = ChainHead {
            account: account.public_key,
            frontier: Some(BlockHash::new([2; 32])),
            balance: RawAmount::new(10),
            representative: account.public_key,
        };
        let block = BlockBuilder::new(&head).change(account.public_key).unwrap();
        let sig = signer.sign(&account, &block).await.unwrap();
        assert!(block.with_signature(sig).has_valid_signature());
    }

    #[tokio::test]
    async fn locked_ring_fails_readiness_check() {
        let ring = Arc::new(KeyRing::unlocked(Zeroizing::new([1; 32])));
        let signer = LocalSigner::new(ring.clone());
        let account = signer.account(0).await.unwrap();
        assert!(signer.check_ready(&account).is_ok());
        ring.lock();
        assert_eq!(signer.check_ready(&account), Err(SignerError::Locked));
    }
}
