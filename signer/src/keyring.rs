//! Seed-held account keys behind opaque handles.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use zeroize::Zeroizing;

use troll_crypto::{derive_address, derive_keypair, sign_hash};
use troll_types::{AccountAddress, BlockHash, PublicKey, Signature};

use crate::SignerError;

/// Capability to sign for one account. Carries no key material.
///
/// Handles issued by the key ring are tied to the lock epoch they were issued
/// in; once the ring is locked they stop working, even after a later unlock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyHandle {
    index: u32,
    /// `None` for keys held by an external device.
    epoch: Option<u64>,
}

impl KeyHandle {
    pub(crate) fn device(index: u32) -> Self {
        Self { index, epoch: None }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_device(&self) -> bool {
        self.epoch.is_none()
    }
}

/// One wallet account as seen by code above the signing layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedAccount {
    pub index: u32,
    pub address: AccountAddress,
    pub public_key: PublicKey,
    pub handle: KeyHandle,
}

struct RingState {
    seed: Option<Zeroizing<[u8; 32]>>,
    epoch: u64,
}

/// Owner of the wallet seed.
pub struct KeyRing {
    state: RwLock<RingState>,
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::locked()
    }
}

impl KeyRing {
    /// A ring with no seed loaded.
    pub fn locked() -> Self {
        Self {
            state: RwLock::new(RingState { seed: None, epoch: 0 }),
        }
    }

    pub fn unlocked(seed: Zeroizing<[u8; 32]>) -> Self {
        let ring = Self::locked();
        ring.unlock(seed);
        ring
    }

    fn read(&self) -> RwLockReadGuard<'_, RingState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RingState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load the seed. Handles issued before the last `lock` stay invalid.
    pub fn unlock(&self, seed: Zeroizing<[u8; 32]>) {
        self.write().seed = Some(seed);
        tracing::info!("key ring unlocked");
    }

    /// Drop the seed from memory and invalidate all outstanding handles.
    pub fn lock(&self) {
        let mut state = self.write();
        state.seed = None;
        state.epoch += 1;
        tracing::info!(epoch = state.epoch, "key ring locked");
    }

    pub fn is_locked(&self) -> bool {
        self.read().seed.is_none()
    }

    /// Derive account `index` and issue a handle for it.
    pub fn derive_account(&self, index: u32) -> Result<DerivedAccount, SignerError> {
        let state = self.read();
        let seed = state.seed.as_ref().ok_or(SignerError::Locked)?;
        let public_key = derive_keypair(seed, index).public;
        Ok(DerivedAccount {
            index,
            address: derive_address(&public_key),
            public_key,
            handle: KeyHandle {
                index,
                epoch: Some(state.epoch),
            },
        })
    }

    /// Whether `handle` can sign right now.
    pub fn check(&self, handle: &KeyHandle) -> Result<(), SignerError> {
        Self::seed_for(&self.read(), handle).map(|_| ())
    }

    /// Sign a block hash with the key behind `handle`.
    pub fn sign(&self, handle: &KeyHandle, hash: &BlockHash) -> Result<Signature, SignerError> {
        let state = self.read();
        let seed = Self::seed_for(&state, handle)?;
        let keypair = derive_keypair(seed, handle.index);
        Ok(sign_hash(hash, &keypair.private))
    }

    fn seed_for<'s>(state: &'s RingState, handle: &KeyHandle) -> Result<&'s [u8; 32], SignerError> {
        match (handle.epoch, state.seed.as_ref()) {
            (None, _) => Err(SignerError::ForeignHandle),
            (Some(epoch), Some(seed)) if epoch == state.epoch => Ok(&**seed),
            (Some(_), _) => Err(SignerError::Locked),
        }
    }
}
