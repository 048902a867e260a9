//! Deterministic Ed25519 account keys.
//!
//! Every account in a wallet is derived from the same 32-byte seed:
//! `private = Blake2b-256(seed || index as u32 big-endian)`.

use rand::rngs::OsRng;
use rand::RngCore;
use troll_types::{KeyPair, PrivateKey, PublicKey};
use ed25519_dalek::SigningKey;

use crate::blake2b_256_multi;

/// Generate a fresh 32-byte wallet seed from the OS random source.
pub fn generate_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Derive the key pair for account `index` of a wallet seed.
pub fn derive_keypair(seed: &[u8; 32], index: u32) -> KeyPair {
    let private = PrivateKey(blake2b_256_multi(&[seed, &index.to_be_bytes()]));
    keypair_from_private(private)
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = public_from_private(&private);
    KeyPair { public, private }
}
