//! Cryptographic primitives for the Trollar wallet engine.
//!
//! - **Ed25519** for block signing and signature verification
//! - **Blake2b** for hashing (block hashes, key derivation, address checksums)
//! - Deterministic account keys from a 32-byte wallet seed and an index
//! - Address encoding with the `troll_` prefix and base32 alphabet

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{decode_address, derive_address, parse_address, validate_address};
pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{derive_keypair, generate_seed, keypair_from_private, public_from_private};
pub use sign::{sign_hash, sign_message, verify_hash, verify_signature};
