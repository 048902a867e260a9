//! PoW validation.

use troll_crypto::blake2b_256_multi;
use troll_types::BlockHash;

/// The difficulty value a nonce achieves against `root`:
/// `Blake2b(root || nonce_le)` with its first 8 bytes read as a little-endian u64.
pub fn work_value(root: &BlockHash, nonce: u64) -> u64 {
    let hash = blake2b_256_multi(&[root.as_bytes(), &nonce.to_le_bytes()]);
    u64::from_le_bytes([
        hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
    ])
}

/// Validate that a work nonce meets the minimum difficulty for a given root.
pub fn validate_work(root: &BlockHash, nonce: u64, min_difficulty: u64) -> bool {
    work_value(root, nonce) >= min_difficulty
}
