//! Ed25519 signing and verification of block hashes.

use troll_types::{BlockHash, PrivateKey, PublicKey, Signature};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

/// Sign a message with a private key, returning the signature.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    let sig = signing_key.sign(message);
    Signature(sig.to_bytes())
}

/// Verify a signature against a message and public key.
///
/// Returns `true` if the signature is valid, `false` otherwise.
/// Also rejects non-canonical signatures (malleability protection).
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Sign a block hash. Blocks are always signed over their 32-byte hash.
pub fn sign_hash(hash: &BlockHash, private_key: &PrivateKey) -> Signature {
    sign_message(hash.as_bytes(), private_key)
}

/// Verify a block signature against the owning account's key.
pub fn verify_hash(hash: &BlockHash, signature: &Signature, public_key: &PublicKey) -> bool {
    verify_signature(hash.as_bytes(), signature, public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_keypair;

    fn generate_keypair() -> troll_types::KeyPair {
        derive_keypair(&crate::generate_seed(), 0)
    }

    #[test]
    fn sign_and_verify() {
        let kp = generate_keypair();
        let msg = b"block hash bytes";
        let sig = sign_message(msg, &kp.private);
        assert!(verify_signature(msg, &sig, &kp.public));
    }

    #[test]
    fn wrong_message_fails() {
        let kp = generate_keypair();
        let sig = sign_message(b"correct message", &kp.private);
        assert!(!verify_signature(b"wrong message", &sig, &kp.public));
    }

    #[test]
    fn wrong_key_fails() {
        let kp1 = generate_keypair();
        let kp2 = generate_keypair();
        let msg = b"test";
        let sig = sign_message(msg, &kp1.private);
        assert!(!verify_signature(msg, &sig, &kp2.public));
    }

    #[test]
    fn signature_deterministic() {
        let kp = derive_keypair(&[99u8; 32], 7);
        let msg = b"deterministic test";
        let sig1 = sign_message(msg, &kp.private);
        let sig2 = sign_message(msg, &kp.private);
        assert_eq!(sig1.0, sig2.0);
    }

    #[test]
    fn empty_message() {
        let kp = generate_keypair();
        let sig = sign_message(b"", &kp.private);
        assert!(verify_signature(b"", &sig, &kp.public));
    }

    #[test]
    fn invalid_public_key() {
        let kp = generate_keypair();
        let sig = sign_message(b"test", &kp.private);
        let bad_key = PublicKey([0xFF; 32]);
        assert!(!verify_signature(b"test", &sig, &bad_key));
    }

    #[test]
    fn block_hash_signature_is_bound_to_hash() {
        let kp = generate_keypair();
        let hash = BlockHash::new([3u8; 32]);
        let sig = sign_hash(&hash, &kp.private);
        assert!(verify_hash(&hash, &sig, &kp.public));
        assert!(!verify_hash(&BlockHash::new([4u8; 32]), &sig, &kp.public));
    }
}
