//! Argon2id encrypted keystore for the wallet seed.
//!
//! Encrypts the 32-byte seed with a user-chosen password:
//! 1. Argon2id derives a 32-byte encryption key from the password + random salt
//! 2. AES-256-GCM encrypts the seed with a random nonce
//! 3. The result is kept in the persisted state with all parameters needed
//!    to decrypt it again

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::WalletError;

const KEYSTORE_VERSION: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

/// Salt length in bytes.
const SALT_LEN: usize = 32;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;

/// The encrypted seed and everything needed to decrypt it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSeed {
    pub version: u32,
    pub crypto: KeystoreCrypto,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
}

/// KDF parameters for Argon2id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 64 MB memory, 3 iterations, 1 lane.
    fn default() -> Self {
        Self {
            memory: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Encrypt a seed with a password using Argon2id + AES-256-GCM.
pub fn encrypt_seed(
    seed: &[u8; 32],
    password: &str,
    params: KdfParams,
) -> Result<EncryptedSeed, WalletError> {
    let mut rng = rand::thread_rng();

    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let derived_key = derive_key(password, &salt, params)?;

    let cipher = Aes256Gcm::new_from_slice(derived_key.as_ref())
        .map_err(|e| WalletError::Keystore(format!("AES key init failed: {}", e)))?;

    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, seed.as_ref())
        .map_err(|e| WalletError::Keystore(format!("encryption failed: {}", e)))?;

    Ok(EncryptedSeed {
        version: KEYSTORE_VERSION,
        crypto: KeystoreCrypto {
            cipher: "aes-256-gcm".to_string(),
            kdf: "argon2id".to_string(),
            kdf_params: params,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        },
    })
}

/// Decrypt the seed with the given password.
///
/// A wrong password and tampered ciphertext fail the same way.
pub fn decrypt_seed(
    keystore: &EncryptedSeed,
    password: &str,
) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    if keystore.version != KEYSTORE_VERSION {
        return Err(WalletError::Keystore(format!(
            "unsupported keystore version: {}",
            keystore.version
        )));
    }

    let salt = hex::decode(&keystore.crypto.salt)
        .map_err(|e| WalletError::Keystore(format!("invalid salt hex: {}", e)))?;
    let nonce_bytes = hex::decode(&keystore.crypto.nonce)
        .map_err(|e| WalletError::Keystore(format!("invalid nonce hex: {}", e)))?;
    let ciphertext = hex::decode(&keystore.crypto.ciphertext)
        .map_err(|e| WalletError::Keystore(format!("invalid ciphertext hex: {}", e)))?;

    if nonce_bytes.len() != NONCE_LEN {
        return Err(WalletError::Keystore(format!(
            "invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let derived_key = derive_key(password, &salt, keystore.crypto.kdf_params)?;

    let cipher = Aes256Gcm::new_from_slice(derived_key.as_ref())
        .map_err(|e| WalletError::Keystore(format!("AES key init failed: {}", e)))?;

    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = Zeroizing::new(cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
        WalletError::Keystore("decryption failed: wrong password or corrupted data".to_string())
    })?);

    if plaintext.len() != 32 {
        return Err(WalletError::Keystore(format!(
            "decrypted seed has wrong length: expected 32, got {}",
            plaintext.len()
        )));
    }

    let mut seed = Zeroizing::new([0u8; 32]);
    seed.copy_from_slice(&plaintext);
    Ok(seed)
}

fn derive_key(
    password: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let params = Params::new(
        params.memory,
        params.iterations,
        params.parallelism,
        Some(ARGON2_OUTPUT_LEN),
    )
    .map_err(|e| WalletError::Keystore(format!("Argon2 params error: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, output.as_mut())
        .map_err(|e| WalletError::Keystore(format!("Argon2 hashing failed: {}", e)))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: KdfParams = KdfParams {
        memory: 1024,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let seed = [42u8; 32];
        let keystore = encrypt_seed(&seed, "test-password-123", FAST).unwrap();
        let decrypted = decrypt_seed(&keystore, "test-password-123").unwrap();
        assert_eq!(*decrypted, seed);
    }

    #[test]
    fn wrong_password_fails() {
        let keystore = encrypt_seed(&[42u8; 32], "correct-password", FAST).unwrap();
        let result = decrypt_seed(&keystore, "wrong-password");
        assert!(matches!(result, Err(WalletError::Keystore(_))));
    }

    #[test]
    fn default_params_are_recorded() {
        let params = KdfParams::default();
        assert_eq!(params.memory, 65536);
        assert_eq!(params.iterations, 3);
        let keystore = encrypt_seed(&[0u8; 32], "pass", FAST).unwrap();
        assert_eq!(keystore.crypto.kdf_params, FAST);
        assert_eq!(keystore.crypto.cipher, "aes-256-gcm");
        assert_eq!(keystore.crypto.kdf, "argon2id");
    }

    #[test]
    fn serializes_to_json() {
        let keystore = encrypt_seed(&[1u8; 32], "pass", FAST).unwrap();
        let json = serde_json::to_string_pretty(&keystore).unwrap();
        assert!(json.contains("\"version\": 1"));
        let parsed: EncryptedSeed = serde_json::from_str(&json).unwrap();
        assert_eq!(*decrypt_seed(&parsed, "pass").unwrap(), [1u8; 32]);
    }

    #[test]
    fn same_password_uses_fresh_salt() {
        let ks1 = encrypt_seed(&[7u8; 32], "password", FAST).unwrap();
        let ks2 = encrypt_seed(&[7u8; 32], "password", FAST).unwrap();
        assert_ne!(ks1.crypto.salt, ks2.crypto.salt);
        assert_ne!(ks1.crypto.ciphertext, ks2.crypto.ciphertext);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut keystore = encrypt_seed(&[7u8; 32], "pass", FAST).unwrap();
        let mut bytes = hex::decode(&keystore.crypto.ciphertext).unwrap();
        bytes[0] ^= 1;
        keystore.crypto.ciphertext = hex::encode(bytes);
        assert!(decrypt_seed(&keystore, "pass").is_err());
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut keystore = encrypt_seed(&[0u8; 32], "pass", FAST).unwrap();
        keystore.version = 99;
        assert!(decrypt_seed(&keystore, "pass").is_err());
    }
}
