//! Passphrase protection for capsule private keys.
//!
//! A capsule's private key is handed to its creator once. Callers that want
//! to keep it at rest wrap the encoded key with a passphrase:
//! Argon2id derives a 256-bit key from the passphrase and a random salt, and
//! ChaCha20-Poly1305 seals the encoded private key under it.

use crate::encoding::base64_bytes;
use crate::error::{CryptoError, CryptoResult};
use crate::keypair::HybridPrivateKey;
use crate::symmetric::random_bytes;
use argon2::Argon2;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const MIN_PASSPHRASE_LEN: usize = 8;
const ARGON2_SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;

/// A private key sealed with a passphrase (Argon2id -> ChaCha20-Poly1305).
///
/// The salt and nonce travel with the ciphertext so the passphrase is the
/// only other input needed to open it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassphraseProtectedKey {
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

fn derive_wrapping_key(passphrase: &str, salt: &[u8]) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2id: {e}")))?;
    Ok(key)
}

/// Seals `key` under `passphrase`.
pub fn protect_private_key(
    key: &HybridPrivateKey,
    passphrase: &str,
) -> CryptoResult<PassphraseProtectedKey> {
    if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "passphrase must be at least {MIN_PASSPHRASE_LEN} characters"
        )));
    }

    let salt = random_bytes::<ARGON2_SALT_SIZE>();
    let nonce = random_bytes::<NONCE_SIZE>();
    let wrapping_key = derive_wrapping_key(passphrase, &salt)?;
    let encoded = key.encode()?;

    let cipher = ChaCha20Poly1305::new_from_slice(&wrapping_key[..])
        .map_err(|e| CryptoError::Encryption(format!("ChaCha20-Poly1305 setup: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), encoded.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("private key seal failed: {e}")))?;

    Ok(PassphraseProtectedKey {
        salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        ciphertext,
        algorithm: key.algorithm.clone(),
        created_at: Utc::now(),
    })
}

/// Opens a passphrase-protected private key.
///
/// A wrong passphrase and a modified blob are indistinguishable and both
/// surface as [`CryptoError::Decryption`].
pub fn unprotect_private_key(
    protected: &PassphraseProtectedKey,
    passphrase: &str,
) -> CryptoResult<HybridPrivateKey> {
    if protected.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: NONCE_SIZE,
            actual: protected.nonce.len(),
        });
    }

    let wrapping_key = derive_wrapping_key(passphrase, &protected.salt)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&wrapping_key[..])
        .map_err(|e| CryptoError::Decryption(format!("ChaCha20-Poly1305 setup: {e}")))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(&protected.nonce),
                protected.ciphertext.as_slice(),
            )
            .map_err(|_| {
                CryptoError::Decryption(
                    "private key open failed (wrong passphrase or tampered data)".to_string(),
                )
            })?,
    );

    let encoded = std::str::from_utf8(&plaintext)
        .map_err(|_| CryptoError::InvalidKey("protected key is not UTF-8".to_string()))?;
    HybridPrivateKey::decode(encoded)
}
