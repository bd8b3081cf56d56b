//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while generating keys, sealing or opening packages.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The package failed an authenticity check (shared-secret mismatch,
    /// integrity tag mismatch or a non-contributory ephemeral key).
    #[error("tampering detected: {0}")]
    Tamper(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}
