//! Capsule error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timecapsule_blobstore::BlobStoreError;
use timecapsule_crypto::CryptoError;

/// Result type for capsule operations.
pub type CapsuleResult<T> = Result<T, CapsuleError>;

/// Errors surfaced by [`crate::CapsuleManager`].
#[derive(Debug, Error)]
pub enum CapsuleError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("capsule is locked until {unlock_at}")]
    TimeLock { unlock_at: DateTime<Utc> },

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("capsule not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("tampering detected: {0}")]
    Tamper(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Discriminant of [`CapsuleError`], for transport layers that map errors to
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    TimeLock,
    Authorization,
    NotFound,
    Storage,
    Tamper,
    Decryption,
    Encryption,
}

impl CapsuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::TimeLock { .. } => ErrorKind::TimeLock,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Tamper(_) => ErrorKind::Tamper,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::Encryption(_) => ErrorKind::Encryption,
        }
    }

    /// Any crypto failure while sealing a new capsule.
    pub(crate) fn sealing(err: CryptoError) -> Self {
        Self::Encryption(err.to_string())
    }
}

impl From<BlobStoreError> for CapsuleError {
    fn from(err: BlobStoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CryptoError> for CapsuleError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Tamper(msg) => Self::Tamper(msg),
            CryptoError::KeyGeneration(_) | CryptoError::Encryption(_) => {
                Self::Encryption(err.to_string())
            }
            CryptoError::Decryption(_)
            | CryptoError::InvalidKey(_)
            | CryptoError::InvalidKeyLength { .. }
            | CryptoError::KeyDerivation(_) => Self::Decryption(err.to_string()),
        }
    }
}
