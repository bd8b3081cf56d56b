//! Hybrid encryption for time capsules.
//!
//! Each capsule gets its own keypair. Content is sealed with:
//! - X25519 ephemeral key agreement for a per-package shared secret
//! - RSA-2048 (PKCS#1 v1.5) transport of a second copy of that secret
//! - PBKDF2-HMAC-SHA256 stretching of a random content key
//! - AES-256-CBC for the payload and for wrapping the content key
//! - HMAC-SHA256 over every package field
//!
//! # Architecture
//!
//! The key-exchange primitive sits behind the [`KeyExchange`] trait so the
//! protocol can move to a KEM without touching package layout. Keys travel
//! as opaque base64 blobs ([`HybridPublicKey::encode`],
//! [`HybridPrivateKey::encode`]) and packages as camelCase JSON with base64
//! byte fields ([`EncryptedPackage`]).
//!
//! Private keys can be kept at rest under a passphrase with
//! [`protect_private_key`].

pub mod encoding;
mod error;
mod hybrid;
pub mod kex;
mod keypair;
mod protection;
mod symmetric;

pub use error::{CryptoError, CryptoResult};
pub use hybrid::{EncryptedPackage, HybridCipher};
pub use kex::{KeyExchange, X25519Exchange};
pub use keypair::{
    HybridKeyPair, HybridPrivateKey, HybridPublicKey, KEY_FORMAT_VERSION, RSA_KEY_BITS,
    generate_keypair,
};
pub use protection::{
    MIN_PASSPHRASE_LEN, PassphraseProtectedKey, protect_private_key, unprotect_private_key,
};
pub use symmetric::{IV_SIZE, KEY_SIZE, PBKDF2_ITERATIONS, SALT_SIZE};
