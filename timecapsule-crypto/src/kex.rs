//! Key-exchange seam for the hybrid cipher.
//!
//! The hybrid protocol only needs three things from its key-exchange layer:
//! a long-term keypair for the recipient, a way for the sender to derive a
//! fresh shared secret against the recipient's public key (plus the public
//! value the recipient needs), and a way for the recipient to re-derive that
//! secret. Expressed as encapsulate/decapsulate, a lattice KEM fits the same
//! trait as X25519 ECDH.

use crate::error::{CryptoError, CryptoResult};
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Shared secret bytes, wiped on drop.
pub type SharedSecret = Zeroizing<Vec<u8>>;

/// Raw key-exchange keypair as produced by [`KeyExchange::generate`].
pub struct ExchangeKeyPair {
    pub public: Vec<u8>,
    pub secret: Zeroizing<Vec<u8>>,
}

/// Output of the sender side of a key exchange.
pub struct Encapsulation {
    /// Public value shipped with the package (ephemeral public key / KEM ciphertext).
    pub ephemeral_public: Vec<u8>,
    pub shared_secret: SharedSecret,
}

/// A key-exchange primitive usable by [`crate::HybridCipher`].
pub trait KeyExchange: Send + Sync {
    /// Short identifier embedded in key and package algorithm tags.
    fn algorithm(&self) -> &'static str;

    /// Human-readable name used in the package's scheme description.
    fn description(&self) -> &'static str;

    /// Older algorithm tags this primitive can still open.
    fn legacy_aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Generates a long-term recipient keypair.
    fn generate(&self) -> ExchangeKeyPair;

    /// Sender side: derives a fresh shared secret for `recipient_public`.
    fn encapsulate(&self, recipient_public: &[u8]) -> CryptoResult<Encapsulation>;

    /// Recipient side: re-derives the shared secret from the shipped public value.
    fn decapsulate(&self, secret: &[u8], ephemeral_public: &[u8]) -> CryptoResult<SharedSecret>;
}

/// X25519 Diffie-Hellman with a fresh ephemeral key per encapsulation.
#[derive(Clone, Copy, Debug, Default)]
pub struct X25519Exchange;

pub const X25519_KEY_SIZE: usize = 32;

fn to_key_bytes(bytes: &[u8]) -> CryptoResult<[u8; X25519_KEY_SIZE]> {
    <[u8; X25519_KEY_SIZE]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength {
        expected: X25519_KEY_SIZE,
        actual: bytes.len(),
    })
}

impl KeyExchange for X25519Exchange {
    fn algorithm(&self) -> &'static str {
        "x25519"
    }

    fn description(&self) -> &'static str {
        "X25519-ECDH"
    }

    fn legacy_aliases(&self) -> &'static [&'static str] {
        // Tag written by the first generation of capsules. Same construction.
        &["Kyber-768-Simulation"]
    }

    fn generate(&self) -> ExchangeKeyPair {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        ExchangeKeyPair {
            public: public.as_bytes().to_vec(),
            secret: Zeroizing::new(secret.to_bytes().to_vec()),
        }
    }

    fn encapsulate(&self, recipient_public: &[u8]) -> CryptoResult<Encapsulation> {
        let recipient = PublicKey::from(to_key_bytes(recipient_public)?);
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);

        let shared = ephemeral.diffie_hellman(&recipient);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey(
                "recipient X25519 key is a low-order point".to_string(),
            ));
        }

        Ok(Encapsulation {
            ephemeral_public: ephemeral_public.as_bytes().to_vec(),
            shared_secret: Zeroizing::new(shared.as_bytes().to_vec()),
        })
    }

    fn decapsulate(&self, secret: &[u8], ephemeral_public: &[u8]) -> CryptoResult<SharedSecret> {
        let secret = StaticSecret::from(*Zeroizing::new(to_key_bytes(secret)?));
        let ephemeral = PublicKey::from(to_key_bytes(ephemeral_public)?);

        let shared = secret.diffie_hellman(&ephemeral);
        if !shared.was_contributory() {
            return Err(CryptoError::Tamper(
                "ephemeral key is a low-order point".to_string(),
            ));
        }
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }
}
