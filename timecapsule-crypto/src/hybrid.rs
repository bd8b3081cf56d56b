//! Hybrid capsule encryption.
//!
//! Sealing a payload:
//!
//! 1. Encapsulate against the recipient's key-exchange key, producing an
//!    ephemeral public value and a shared secret.
//! 2. Wrap a random 256-bit content key with `AES-256-CBC(SHA256(secret))`.
//! 3. Stretch the content key with PBKDF2 (100k rounds, random salt) and
//!    encrypt the payload with AES-256-CBC.
//! 4. Transport a second copy of the shared secret under the recipient's
//!    RSA key. On open, the RSA copy and the re-derived copy must match
//!    before any unwrapping happens.
//! 5. Tag every binary field with HMAC-SHA256 keyed from the shared secret.
//!
//! Neither X25519 nor RSA resists a quantum adversary; the key exchange is
//! pluggable through [`KeyExchange`].

use crate::encoding::{self, base64_bytes, base64_bytes_opt};
use crate::error::{CryptoError, CryptoResult};
use crate::kex::{KeyExchange, X25519Exchange};
use crate::keypair::{HybridKeyPair, HybridPrivateKey, HybridPublicKey, generate_keypair};
use crate::symmetric::{
    IV_SIZE, KEY_SIZE, SALT_SIZE, cbc_decrypt, cbc_encrypt, ct_eq, key_encryption_key,
    package_tag, random_bytes, stretch_content_key, verify_package_tag,
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::Pkcs1v15Encrypt;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const KEY_VALIDATION_PROBE: &[u8] = b"timecapsule-keypair-validation";

/// A sealed payload. Self-contained: opening it needs only the recipient's
/// private key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPackage {
    /// AES-256-CBC ciphertext of the payload.
    #[serde(with = "base64_bytes", alias = "encryptedData")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    /// PBKDF2 salt for the content key.
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes", alias = "encryptedAesKey")]
    pub wrapped_content_key: Vec<u8>,
    #[serde(with = "base64_bytes", alias = "keyIv")]
    pub wrap_iv: Vec<u8>,
    #[serde(with = "base64_bytes", alias = "ephemeralPublic")]
    pub ephemeral_public_key: Vec<u8>,
    /// RSA-PKCS#1 v1.5 encryption of `base64(shared secret)`.
    #[serde(with = "base64_bytes", alias = "rsaEncryptedKey")]
    pub rsa_wrapped_secret: Vec<u8>,
    #[serde(alias = "algorithm")]
    pub algorithm_id: String,
    #[serde(default)]
    pub encryption_scheme: String,
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "dataSize")]
    pub plaintext_size: u64,
    /// Encrypt-then-MAC tag. Absent on first-generation packages.
    ///
    /// Removing the tag downgrades a package to the unauthenticated CBC path,
    /// so it only stops an active attacker when the opening cipher was built
    /// with [`HybridCipher::requiring_tag`].
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes_opt")]
    pub tag: Option<Vec<u8>>,
}

impl EncryptedPackage {
    /// Size of the payload ciphertext in bytes.
    pub fn encrypted_size(&self) -> usize {
        self.ciphertext.len()
    }

    /// Fields covered by the integrity tag, in order.
    fn tagged_fields<'a>(&'a self, size: &'a [u8; 8]) -> [&'a [u8]; 9] {
        [
            self.algorithm_id.as_bytes(),
            &self.iv,
            &self.salt,
            &self.wrap_iv,
            &self.wrapped_content_key,
            &self.ephemeral_public_key,
            &self.rsa_wrapped_secret,
            size,
            &self.ciphertext,
        ]
    }
}

/// Seals and opens [`EncryptedPackage`]s.
pub struct HybridCipher<K: KeyExchange = X25519Exchange> {
    kex: K,
    algorithm_id: String,
    require_tag: bool,
}

impl HybridCipher<X25519Exchange> {
    pub fn new() -> Self {
        Self::with_key_exchange(X25519Exchange)
    }
}

impl Default for HybridCipher<X25519Exchange> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KeyExchange> HybridCipher<K> {
    pub fn with_key_exchange(kex: K) -> Self {
        let algorithm_id = format!("{}-rsa2048-aes256cbc-pbkdf2", kex.algorithm());
        Self {
            kex,
            algorithm_id,
            require_tag: false,
        }
    }

    /// When set, packages without an integrity tag are rejected as tampered
    /// instead of being opened on the untagged path.
    pub fn requiring_tag(mut self, required: bool) -> Self {
        self.require_tag = required;
        self
    }

    /// Algorithm tag written into keys and packages.
    pub fn algorithm_id(&self) -> &str {
        &self.algorithm_id
    }

    /// Human-readable description of the construction.
    pub fn scheme(&self) -> String {
        format!(
            "{} + RSA + AES-256-CBC + PBKDF2 + HMAC-SHA256",
            self.kex.description()
        )
    }

    fn accepts(&self, algorithm: &str) -> bool {
        algorithm == self.algorithm_id || self.kex.legacy_aliases().contains(&algorithm)
    }

    /// Generates a fresh capsule keypair.
    pub fn generate_keypair(&self) -> CryptoResult<HybridKeyPair> {
        generate_keypair(&self.kex, &self.algorithm_id)
    }

    /// Seals `plaintext` for the holder of `recipient`'s private key.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &HybridPublicKey,
    ) -> CryptoResult<EncryptedPackage> {
        if !self.accepts(&recipient.algorithm) {
            return Err(CryptoError::InvalidKey(format!(
                "public key algorithm {} is not {}",
                recipient.algorithm, self.algorithm_id
            )));
        }

        let encap = self.kex.encapsulate(&recipient.exchange)?;
        let kek = key_encryption_key(&encap.shared_secret);

        let content_key = Zeroizing::new(random_bytes::<KEY_SIZE>());
        let salt = random_bytes::<SALT_SIZE>();
        let iv = random_bytes::<IV_SIZE>();
        let wrap_iv = random_bytes::<IV_SIZE>();

        let derived = stretch_content_key(&content_key[..], &salt);
        let ciphertext = cbc_encrypt(&derived[..], &iv, plaintext)?;
        let wrapped_content_key = cbc_encrypt(&kek[..], &wrap_iv, &content_key[..])?;

        let transported = Zeroizing::new(encoding::encode(&*encap.shared_secret));
        let rsa_wrapped_secret = recipient
            .rsa
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, transported.as_bytes())
            .map_err(|e| CryptoError::Encryption(format!("RSA transport of shared secret: {e}")))?;

        let mut package = EncryptedPackage {
            ciphertext,
            iv: iv.to_vec(),
            salt: salt.to_vec(),
            wrapped_content_key,
            wrap_iv: wrap_iv.to_vec(),
            ephemeral_public_key: encap.ephemeral_public,
            rsa_wrapped_secret,
            algorithm_id: self.algorithm_id.clone(),
            encryption_scheme: self.scheme(),
            created_at: Utc::now(),
            plaintext_size: plaintext.len() as u64,
            tag: None,
        };
        let size = package.plaintext_size.to_be_bytes();
        let tag = package_tag(&encap.shared_secret, &package.tagged_fields(&size))?;
        package.tag = Some(tag);

        Ok(package)
    }

    /// Opens a package.
    ///
    /// Returns [`CryptoError::Tamper`] when the two copies of the shared
    /// secret disagree or the integrity tag fails, and
    /// [`CryptoError::Decryption`] (or a key error) for any other failure.
    pub fn decrypt(
        &self,
        package: &EncryptedPackage,
        key: &HybridPrivateKey,
    ) -> CryptoResult<Vec<u8>> {
        if !self.accepts(&package.algorithm_id) {
            return Err(CryptoError::Decryption(format!(
                "unsupported package algorithm: {}",
                package.algorithm_id
            )));
        }
        if !self.accepts(&key.algorithm) {
            return Err(CryptoError::InvalidKey(format!(
                "private key algorithm {} is not {}",
                key.algorithm, self.algorithm_id
            )));
        }

        let transported = Zeroizing::new(
            key.rsa
                .decrypt(Pkcs1v15Encrypt, &package.rsa_wrapped_secret)
                .map_err(|_| {
                    CryptoError::Decryption(
                        "RSA unwrap of shared secret failed (wrong key or corrupted data)"
                            .to_string(),
                    )
                })?,
        );
        let secret_from_rsa = Zeroizing::new(encoding::decode(&*transported).map_err(|_| {
            CryptoError::Decryption("transported shared secret is not valid base64".to_string())
        })?);

        let secret = self
            .kex
            .decapsulate(&key.exchange, &package.ephemeral_public_key)?;

        if !ct_eq(&secret_from_rsa, &secret) {
            return Err(CryptoError::Tamper("shared secret mismatch".to_string()));
        }

        match &package.tag {
            Some(tag) => {
                let size = package.plaintext_size.to_be_bytes();
                verify_package_tag(&secret, &package.tagged_fields(&size), tag)?;
            }
            None if self.require_tag => {
                return Err(CryptoError::Tamper("integrity tag missing".to_string()));
            }
            None => {}
        }

        let kek = key_encryption_key(&secret);
        let content_key = Zeroizing::new(cbc_decrypt(
            &kek[..],
            &package.wrap_iv,
            &package.wrapped_content_key,
        )?);
        if content_key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: content_key.len(),
            });
        }

        let derived = stretch_content_key(&content_key, &package.salt);
        let plaintext = cbc_decrypt(&derived[..], &package.iv, &package.ciphertext)?;

        if plaintext.len() as u64 != package.plaintext_size {
            return Err(CryptoError::Decryption(format!(
                "plaintext size mismatch: expected {}, got {}",
                package.plaintext_size,
                plaintext.len()
            )));
        }
        Ok(plaintext)
    }

    /// Returns true if `private` opens what `public` seals.
    pub fn validate_keypair(&self, public: &HybridPublicKey, private: &HybridPrivateKey) -> bool {
        self.encrypt(KEY_VALIDATION_PROBE, public)
            .and_then(|package| self.decrypt(&package, private))
            .is_ok_and(|plaintext| plaintext == KEY_VALIDATION_PROBE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_algorithm_id_names_the_real_primitives() {
        let cipher = HybridCipher::new();
        assert_eq!(cipher.algorithm_id(), "x25519-rsa2048-aes256cbc-pbkdf2");
        assert!(cipher.scheme().starts_with("X25519-ECDH"));
    }

    #[test]
    fn legacy_algorithm_tag_is_accepted() {
        let cipher = HybridCipher::new();
        assert!(cipher.accepts("Kyber-768-Simulation"));
        assert!(!cipher.accepts("ml-kem-768-rsa2048-aes256cbc-pbkdf2"));
    }
}
