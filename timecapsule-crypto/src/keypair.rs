//! Hybrid capsule keypairs: a key-exchange key plus a 2048-bit RSA key.
//!
//! Both halves travel as one opaque blob: base64 of a JSON object
//! `{ x25519, rsa, algorithm, version }` where `x25519` is the base64
//! key-exchange key and `rsa` is the base64 of a PEM document.

use crate::encoding;
use crate::error::{CryptoError, CryptoResult};
use crate::kex::KeyExchange;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

pub const RSA_KEY_BITS: usize = 2048;
pub const KEY_FORMAT_VERSION: &str = "1.0";

/// Wire shape of an encoded key. The key-exchange half keeps its historical
/// `x25519` field name regardless of the primitive in use.
#[derive(Serialize, Deserialize)]
struct EncodedKey {
    #[serde(rename = "x25519")]
    exchange: String,
    rsa: String,
    algorithm: String,
    version: String,
}

impl Drop for EncodedKey {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.exchange.zeroize();
        self.rsa.zeroize();
    }
}

fn decode_envelope(encoded: &str) -> CryptoResult<EncodedKey> {
    let json = Zeroizing::new(
        encoding::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("key is not valid base64: {e}")))?,
    );
    serde_json::from_slice(&json)
        .map_err(|e| CryptoError::InvalidKey(format!("malformed key structure: {e}")))
}

fn encode_envelope(key: &EncodedKey) -> CryptoResult<Zeroizing<String>> {
    let json = Zeroizing::new(
        serde_json::to_vec(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
    );
    Ok(Zeroizing::new(encoding::encode(&*json)))
}

fn decode_pem(field: &str) -> CryptoResult<Zeroizing<String>> {
    let raw = Zeroizing::new(
        encoding::decode(field)
            .map_err(|e| CryptoError::InvalidKey(format!("RSA component is not valid base64: {e}")))?,
    );
    let pem = std::str::from_utf8(&raw)
        .map_err(|_| CryptoError::InvalidKey("RSA component is not UTF-8 PEM".to_string()))?;
    Ok(Zeroizing::new(pem.to_string()))
}

/// Public half of a capsule keypair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HybridPublicKey {
    pub exchange: Vec<u8>,
    pub rsa: RsaPublicKey,
    pub algorithm: String,
}

impl HybridPublicKey {
    /// Encodes the key into its opaque base64 form.
    pub fn encode(&self) -> CryptoResult<String> {
        let pem = self
            .rsa
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(format!("RSA public key encoding failed: {e}")))?;
        let encoded = encode_envelope(&EncodedKey {
            exchange: encoding::encode(&self.exchange),
            rsa: encoding::encode(pem.as_bytes()),
            algorithm: self.algorithm.clone(),
            version: KEY_FORMAT_VERSION.to_string(),
        })?;
        Ok(String::clone(&encoded))
    }

    /// Parses an opaque base64 public key.
    pub fn decode(encoded: &str) -> CryptoResult<Self> {
        let env = decode_envelope(encoded)?;
        let exchange = encoding::decode(&env.exchange).map_err(|e| {
            CryptoError::InvalidKey(format!("key-exchange component is not valid base64: {e}"))
        })?;
        let pem = decode_pem(&env.rsa)?;
        let rsa = RsaPublicKey::from_public_key_pem(&pem)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA public key: {e}")))?;

        Ok(Self {
            exchange,
            rsa,
            algorithm: env.algorithm.clone(),
        })
    }
}

/// Secret half of a capsule keypair.
///
/// The key-exchange secret is wiped on drop; `RsaPrivateKey` zeroizes itself.
#[derive(Clone)]
pub struct HybridPrivateKey {
    pub exchange: Zeroizing<Vec<u8>>,
    pub rsa: RsaPrivateKey,
    pub algorithm: String,
}

impl HybridPrivateKey {
    /// Encodes the key into its opaque base64 form.
    ///
    /// The RSA half is written as PKCS#1 PEM (`BEGIN RSA PRIVATE KEY`).
    pub fn encode(&self) -> CryptoResult<Zeroizing<String>> {
        let pem = self
            .rsa
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(format!("RSA private key encoding failed: {e}")))?;
        encode_envelope(&EncodedKey {
            exchange: encoding::encode(&*self.exchange),
            rsa: encoding::encode(pem.as_bytes()),
            algorithm: self.algorithm.clone(),
            version: KEY_FORMAT_VERSION.to_string(),
        })
    }

    /// Parses an opaque base64 private key. Accepts PKCS#1 and PKCS#8 PEM.
    pub fn decode(encoded: &str) -> CryptoResult<Self> {
        let env = decode_envelope(encoded)?;
        let exchange = Zeroizing::new(encoding::decode(&env.exchange).map_err(|e| {
            CryptoError::InvalidKey(format!("key-exchange component is not valid base64: {e}"))
        })?);
        let pem = decode_pem(&env.rsa)?;
        let rsa = RsaPrivateKey::from_pkcs1_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA private key: {e}")))?;

        Ok(Self {
            exchange,
            rsa,
            algorithm: env.algorithm.clone(),
        })
    }

    /// Derives the matching RSA public key.
    pub fn rsa_public(&self) -> RsaPublicKey {
        self.rsa.to_public_key()
    }
}

impl fmt::Debug for HybridPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridPrivateKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A freshly generated capsule keypair.
#[derive(Clone, Debug)]
pub struct HybridKeyPair {
    pub public: HybridPublicKey,
    pub private: HybridPrivateKey,
    pub created_at: DateTime<Utc>,
}

/// Generates a keypair: a key-exchange key from `kex` and a 2048-bit RSA key,
/// both from the OS random source.
pub fn generate_keypair(kex: &dyn KeyExchange, algorithm: &str) -> CryptoResult<HybridKeyPair> {
    let exchange = kex.generate();
    let rsa = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
        .map_err(|e| CryptoError::KeyGeneration(format!("RSA-{RSA_KEY_BITS}: {e}")))?;
    let rsa_public = rsa.to_public_key();

    Ok(HybridKeyPair {
        public: HybridPublicKey {
            exchange: exchange.public,
            rsa: rsa_public,
            algorithm: algorithm.to_string(),
        },
        private: HybridPrivateKey {
            exchange: exchange.secret,
            rsa,
            algorithm: algorithm.to_string(),
        },
        created_at: Utc::now(),
    })
}
