//! Symmetric building blocks: AES-256-CBC, PBKDF2 stretching, key wrapping
//! keys and the package integrity MAC.

use crate::error::{CryptoError, CryptoResult};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;
/// PBKDF2 salt size in bytes.
pub const SALT_SIZE: usize = 32;
/// AES block / CBC IV size in bytes.
pub const IV_SIZE: usize = 16;
/// PBKDF2-HMAC-SHA256 rounds applied to the content key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const MAC_DOMAIN: &[u8] = b"timecapsule/package-mac/v1";

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// AES-256-CBC with PKCS#7 padding.
pub(crate) fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Encryption(format!("AES-256-CBC setup: {e}")))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub(crate) fn cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Decryption(format!("AES-256-CBC setup: {e}")))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| {
            CryptoError::Decryption("bad padding (wrong key or corrupted data)".to_string())
        })
}

/// Stretches a content key with PBKDF2-HMAC-SHA256.
pub(crate) fn stretch_content_key(content_key: &[u8], salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut derived = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(content_key, salt, PBKDF2_ITERATIONS, &mut derived[..]);
    derived
}

/// `SHA256(shared_secret)`, used to wrap the content key.
pub(crate) fn key_encryption_key(shared_secret: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut kek = Zeroizing::new([0u8; KEY_SIZE]);
    kek.copy_from_slice(&Sha256::digest(shared_secret));
    kek
}

fn mac_key(shared_secret: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(MAC_DOMAIN);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&hasher.finalize());
    key
}

fn keyed_mac(shared_secret: &[u8], fields: &[&[u8]]) -> CryptoResult<HmacSha256> {
    let key = mac_key(shared_secret);
    let mut mac = HmacSha256::new_from_slice(&key[..])
        .map_err(|e| CryptoError::Encryption(format!("HMAC setup: {e}")))?;
    // Length-prefix every field so boundaries cannot shift.
    for field in fields {
        mac.update(&(field.len() as u64).to_be_bytes());
        mac.update(field);
    }
    Ok(mac)
}

/// HMAC-SHA256 over the given fields, keyed from the shared secret.
pub(crate) fn package_tag(shared_secret: &[u8], fields: &[&[u8]]) -> CryptoResult<Vec<u8>> {
    Ok(keyed_mac(shared_secret, fields)?
        .finalize()
        .into_bytes()
        .to_vec())
}

pub(crate) fn verify_package_tag(
    shared_secret: &[u8],
    fields: &[&[u8]],
    tag: &[u8],
) -> CryptoResult<()> {
    keyed_mac(shared_secret, fields)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::Tamper("integrity tag mismatch".to_string()))
}

/// Constant-time equality for secrets of public length.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
