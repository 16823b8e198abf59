//! Authenticated block encryption using XChaCha20-Poly1305
//!
//! [`encrypt`] draws a random 24-byte nonce. [`seal_deterministic`] derives
//! it from the key and plaintext instead, so identical content under one key
//! seals to identical bytes. Either way the Poly1305 tag turns a wrong key or
//! a flipped ciphertext byte into a hard decryption failure.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use thiserror::Error;

use super::keys::BlockKey;

const NONCE_LEN: usize = 24;
const NONCE_CONTEXT: &str = "peer-backup block nonce v1";
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed - data may be corrupted or key incorrect")]
    DecryptionFailed,
    #[error("Invalid ciphertext format")]
    InvalidFormat,
}

/// Encrypt data with XChaCha20-Poly1305
///
/// Output format: nonce (24 bytes) || ciphertext || tag (16 bytes)
pub fn encrypt(key: &BlockKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    seal_with_nonce(&cipher, &nonce, plaintext)
}

/// Encrypt with a nonce derived from the key and plaintext
///
/// Same output format as [`encrypt`] and opened by [`decrypt`]. Equal
/// ciphertexts reveal only that the plaintexts were equal.
pub fn seal_deterministic(key: &BlockKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce_key = blake3::derive_key(NONCE_CONTEXT, key.as_bytes());
    let digest = blake3::keyed_hash(&nonce_key, plaintext);
    let nonce = XNonce::from_slice(&digest.as_bytes()[..NONCE_LEN]);
    seal_with_nonce(&cipher, nonce, plaintext)
}

fn seal_with_nonce(
    cipher: &XChaCha20Poly1305,
    nonce: &XNonce,
    plaintext: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt data produced by [`encrypt`]
pub fn decrypt(key: &BlockKey, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(EncryptionError::InvalidFormat);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XNonce::from_slice(&ciphertext[..NONCE_LEN]);

    cipher
        .decrypt(nonce, &ciphertext[NONCE_LEN..])
        .map_err(|_| EncryptionError::DecryptionFailed)
}
