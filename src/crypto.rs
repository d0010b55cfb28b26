//! AES-256-GCM encryption for the optional `TOKEN_ENC_KEY` secret.
//!
//! Payload format is `iv.tag.cipher`, each segment base64-encoded and
//! joined with `.`, matching the wire format §6 specifies. Nothing in the
//! core pipeline currently stores a value that needs this today, but the
//! key is a recognized config option so the helper lives here ready for a
//! caller (e.g. a future provider-credential-at-rest feature) rather than
//! being reimplemented ad hoc when one shows up.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed: authentication error or corrupted payload")]
    DecryptFailed,
    #[error("malformed payload: expected iv.tag.cipher")]
    MalformedPayload,
}

/// Encrypts `plaintext` under `key`, returning the `iv.tag.cipher` form.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptFailed)?;
    let mut iv = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let mut sealed = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
        .map_err(|_| CryptoError::EncryptFailed)?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(format!(
        "{}.{}.{}",
        STANDARD.encode(iv),
        STANDARD.encode(tag),
        STANDARD.encode(sealed),
    ))
}

/// Decrypts a `iv.tag.cipher` payload produced by [`encrypt`].
pub fn decrypt(key: &[u8; 32], payload: &str) -> Result<Vec<u8>, CryptoError> {
    let mut parts = payload.split('.');
    let (iv_b64, tag_b64, cipher_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(iv), Some(tag), Some(cipher), None) => (iv, tag, cipher),
        _ => return Err(CryptoError::MalformedPayload),
    };

    let iv = STANDARD.decode(iv_b64).map_err(|_| CryptoError::MalformedPayload)?;
    let tag = STANDARD.decode(tag_b64).map_err(|_| CryptoError::MalformedPayload)?;
    let cipher_text = STANDARD.decode(cipher_b64).map_err(|_| CryptoError::MalformedPayload)?;
    if iv.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(CryptoError::MalformedPayload);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
    let nonce = Nonce::from_slice(&iv);
    let mut sealed = cipher_text;
    sealed.extend_from_slice(&tag);

    cipher
        .decrypt(nonce, Payload { msg: &sealed, aad: &[] })
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn round_trips() {
        let payload = encrypt(&key(), b"provider-refresh-token").unwrap();
        assert_eq!(payload.split('.').count(), 3);
        let plain = decrypt(&key(), &payload).unwrap();
        assert_eq!(plain, b"provider-refresh-token");
    }

    #[test]
    fn rejects_tampered_payload() {
        let mut payload = encrypt(&key(), b"secret").unwrap();
        payload.push('x');
        assert!(decrypt(&key(), &payload).is_err());
    }

    #[test]
    fn rejects_wrong_key() {
        let payload = encrypt(&key(), b"secret").unwrap();
        assert!(decrypt(&[1u8; 32], &payload).is_err());
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(decrypt(&key(), "not-enough-parts").is_err());
    }
}
