use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Version marker written in front of every encrypted value.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// AES-GCM nonce size in bytes (96 bits).
const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,
    #[error("encrypted value is not valid base64")]
    Encoding,
    #[error("encrypted value is truncated")]
    Truncated,
    #[error("decryption failed: wrong key or corrupted data")]
    Decrypt,
    #[error("decrypted value is not valid UTF-8")]
    Utf8,
}

/// Symmetric codec for string fields.
///
/// Output layout: `enc:v1:` + base64(nonce || ciphertext+tag). The nonce is
/// random per call, so encrypting the same plaintext twice yields different
/// values.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(blob)))
    }

    /// Values without the version marker were written before encryption was
    /// enabled and are returned as-is. Marked values must decrypt or the call
    /// fails.
    pub fn decrypt(&self, value: &str) -> Result<String, CryptoError> {
        let Some(encoded) = value.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(value.to_string());
        };

        let blob = STANDARD.decode(encoded).map_err(|_| CryptoError::Encoding)?;
        if blob.len() <= NONCE_SIZE {
            return Err(CryptoError::Truncated);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
    }

    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENCRYPTED_PREFIX)
    }
}

/// SHA-256 digest, lowercase hex. Lookup only, never reversed.
pub fn hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Emails match case-insensitively.
pub fn hash_email(email: &str) -> String {
    hash(&email.trim().to_lowercase())
}
