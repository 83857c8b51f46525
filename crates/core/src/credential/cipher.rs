//! Private key encryption at rest.
//!
//! AES-256-GCM with a random 96-bit nonce per message. Sealed values are
//! base64 of `nonce || tag || ciphertext`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::rand::rand_bytes;
use openssl::symm::{Cipher, decrypt_aead, encrypt_aead};
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Key encryption errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// The configured key is not 32 bytes of base64.
    #[error("Invalid key encryption key: {0}")]
    InvalidKey(String),

    /// The sealed value is not valid base64 or is truncated.
    #[error("Malformed sealed value")]
    Malformed,

    /// Encryption failed inside the crypto library.
    #[error("Encryption failed: {0}")]
    Seal(String),

    /// Authentication failed: wrong key or tampered value.
    #[error("Decryption failed")]
    Open,
}

/// Seals and opens secrets with the configured key encryption key.
#[derive(Clone)]
pub struct KeyCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCipher").finish_non_exhaustive()
    }
}

impl KeyCipher {
    /// Creates a cipher from raw key bytes.
    #[must_use]
    pub const fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Creates a cipher from the base64 key in `security.key_encryption_key`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the value does not decode to 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CipherError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self { key })
    }

    /// Encrypts `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns `Seal` if the crypto library fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand_bytes(&mut nonce).map_err(|e| CipherError::Seal(e.to_string()))?;
        let mut tag = [0u8; TAG_LEN];
        let ciphertext = encrypt_aead(
            Cipher::aes_256_gcm(),
            &self.key,
            Some(&nonce),
            &[],
            plaintext,
            &mut tag,
        )
        .map_err(|e| CipherError::Seal(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&tag);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypts a value produced by [`KeyCipher::seal`].
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for undecodable input and `Open` when
    /// authentication fails.
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CipherError> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .map_err(|_| CipherError::Malformed)?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Malformed);
        }
        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        decrypt_aead(
            Cipher::aes_256_gcm(),
            &self.key,
            Some(nonce),
            &[],
            ciphertext,
            tag,
        )
        .map_err(|_| CipherError::Open)
    }
}
