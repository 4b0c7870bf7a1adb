//! Per-field encryption for persisted credentials.
//!
//! [`FieldCipher`] derives an AES-256-GCM key from a caller secret with
//! Argon2id. The salt is bound to the device: it is the SHA-256 digest of a
//! device identifier that is not itself secret. Each field is sealed with a
//! fresh random nonce and stored as `base64(nonce || ciphertext)`.
//!
//! Opening a value with a different secret, or on a device with a different
//! identifier, fails the authentication tag check. It never yields garbage.
//!
//! ## Usage
//!
//! ```rust
//! use authrelay_client::crypto::{FieldCipher, KdfParams};
//!
//! let cipher = FieldCipher::derive("client-secret", "device-42", &KdfParams::minimal())?;
//! let sealed = cipher.seal("refresh-token")?;
//! assert_eq!(cipher.open(&sealed)?, "refresh-token");
//! # Ok::<(), authrelay_client::crypto::CryptoError>(())
//! ```

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors raised while deriving keys or sealing/opening fields.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: wrong secret, wrong device or tampered value")]
    Decrypt,

    #[error("invalid encoding: {0}")]
    Encoding(String),
}

/// Argon2id cost parameters.
///
/// The iteration count is fixed per deployment; changing it makes previously
/// stored credentials undecryptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { memory_kib: 19 * 1024, iterations: 2 }
    }
}

impl KdfParams {
    /// Lowest cost accepted by Argon2. Intended for tests.
    #[must_use]
    pub fn minimal() -> Self {
        Self { memory_kib: 8, iterations: 1 }
    }
}

/// AES-256-GCM cipher keyed from a secret and a device identifier.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").field("key", &"[REDACTED]").finish()
    }
}

impl FieldCipher {
    /// Derive the field key from `secret`, salted with the digest of
    /// `device_id`.
    pub fn derive(secret: &str, device_id: &str, params: &KdfParams) -> Result<Self, CryptoError> {
        let salt = Sha256::digest(device_id.as_bytes());
        let params = Params::new(params.memory_kib, params.iterations, 1, Some(KEY_LEN))
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        // Wiped on drop, including the early error returns.
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(secret.as_bytes(), salt.as_slice(), key.as_mut_slice())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self { cipher })
    }

    /// Encrypt a UTF-8 value into its text form.
    pub fn seal(&self, value: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), value.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    /// Decrypt a value produced by [`FieldCipher::seal`].
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let payload = BASE64.decode(sealed).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Encoding("sealed value is truncated".to_string()));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Encoding(e.to_string()))
    }
}
