//! Encrypted persistence of the access token.
//!
//! The token is stored as four independently sealed fields under fixed keys.
//! Any failure while writing or reading them clears every field, so the store
//! never holds a half-written or undecryptable record.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::types::AccessToken;
use crate::crypto::{FieldCipher, KdfParams};
use crate::error::{AuthError, AuthResult};
use crate::storage::SecureStore;

/// Key holding the sealed access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Key holding the sealed expiry, epoch milliseconds.
pub const EXPIRES_AT_KEY: &str = "expires_at";
/// Key holding the sealed refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Key holding the sealed user id.
pub const USER_ID_KEY: &str = "user_id";

const FIELD_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, REFRESH_TOKEN_KEY, USER_ID_KEY];

/// Persists an [`AccessToken`] through a [`SecureStore`].
pub struct CredentialStore<S: SecureStore> {
    store: Arc<S>,
    device_id: String,
    kdf: KdfParams,
}

impl<S: SecureStore> std::fmt::Debug for CredentialStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").field("kdf", &self.kdf).finish_non_exhaustive()
    }
}

impl<S: SecureStore> CredentialStore<S> {
    /// Create a credential store
    ///
    /// # Arguments
    /// * `store` - Namespaced backend receiving the sealed fields
    /// * `device_id` - Non-secret device identifier bound into the key salt
    /// * `kdf` - Key derivation cost, fixed for the lifetime of stored data
    pub fn new(store: Arc<S>, device_id: impl Into<String>, kdf: KdfParams) -> Self {
        Self { store, device_id: device_id.into(), kdf }
    }

    /// Seal and write all four fields.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if key derivation, encryption or the write
    /// fails. The store is cleared before returning.
    pub fn save(&self, token: &AccessToken, secret: &str) -> AuthResult<()> {
        let sealed = self.seal_fields(token, secret).map_err(|e| {
            self.clear();
            e
        })?;

        for (key, value) in FIELD_KEYS.iter().zip(sealed.iter()) {
            if let Err(e) = self.store.set(key, value) {
                error!(key = %key, error = %e, "Failed to persist credential field");
                self.clear();
                return Err(AuthError::storage("save", e.to_string()));
            }
        }

        debug!(user_id = %token.user_id, "Access token persisted");
        Ok(())
    }

    /// Read and open the persisted token.
    ///
    /// # Returns
    /// `Ok(None)` when nothing is stored.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the backend read fails, or if any
    /// field is missing or fails to decrypt or parse. The store is cleared
    /// before returning.
    pub fn load(&self, secret: &str) -> AuthResult<Option<AccessToken>> {
        match self.store.get(ACCESS_TOKEN_KEY) {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("No persisted access token");
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, "Failed to read persisted access token, clearing store");
                self.clear();
                return Err(AuthError::storage("load", e.to_string()));
            }
        }

        match self.open_fields(secret) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                error!(error = %e, "Persisted access token unreadable, clearing store");
                self.clear();
                Err(e)
            }
        }
    }

    /// Remove all fields unconditionally.
    pub fn clear(&self) {
        for key in FIELD_KEYS {
            if let Err(e) = self.store.remove(key) {
                warn!(key = %key, error = %e, "Failed to remove credential field");
            }
        }
        debug!("Credential store cleared");
    }

    /// Whether an access token is currently persisted.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.store.contains(ACCESS_TOKEN_KEY)
    }

    fn cipher(&self, secret: &str, operation: &str) -> AuthResult<FieldCipher> {
        FieldCipher::derive(secret, &self.device_id, &self.kdf)
            .map_err(|e| AuthError::storage(operation, e.to_string()))
    }

    fn seal_fields(&self, token: &AccessToken, secret: &str) -> AuthResult<[String; 4]> {
        let cipher = self.cipher(secret, "save")?;
        let seal = |value: &str| {
            cipher.seal(value).map_err(|e| AuthError::storage("save", e.to_string()))
        };

        Ok([
            seal(&token.access_token)?,
            seal(&token.expires_at_millis().to_string())?,
            seal(&token.refresh_token)?,
            seal(&token.user_id)?,
        ])
    }

    fn open_fields(&self, secret: &str) -> AuthResult<AccessToken> {
        let cipher = self.cipher(secret, "load")?;
        let open = |key: &str| -> AuthResult<String> {
            let sealed = self
                .store
                .get(key)
                .map_err(|e| AuthError::storage("load", e.to_string()))?
                .ok_or_else(|| AuthError::storage("load", format!("missing field {key}")))?;
            cipher.open(&sealed).map_err(|e| AuthError::storage("load", format!("{key}: {e}")))
        };

        let access_token = open(ACCESS_TOKEN_KEY)?;
        let expires_raw = open(EXPIRES_AT_KEY)?;
        let expires_at = AccessToken::parse_expires_at_millis(&expires_raw).ok_or_else(|| {
            AuthError::storage("load", format!("invalid expires_at value: {expires_raw}"))
        })?;
        let refresh_token = open(REFRESH_TOKEN_KEY)?;
        let user_id = open(USER_ID_KEY)?;

        Ok(AccessToken { access_token, expires_at, refresh_token, user_id })
    }
}
