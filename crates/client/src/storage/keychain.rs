//! Platform keychain backend.
//!
//! Each key becomes one keychain entry under the configured service name, so
//! two clients with different namespaces never see each other's credentials.

use keyring::Entry;
use tracing::debug;

use super::{SecureStore, StoreError};

/// [`SecureStore`] backed by the platform keychain.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    /// Create a keychain store for a service namespace
    ///
    /// # Examples
    /// ```
    /// use authrelay_client::storage::KeychainStore;
    ///
    /// let store = KeychainStore::new("authrelay.my-client");
    /// assert_eq!(store.service_name(), "authrelay.my-client");
    /// ```
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    /// The keychain service namespace.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key).map_err(|e| {
            StoreError::AccessFailed(format!("failed to open keychain entry {key}: {e}"))
        })
    }
}

impl SecureStore for KeychainStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!(service = %self.service_name, key = %key, "Reading keychain entry");

        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                Err(StoreError::AccessFailed(format!("failed to read keychain entry {key}: {e}")))
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Writing keychain entry");

        self.entry(key)?.set_password(value).map_err(|e| {
            StoreError::AccessFailed(format!("failed to write keychain entry {key}: {e}"))
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain entry");

        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                Err(StoreError::AccessFailed(format!("failed to delete keychain entry {key}: {e}")))
            }
        }
    }
}
