//! Namespaced key/value storage for sealed credentials.
//!
//! The credential store only ever writes already-encrypted text, so backends
//! are plain string maps. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: process-local map, used in tests and ephemeral sessions
//! - [`KeychainStore`]: platform keychain (macOS Keychain, Windows Credential
//!   Manager, Linux Secret Service) via the `keyring` crate

#[cfg(feature = "keychain")]
mod keychain;
mod memory;

#[cfg(feature = "keychain")]
pub use keychain::KeychainStore;
pub use memory::MemoryStore;
use thiserror::Error;

/// Errors reported by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend refused or failed the operation
    #[error("storage access failed: {0}")]
    AccessFailed(String),
}

/// Synchronous, namespaced secret storage.
///
/// Implementations must treat `remove` of a missing key as success.
pub trait SecureStore: Send + Sync + 'static {
    /// Read a value; `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value (idempotent).
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Whether a value exists for `key`.
    fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}
