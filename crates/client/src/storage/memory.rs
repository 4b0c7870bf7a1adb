use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{SecureStore, StoreError};

/// In-memory [`SecureStore`].
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the credential store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SecureStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates set, get and idempotent remove.
    #[test]
    fn set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("access_token", "sealed").unwrap();
        assert_eq!(store.get("access_token").unwrap().as_deref(), Some("sealed"));
        assert!(store.contains("access_token"));

        store.remove("access_token").unwrap();
        store.remove("access_token").unwrap();
        assert!(store.get("access_token").unwrap().is_none());
    }

    /// Validates that clones share state.
    #[test]
    fn clones_share_entries() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.set("user_id", "42").unwrap();
        assert_eq!(handle.len(), 1);
    }
}
