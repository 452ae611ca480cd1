//! Key-value persistence port.
//!
//! Every durable piece of client state (sessions, context, recents, scope)
//! is stored as a JSON string under its own namespaced key. Writes always
//! replace the whole value for a key.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Result, SqlChatError};

/// Durable string-keyed storage with synchronous get/set.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value for `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Load and deserialize the JSON value under `key`.
///
/// Returns `None` when the key is absent, unreadable, or holds malformed
/// JSON; callers substitute their own default.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read persisted value");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Discarding malformed persisted JSON");
            None
        }
    }
}

/// Serialize `value` as JSON and overwrite `key`.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// In-process store used for tests and `--in-memory` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| SqlChatError::Storage(format!("store lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| SqlChatError::Storage(format!("store lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| SqlChatError::Storage(format!("store lock poisoned: {}", e)))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.set("k", "w").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("w"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_remove() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        store.remove("missing").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_json_roundtrip() {
        let store = MemoryStore::new();
        save_json(&store, "list", &vec!["a", "b"]).unwrap();
        let loaded: Vec<String> = load_json(&store, "list").unwrap();
        assert_eq!(loaded, vec!["a", "b"]);
    }

    #[test]
    fn test_load_json_missing_is_none() {
        let store = MemoryStore::new();
        let loaded: Option<Vec<String>> = load_json(&store, "nothing");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_malformed_is_none() {
        let store = MemoryStore::new();
        store.set("list", "[not json").unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, "list");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_wrong_shape_is_none() {
        let store = MemoryStore::new();
        store.set("list", "{\"a\": 1}").unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, "list");
        assert!(loaded.is_none());
    }
}
