//! Key-value configuration store read contract.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Key holding the persisted flow callbacks configuration document
pub const FLOW_CALLBACKS_CONFIG: &str = "ntopng.prefs.flow_callbacks_config";

/// Configuration store errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the engine's key-value store.
pub trait ConfigStore: Send + Sync {
    /// Length in bytes of the value under `key`, zero when absent
    fn len(&self, key: &str) -> usize;

    /// Append the value under `key` to `buf`
    fn get(&self, key: &str, buf: &mut String) -> Result<(), StoreError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn len(&self, key: &str) -> usize {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).map_or(0, String::len)
    }

    fn get(&self, key: &str, buf: &mut String) -> Result<(), StoreError> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let value = values
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        buf.push_str(value);
        Ok(())
    }
}
