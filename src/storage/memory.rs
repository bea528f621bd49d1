//! In-memory key-value store.

use super::KeyValueStore;
use crate::error::AppError;
use dashmap::DashMap;

/// Process-local store. Used directly in tests and as the fallback
/// layer inside [`super::FallbackStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.data.remove(key).is_some())
    }
}
