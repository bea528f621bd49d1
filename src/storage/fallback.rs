//! Store wrapper that degrades to memory when the device store fails.

use super::{KeyValueStore, MemoryStore, SharedStore};
use crate::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Wraps a durable store and mirrors every write into memory.
///
/// After the first primary failure all reads and writes are served from
/// memory for the rest of the process. Values never written in this process
/// read as absent, so callers see their in-memory defaults.
pub struct FallbackStore {
    primary: SharedStore,
    memory: MemoryStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(primary: SharedStore) -> Self {
        Self {
            primary,
            memory: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the primary store has failed in this process.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn degrade(&self, op: &str, key: &str, error: &AppError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                op,
                key,
                error = %error,
                "Device storage failed, using in-memory storage for this session"
            );
        }
    }
}

impl KeyValueStore for FallbackStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        if self.is_degraded() {
            return self.memory.get(key);
        }
        match self.primary.get(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.degrade("get", key, &e);
                self.memory.get(key)
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.memory.set(key, value)?;
        if self.is_degraded() {
            return Ok(());
        }
        if let Err(e) = self.primary.set(key, value) {
            self.degrade("set", key, &e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, AppError> {
        let in_memory = self.memory.remove(key)?;
        if self.is_degraded() {
            return Ok(in_memory);
        }
        match self.primary.remove(key) {
            Ok(existed) => Ok(existed || in_memory),
            Err(e) => {
                self.degrade("remove", key, &e);
                Ok(in_memory)
            }
        }
    }
}
