// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device-local key-value storage.
//!
//! Holds the PIN hash, the "PIN configured" flag, the transient
//! "session authenticated" flag and the persisted remote session.

pub mod fallback;
pub mod file;
pub mod memory;

pub use fallback::FallbackStore;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::AppError;
use std::sync::Arc;

/// Storage keys as constants. No schema versioning.
pub mod keys {
    /// "true" once a PIN has been configured
    pub const PIN_SETUP: &str = "@pin_setup";
    /// Salted PIN hash
    pub const PIN_HASH: &str = "@app_pin";
    /// "true" while the local session is unlocked
    pub const SESSION_AUTHENTICATED: &str = "@session_authenticated";
    /// Persisted remote session (JSON)
    pub const REMOTE_SESSION: &str = "@supabase_session";
}

/// Synchronous key-value storage backend.
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value by key.
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Store a value under a key, replacing any existing value.
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Remove a key. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, AppError>;

    /// Read a boolean flag stored as "true"/"false". Absent means false.
    fn get_flag(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.get(key)?.as_deref() == Some("true"))
    }

    /// Write a boolean flag as "true"/"false".
    fn set_flag(&self, key: &str, value: bool) -> Result<(), AppError> {
        self.set(key, if value { "true" } else { "false" })
    }
}

/// Shared handle to a storage backend.
pub type SharedStore = Arc<dyn KeyValueStore>;
