//! Application configuration loaded from environment variables.
//!
//! The hosted backend is optional: an empty URL or key leaves the remote
//! identity service unconfigured and the app runs on local PIN auth only.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on the startup session fetch.
const DEFAULT_SESSION_TIMEOUT_MS: u64 = 5_000;

/// Default PBKDF2 iteration count for new PIN hashes.
const DEFAULT_PIN_HASH_ITERATIONS: u32 = 100_000;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hosted backend base URL (e.g. https://<ref>.supabase.co)
    pub supabase_url: String,
    /// Public (anon) API key sent with every backend request
    pub supabase_anon_key: String,
    /// Admin key for identity deletion, if this deployment has one
    pub supabase_service_role_key: Option<String>,
    /// Directory for the device-local key-value file
    pub data_dir: PathBuf,
    /// Bound on remote session retrieval at startup
    pub session_timeout: Duration,
    /// PBKDF2 iterations used when hashing a new PIN
    pub pin_hash_iterations: u32,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: None,
            data_dir: PathBuf::from(".track-readings"),
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            pin_hash_iterations: 1_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_default(),
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            data_dir: env::var("TRACK_READINGS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".track-readings")),
            session_timeout: Duration::from_millis(parse_var(
                "SESSION_TIMEOUT_MS",
                DEFAULT_SESSION_TIMEOUT_MS,
            )?),
            pin_hash_iterations: parse_nonzero_var(
                "PIN_HASH_ITERATIONS",
                DEFAULT_PIN_HASH_ITERATIONS,
            )?,
        })
    }

    /// Whether the remote identity service has a non-empty endpoint and key.
    pub fn is_remote_configured(&self) -> bool {
        !self.supabase_url.trim().is_empty() && !self.supabase_anon_key.trim().is_empty()
    }

    /// Path of the key-value file inside the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("device-store.json")
    }
}

/// Parse an optional numeric environment variable.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Like [`parse_var`], but zero is rejected.
fn parse_nonzero_var(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match parse_var(name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
