// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local PIN credential store.
//!
//! PINs are stored as salted PBKDF2-HMAC-SHA256 hashes:
//! `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.
//! Values written by older app versions (plain PIN) are still accepted and
//! upgraded to a salted hash on the first successful verification.

use crate::error::AppError;
use crate::storage::{keys, SharedStore};
use base64::{engine::general_purpose::STANDARD_NO_PAD as BASE64, Engine as _};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const PIN_MIN_DIGITS: usize = 4;
const PIN_MAX_DIGITS: usize = 8;

/// Device biometric prompt. The platform implementation lives outside this crate.
pub trait BiometricAuthenticator: Send + Sync {
    /// Whether the device has enrolled biometrics.
    fn is_available(&self) -> bool;

    /// Prompt the user. Returns true on a successful match.
    fn authenticate(&self, reason: &str) -> bool;
}

/// Used when the platform offers no biometric hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBiometrics;

impl BiometricAuthenticator for NoBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    fn authenticate(&self, _reason: &str) -> bool {
        false
    }
}

/// Parsed PIN hash record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinHash {
    iterations: NonZeroU32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl PinHash {
    /// Hash `pin` with a fresh random salt.
    pub fn derive(
        pin: &str,
        iterations: NonZeroU32,
        rng: &dyn SecureRandom,
    ) -> Result<Self, AppError> {
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill(&mut salt)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))?;

        let mut hash = vec![0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            pin.as_bytes(),
            &mut hash,
        );

        Ok(Self {
            iterations,
            salt,
            hash,
        })
    }

    /// Constant-time check of `pin` against this hash.
    pub fn verify(&self, pin: &str) -> bool {
        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &self.salt,
            pin.as_bytes(),
            &self.hash,
        )
        .is_ok()
    }
}

impl fmt::Display for PinHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}${}${}${}",
            HASH_SCHEME,
            self.iterations,
            BASE64.encode(&self.salt),
            BASE64.encode(&self.hash)
        )
    }
}

impl FromStr for PinHash {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::Storage("Malformed PIN hash".to_string());

        let mut parts = s.split('$');
        if parts.next() != Some(HASH_SCHEME) {
            return Err(invalid());
        }
        let iterations = parts
            .next()
            .and_then(|v| v.parse::<u32>().ok())
            .and_then(NonZeroU32::new)
            .ok_or_else(invalid)?;
        let salt = parts
            .next()
            .and_then(|v| BASE64.decode(v).ok())
            .ok_or_else(invalid)?;
        let hash = parts
            .next()
            .and_then(|v| BASE64.decode(v).ok())
            .filter(|h| h.len() == HASH_LEN)
            .ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            iterations,
            salt,
            hash,
        })
    }
}

/// Validate PIN format: 4-8 ASCII digits.
pub fn validate_pin(pin: &str) -> Result<(), AppError> {
    let len_ok = (PIN_MIN_DIGITS..=PIN_MAX_DIGITS).contains(&pin.len());
    if !len_ok || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::BadRequest(format!(
            "PIN must be {}-{} digits",
            PIN_MIN_DIGITS, PIN_MAX_DIGITS
        )));
    }
    Ok(())
}

/// Persists and checks the device PIN and the transient session flag.
///
/// Writes come only from the single foreground user flow, so no locking
/// beyond what the store itself does.
pub struct LocalCredentialStore {
    store: SharedStore,
    iterations: NonZeroU32,
    rng: SystemRandom,
    biometrics: Arc<dyn BiometricAuthenticator>,
}

impl LocalCredentialStore {
    pub fn new(store: SharedStore, iterations: u32) -> Self {
        let iterations = NonZeroU32::new(iterations).unwrap_or_else(|| {
            tracing::warn!("PIN hash iteration count of 0 raised to 1");
            NonZeroU32::MIN
        });
        Self {
            store,
            iterations,
            rng: SystemRandom::new(),
            biometrics: Arc::new(NoBiometrics),
        }
    }

    /// Use a platform biometric implementation.
    pub fn with_biometrics(mut self, biometrics: Arc<dyn BiometricAuthenticator>) -> Self {
        self.biometrics = biometrics;
        self
    }

    /// Whether a PIN has been configured. Storage failures read as "not configured".
    pub fn is_pin_setup(&self) -> bool {
        self.read_flag(keys::PIN_SETUP)
    }

    /// Store a salted hash of `pin` and mark the PIN as configured.
    ///
    /// An existing PIN is only cleared by [`reset_pin`](Self::reset_pin).
    pub fn setup_pin(&self, pin: &str) -> Result<(), AppError> {
        validate_pin(pin)?;
        if self.is_pin_setup() {
            tracing::warn!("Refusing to replace configured PIN");
            return Err(AppError::BadRequest("PIN already configured".to_string()));
        }

        let hash = PinHash::derive(pin, self.iterations, &self.rng)?;
        self.store.set(keys::PIN_HASH, &hash.to_string())?;
        self.store.set_flag(keys::PIN_SETUP, true)?;

        tracing::info!("PIN configured");
        Ok(())
    }

    /// Check `pin` against the stored hash.
    pub fn verify_pin(&self, pin: &str) -> bool {
        let stored = match self.store.get(keys::PIN_HASH) {
            Ok(Some(stored)) => stored,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read PIN hash");
                return false;
            }
        };

        if stored.starts_with(HASH_SCHEME) {
            return match stored.parse::<PinHash>() {
                Ok(hash) => hash.verify(pin),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored PIN hash unreadable");
                    false
                }
            };
        }

        // Legacy plain value.
        let matches: bool = stored.as_bytes().ct_eq(pin.as_bytes()).into();
        if matches {
            match PinHash::derive(pin, self.iterations, &self.rng) {
                Ok(hash) => match self.store.set(keys::PIN_HASH, &hash.to_string()) {
                    Ok(()) => tracing::info!("Upgraded legacy PIN to salted hash"),
                    Err(e) => tracing::warn!(error = %e, "Failed to upgrade legacy PIN"),
                },
                Err(e) => tracing::warn!(error = %e, "Failed to upgrade legacy PIN"),
            }
        }
        matches
    }

    /// Remove the PIN, the configured flag and the session flag.
    pub fn reset_pin(&self) -> Result<(), AppError> {
        self.store.remove(keys::PIN_HASH)?;
        self.store.remove(keys::PIN_SETUP)?;
        self.store.remove(keys::SESSION_AUTHENTICATED)?;
        tracing::info!("PIN reset");
        Ok(())
    }

    /// Prompt for biometrics. Requires a configured PIN to fall back to.
    pub fn authenticate_with_biometrics(&self) -> bool {
        if !self.is_pin_setup() || !self.biometrics.is_available() {
            return false;
        }
        self.biometrics.authenticate("Unlock Track Readings")
    }

    pub fn is_session_authenticated(&self) -> bool {
        self.read_flag(keys::SESSION_AUTHENTICATED)
    }

    pub fn set_session_authenticated(&self, authenticated: bool) -> Result<(), AppError> {
        if authenticated {
            self.store.set_flag(keys::SESSION_AUTHENTICATED, true)
        } else {
            self.store.remove(keys::SESSION_AUTHENTICATED).map(|_| ())
        }
    }

    fn read_flag(&self, key: &str) -> bool {
        self.store.get_flag(key).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Failed to read flag, assuming false");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn credentials() -> (Arc<MemoryStore>, LocalCredentialStore) {
        let store = Arc::new(MemoryStore::new());
        let creds = LocalCredentialStore::new(store.clone(), 1_000);
        (store, creds)
    }

    struct AlwaysMatch;

    impl BiometricAuthenticator for AlwaysMatch {
        fn is_available(&self) -> bool {
            true
        }
        fn authenticate(&self, _reason: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_setup_then_verify() {
        let (store, creds) = credentials();
        assert!(!creds.is_pin_setup());

        creds.setup_pin("1234").unwrap();

        assert!(creds.is_pin_setup());
        assert!(creds.verify_pin("1234"));
        assert!(!creds.verify_pin("0000"));

        // Never stored in the clear.
        let stored = store.get(keys::PIN_HASH).unwrap().unwrap();
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(!stored.contains("1234"));
    }

    #[test]
    fn test_second_setup_keeps_original_pin() {
        let (store, creds) = credentials();
        creds.setup_pin("1234").unwrap();
        let original = store.get(keys::PIN_HASH).unwrap();

        let err = creds.setup_pin("5678").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "PIN already configured"));
        assert_eq!(store.get(keys::PIN_HASH).unwrap(), original);
        assert!(creds.verify_pin("1234"));
        assert!(!creds.verify_pin("5678"));

        creds.reset_pin().unwrap();
        creds.setup_pin("5678").unwrap();
        assert!(creds.verify_pin("5678"));
    }

    #[test]
    fn test_same_pin_gets_distinct_salts() {
        let rng = SystemRandom::new();
        let iterations = NonZeroU32::new(1_000).unwrap();
        let a = PinHash::derive("1234", iterations, &rng).unwrap();
        let b = PinHash::derive("1234", iterations, &rng).unwrap();
        assert_ne!(a.to_string(), b.to_string());
        assert!(a.verify("1234") && b.verify("1234"));
    }

    #[test]
    fn test_hash_format_parses_back() {
        let rng = SystemRandom::new();
        let hash = PinHash::derive("987654", NonZeroU32::new(10).unwrap(), &rng).unwrap();
        let parsed: PinHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);

        assert!("pbkdf2-sha256$0$AAAA$AAAA".parse::<PinHash>().is_err());
        assert!("sha1$10$AAAA$AAAA".parse::<PinHash>().is_err());
        assert!(format!("{}$extra", hash).parse::<PinHash>().is_err());
    }

    #[test]
    fn test_invalid_pins_rejected() {
        let (_, creds) = credentials();
        for pin in ["", "123", "123456789", "12a4", "１２３４"] {
            assert!(
                matches!(creds.setup_pin(pin), Err(AppError::BadRequest(_))),
                "pin {:?} should be rejected",
                pin
            );
        }
        assert!(!creds.is_pin_setup());
    }

    #[test]
    fn test_legacy_plain_pin_is_upgraded() {
        let (store, creds) = credentials();
        store.set(keys::PIN_HASH, "4321").unwrap();
        store.set_flag(keys::PIN_SETUP, true).unwrap();

        assert!(!creds.verify_pin("1111"));
        assert_eq!(store.get(keys::PIN_HASH).unwrap().as_deref(), Some("4321"));

        assert!(creds.verify_pin("4321"));
        let upgraded = store.get(keys::PIN_HASH).unwrap().unwrap();
        assert!(upgraded.starts_with("pbkdf2-sha256$"));
        assert!(creds.verify_pin("4321"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let (_, creds) = credentials();
        creds.setup_pin("1234").unwrap();
        creds.set_session_authenticated(true).unwrap();

        creds.reset_pin().unwrap();

        assert!(!creds.is_pin_setup());
        assert!(!creds.is_session_authenticated());
        assert!(!creds.verify_pin("1234"));
    }

    #[test]
    fn test_biometrics_require_pin_and_hardware() {
        let (_, creds) = credentials();
        assert!(!creds.authenticate_with_biometrics());

        let store = Arc::new(MemoryStore::new());
        let creds = LocalCredentialStore::new(store, 1_000).with_biometrics(Arc::new(AlwaysMatch));
        assert!(!creds.authenticate_with_biometrics());
        creds.setup_pin("2468").unwrap();
        assert!(creds.authenticate_with_biometrics());
    }
}
