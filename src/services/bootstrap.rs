// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Launch-time redirect decision.

use crate::services::auth::AuthMode;
use crate::storage::{keys, KeyValueStore};
use std::fmt;

/// Entry screen the app is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    PinSetup,
    PinEntry,
    MainApp,
    SignIn,
}

impl RedirectTarget {
    /// Navigation route for this target.
    pub fn route(self) -> &'static str {
        match self {
            RedirectTarget::PinSetup => "/auth/setup-pin",
            RedirectTarget::PinEntry => "/auth/enter-pin",
            RedirectTarget::MainApp => "/(tabs)/tracks",
            RedirectTarget::SignIn => "/auth/login",
        }
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route())
    }
}

/// Pure decision over the two persisted flags.
///
/// Without a PIN the session flag is ignored.
pub fn decide_redirect(is_pin_setup: bool, session_authenticated: bool) -> RedirectTarget {
    match (is_pin_setup, session_authenticated) {
        (false, _) => RedirectTarget::PinSetup,
        (true, true) => RedirectTarget::MainApp,
        (true, false) => RedirectTarget::PinEntry,
    }
}

/// Read both flags from the store and decide. Nothing is cached between
/// calls; an unreadable flag counts as unset.
pub fn resolve_redirect(store: &dyn KeyValueStore) -> RedirectTarget {
    let is_pin_setup = read_flag(store, keys::PIN_SETUP);
    let session_authenticated = read_flag(store, keys::SESSION_AUTHENTICATED);

    let target = decide_redirect(is_pin_setup, session_authenticated);
    tracing::debug!(
        is_pin_setup,
        session_authenticated,
        route = target.route(),
        "Resolved launch redirect"
    );
    target
}

/// Where to go after signing out in the given mode.
pub fn sign_out_target(mode: AuthMode) -> RedirectTarget {
    match mode {
        AuthMode::RemoteActive => RedirectTarget::SignIn,
        AuthMode::LocalActive => RedirectTarget::PinEntry,
    }
}

fn read_flag(store: &dyn KeyValueStore, key: &str) -> bool {
    store.get_flag(key).unwrap_or_else(|e| {
        tracing::warn!(key, error = %e, "Failed to read launch flag, assuming unset");
        false
    })
}
