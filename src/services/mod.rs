// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - auth, account and browse logic.

pub mod account;
pub mod auth;
pub mod bootstrap;
pub mod browse;
pub mod credentials;
pub mod identity;

pub use account::{AccountService, DeletionStep, ErasureOutcome, ErasureReport};
pub use auth::{AuthCapability, AuthMode, AuthOrchestrator, AuthSnapshot};
pub use bootstrap::{decide_redirect, resolve_redirect, sign_out_target, RedirectTarget};
pub use browse::{BrowseService, ReadingQuery, TrackSummary};
pub use credentials::{BiometricAuthenticator, LocalCredentialStore, NoBiometrics, PinHash};
pub use identity::{AuthChangeEvent, AuthEvent, IdentityClient, SignUpOutcome};
