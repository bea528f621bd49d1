// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication orchestrator.
//!
//! Picks the authentication mode once at startup:
//! - `RemoteActive`: the hosted identity service is configured and answered
//!   the session fetch within the timeout
//! - `LocalActive`: anything else (unconfigured, unreachable, slow, erroring)
//!
//! Mode-specific operations sit behind [`AuthCapability`] so callers never
//! branch on the mode. The PIN flow is available in both modes.
//!
//! Session/user state lives in an [`AuthSnapshot`] published through a
//! `watch` channel. The orchestrator and its listener task are the only
//! writers; every update replaces the whole snapshot.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{AuthUser, Session};
use crate::services::credentials::LocalCredentialStore;
use crate::services::identity::{AuthEvent, IdentityClient, SignUpOutcome};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use validator::Validate;

/// Authentication strategy selected for this app start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    RemoteActive,
    LocalActive,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::RemoteActive => "remote",
            AuthMode::LocalActive => "local",
        }
    }
}

/// Immutable view of the auth state handed to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub mode: AuthMode,
    /// Remote session (always `None` in `LocalActive`)
    pub session: Option<Session>,
    /// True until the first auth-state resolution has been applied
    pub is_loading: bool,
    pub is_pin_setup: bool,
    /// Local PIN/biometric unlock for this session
    pub local_authenticated: bool,
}

impl AuthSnapshot {
    pub fn user(&self) -> Option<&AuthUser> {
        self.session.as_ref().map(|s| &s.user)
    }

    /// Whether the current mode considers the user signed in.
    pub fn is_authenticated(&self) -> bool {
        match self.mode {
            AuthMode::RemoteActive => self.session.is_some(),
            AuthMode::LocalActive => self.local_authenticated,
        }
    }
}

/// Email/password pair checked before any network call.
#[derive(Debug, Validate)]
struct EmailCredentials {
    #[validate(email(message = "Please enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
}

impl EmailCredentials {
    fn checked(email: &str, password: &str) -> Result<Self, AppError> {
        let creds = Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        creds.validate()?;
        Ok(creds)
    }
}

/// Operations whose behaviour depends on the authentication mode.
#[allow(async_fn_in_trait)]
pub trait AuthCapability {
    fn mode(&self) -> AuthMode;

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<Session, AppError>;

    async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AppError>;

    /// Must succeed when nobody is signed in.
    async fn sign_out(&self) -> Result<(), AppError>;
}

/// Hosted identity service.
pub struct RemoteAuth {
    identity: IdentityClient,
}

impl AuthCapability for RemoteAuth {
    fn mode(&self) -> AuthMode {
        AuthMode::RemoteActive
    }

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let creds = EmailCredentials::checked(email, password)?;
        self.identity
            .sign_in_with_password(&creds.email, &creds.password)
            .await
    }

    async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AppError> {
        let creds = EmailCredentials::checked(email, password)?;
        self.identity.sign_up(&creds.email, &creds.password).await
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.identity.sign_out().await;
        Ok(())
    }
}

/// Device-only PIN auth.
pub struct LocalAuth {
    credentials: Arc<LocalCredentialStore>,
}

impl AuthCapability for LocalAuth {
    fn mode(&self) -> AuthMode {
        AuthMode::LocalActive
    }

    async fn sign_in_with_email(&self, _email: &str, _password: &str) -> Result<Session, AppError> {
        Err(AppError::Unsupported("Email sign-in"))
    }

    async fn sign_up_with_email(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<SignUpOutcome, AppError> {
        Err(AppError::Unsupported("Account creation"))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.credentials.set_session_authenticated(false)
    }
}

/// The capability chosen at startup.
enum ActiveAuth {
    Remote(RemoteAuth),
    Local(LocalAuth),
}

impl AuthCapability for ActiveAuth {
    fn mode(&self) -> AuthMode {
        match self {
            ActiveAuth::Remote(remote) => remote.mode(),
            ActiveAuth::Local(local) => local.mode(),
        }
    }

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<Session, AppError> {
        match self {
            ActiveAuth::Remote(remote) => remote.sign_in_with_email(email, password).await,
            ActiveAuth::Local(local) => local.sign_in_with_email(email, password).await,
        }
    }

    async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AppError> {
        match self {
            ActiveAuth::Remote(remote) => remote.sign_up_with_email(email, password).await,
            ActiveAuth::Local(local) => local.sign_up_with_email(email, password).await,
        }
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        match self {
            ActiveAuth::Remote(remote) => remote.sign_out().await,
            ActiveAuth::Local(local) => local.sign_out().await,
        }
    }
}

/// Owns the auth state for the lifetime of the app.
pub struct AuthOrchestrator {
    active: ActiveAuth,
    credentials: Arc<LocalCredentialStore>,
    state: Arc<watch::Sender<AuthSnapshot>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AuthOrchestrator {
    /// Determine the auth mode and the initial state. Never fails: any remote
    /// problem degrades to `LocalActive`.
    pub async fn initialize(
        config: &Config,
        identity: Option<IdentityClient>,
        credentials: Arc<LocalCredentialStore>,
    ) -> Self {
        let Some(identity) = identity else {
            tracing::info!("Remote identity service not configured, using local PIN auth");
            return Self::local(credentials);
        };

        // Subscribe first so nothing emitted during the fetch is missed.
        let events = identity.subscribe();

        match tokio::time::timeout(config.session_timeout, identity.get_session()).await {
            Ok(Ok(session)) => {
                tracing::info!(
                    has_session = session.is_some(),
                    "Remote identity service available"
                );
                return Self::remote(identity, events, session, credentials);
            }
            Ok(Err(e)) if e.is_fallback_trigger() => {
                tracing::warn!(
                    error = %e,
                    "Remote identity service unavailable, falling back to local PIN auth"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(
                    error = %e,
                    "Remote session retrieval failed, falling back to local PIN auth"
                );
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = config.session_timeout.as_millis() as u64,
                    "Remote session retrieval timed out, falling back to local PIN auth"
                );
            }
        }

        Self::local(credentials)
    }

    fn remote(
        identity: IdentityClient,
        events: broadcast::Receiver<AuthEvent>,
        session: Option<Session>,
        credentials: Arc<LocalCredentialStore>,
    ) -> Self {
        let (state, _) = watch::channel(AuthSnapshot {
            mode: AuthMode::RemoteActive,
            session,
            is_loading: false,
            is_pin_setup: credentials.is_pin_setup(),
            local_authenticated: credentials.is_session_authenticated(),
        });
        let state = Arc::new(state);
        let listener = spawn_listener(identity.clone(), events, state.clone());

        Self {
            active: ActiveAuth::Remote(RemoteAuth { identity }),
            credentials,
            state,
            listener: Mutex::new(Some(listener)),
        }
    }

    fn local(credentials: Arc<LocalCredentialStore>) -> Self {
        let is_pin_setup = credentials.is_pin_setup();
        tracing::info!(is_pin_setup, "Local PIN auth active");

        let (state, _) = watch::channel(AuthSnapshot {
            mode: AuthMode::LocalActive,
            session: None,
            is_loading: false,
            is_pin_setup,
            local_authenticated: credentials.is_session_authenticated(),
        });

        Self {
            active: ActiveAuth::Local(LocalAuth {
                credentials: credentials.clone(),
            }),
            credentials,
            state: Arc::new(state),
            listener: Mutex::new(None),
        }
    }

    // ─── Readers ─────────────────────────────────────────────────────────────

    pub fn mode(&self) -> AuthMode {
        self.active.mode()
    }

    /// Receive every future snapshot replacement.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.state.borrow().user().cloned()
    }

    pub fn is_pin_setup(&self) -> bool {
        self.state.borrow().is_pin_setup
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// The identity client, when running in `RemoteActive`.
    pub fn identity(&self) -> Option<&IdentityClient> {
        match &self.active {
            ActiveAuth::Remote(remote) => Some(&remote.identity),
            ActiveAuth::Local(_) => None,
        }
    }

    // ─── Remote Account Operations ───────────────────────────────────────────

    pub async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<(), AppError> {
        match self.active.sign_in_with_email(email, password).await {
            Ok(_) => {
                self.sync_remote_session();
                Ok(())
            }
            Err(e) => {
                tracing::info!(error = %e, "Sign in failed");
                Err(e)
            }
        }
    }

    pub async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignUpOutcome, AppError> {
        let outcome = self.active.sign_up_with_email(email, password).await;
        match &outcome {
            Ok(_) => self.sync_remote_session(),
            Err(e) => tracing::info!(error = %e, "Sign up failed"),
        }
        outcome
    }

    /// Sign out of the active mode. Idempotent; failures are logged.
    pub async fn sign_out(&self) {
        if let Err(e) = self.active.sign_out().await {
            tracing::warn!(error = %e, mode = self.mode().as_str(), "Sign out incomplete");
        }

        match self.mode() {
            AuthMode::RemoteActive => self.sync_remote_session(),
            AuthMode::LocalActive => self.state.send_modify(|s| s.local_authenticated = false),
        }
    }

    // ─── PIN / Biometric Operations ──────────────────────────────────────────

    /// Unlock with the device PIN.
    pub fn authenticate_with_pin(&self, pin: &str) -> bool {
        if !self.credentials.verify_pin(pin) {
            tracing::info!("PIN rejected");
            return false;
        }
        self.mark_unlocked();
        true
    }

    /// Configure the device PIN. The user is unlocked afterwards.
    pub fn setup_pin(&self, pin: &str) -> Result<(), AppError> {
        self.credentials.setup_pin(pin)?;
        self.state.send_modify(|s| s.is_pin_setup = true);
        self.mark_unlocked();
        Ok(())
    }

    /// Remove the device PIN; the next start goes to PIN setup.
    pub fn reset_pin(&self) -> Result<(), AppError> {
        self.credentials.reset_pin()?;
        self.state.send_modify(|s| {
            s.is_pin_setup = false;
            s.local_authenticated = false;
        });
        Ok(())
    }

    pub fn authenticate_with_biometrics(&self) -> bool {
        if !self.credentials.authenticate_with_biometrics() {
            return false;
        }
        self.mark_unlocked();
        true
    }

    /// Stop listening for remote auth-state changes.
    pub fn shutdown(&self) {
        let handle = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!("Auth state listener stopped");
        }
    }

    fn mark_unlocked(&self) {
        if let Err(e) = self.credentials.set_session_authenticated(true) {
            tracing::warn!(error = %e, "Failed to persist session flag");
        }
        self.state.send_modify(|s| s.local_authenticated = true);
    }

    fn sync_remote_session(&self) {
        if let Some(identity) = self.identity() {
            apply_session(&self.state, identity.current_session());
        }
    }
}

impl Drop for AuthOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forward identity notifications into the snapshot, in order.
///
/// Each notification replaces the session with the identity client's current
/// one, so a late event can never resurrect a session already cleared.
fn spawn_listener(
    identity: IdentityClient,
    mut events: broadcast::Receiver<AuthEvent>,
    state: Arc<watch::Sender<AuthSnapshot>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(
                        kind = ?event.kind,
                        has_session = event.session.is_some(),
                        "Auth state changed"
                    );
                    apply_session(&state, identity.current_session());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth listener lagged, resynchronising");
                    apply_session(&state, identity.current_session());
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn apply_session(state: &watch::Sender<AuthSnapshot>, session: Option<Session>) {
    state.send_modify(|s| {
        s.session = session;
        s.is_loading = false;
    });
}
