// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote identity client for the hosted auth service.
//!
//! Handles:
//! - Email/password sign-in and sign-up
//! - Session persistence on the device and restore at startup
//! - Token refresh when the access token is about to expire
//! - Sign-out and admin deletion of the identity record
//! - Auth-state change notifications, delivered in emission order

use crate::config::Config;
use crate::error::AppError;
use crate::models::{AuthUser, Session};
use crate::storage::{keys, SharedStore};
use crate::time_utils::expiry_from_token;
use chrono::{Duration, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Mutex};

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Buffered auth events per subscriber before it is considered lagging.
const AUTH_EVENT_CAPACITY: usize = 32;

/// Per-request timeout for the HTTP client.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Kind of auth-state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserDeleted,
}

/// Auth-state notification. Carries the complete new session state.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Result of a successful sign-up request.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Account created and signed in immediately.
    SignedIn(Session),
    /// Account created; the user must confirm their email before signing in.
    ConfirmationRequired(AuthUser),
}

/// Client for the hosted identity service.
///
/// Cheap to clone; all clones share the same session and event channel.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    /// `{SUPABASE_URL}/auth/v1`
    auth_url: String,
    api_key: String,
    service_role_key: Option<String>,
    store: SharedStore,
    /// The single active session for this process.
    session: RwLock<Option<Session>>,
    /// Serializes token refreshes.
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl IdentityClient {
    /// Create a client. Fails if the endpoint or key is empty.
    pub fn new(config: &Config, store: SharedStore) -> Result<Self, AppError> {
        if !config.is_remote_configured() {
            return Err(AppError::Configuration(
                "Remote identity service is not configured".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                auth_url: format!("{}/auth/v1", config.supabase_url.trim_end_matches('/')),
                api_key: config.supabase_anon_key.clone(),
                service_role_key: config.supabase_service_role_key.clone(),
                store,
                session: RwLock::new(None),
                refresh_lock: Mutex::new(()),
                events,
            }),
        })
    }

    /// Subscribe to auth-state changes emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// The in-memory session, without any I/O.
    pub fn current_session(&self) -> Option<Session> {
        match self.inner.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // ─── Session Retrieval ───────────────────────────────────────────────────

    /// Resolve the current session, restoring it from device storage if needed.
    ///
    /// - No stored session: probe the service for reachability, return `None`
    /// - Stored session near expiry: refresh it
    /// - Otherwise: verify it with the server; a rejected session is cleared
    ///
    /// Network failures are returned as `Configuration` errors so the caller
    /// can fall back to local auth.
    pub async fn get_session(&self) -> Result<Option<Session>, AppError> {
        let stored = self.current_session().or_else(|| self.load_persisted());

        let Some(session) = stored else {
            self.health_check().await?;
            self.emit(AuthChangeEvent::InitialSession, None);
            return Ok(None);
        };

        if session.expires_within(Utc::now(), refresh_margin()) {
            tracing::info!(user_id = %session.user_id(), "Stored session expiring, refreshing");
            self.replace_session(Some(session));
            return match self.refresh_session().await {
                Ok(session) => Ok(Some(session)),
                Err(e) if e.is_session_expired() => Ok(None),
                Err(e) => Err(e),
            };
        }

        match self.fetch_user(&session.access_token).await {
            Ok(user) => {
                let session = Session { user, ..session };
                self.replace_session(Some(session.clone()));
                self.persist(Some(&session));
                self.emit(AuthChangeEvent::InitialSession, Some(session.clone()));
                Ok(Some(session))
            }
            Err(e) if e.is_session_expired() => {
                tracing::info!(user_id = %session.user_id(), "Stored session rejected by server");
                self.set_session(None, AuthChangeEvent::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Get a valid (non-expiring) access token, refreshing if needed.
    pub async fn access_token(&self) -> Result<String, AppError> {
        let margin = refresh_margin();

        let session = self.current_session().ok_or(AppError::Unauthorized)?;
        if !session.expires_within(Utc::now(), margin) {
            return Ok(session.access_token);
        }

        let _guard = self.inner.refresh_lock.lock().await;

        // Another task may have refreshed while we were waiting.
        let session = self.current_session().ok_or(AppError::Unauthorized)?;
        if !session.expires_within(Utc::now(), margin) {
            return Ok(session.access_token);
        }

        let refreshed = self.exchange_refresh_token(&session.refresh_token).await?;
        Ok(refreshed.access_token)
    }

    /// Force a token refresh for the current session.
    pub async fn refresh_session(&self) -> Result<Session, AppError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let session = self.current_session().ok_or(AppError::Unauthorized)?;
        self.exchange_refresh_token(&session.refresh_token).await
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Session, AppError> {
        let response = self
            .request(Method::POST, "/token")
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AppError::Configuration(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let err = auth_failure(response).await;
            if matches!(err, AppError::Authentication(_)) {
                tracing::info!(error = %err, "Refresh token rejected, clearing session");
                self.set_session(None, AuthChangeEvent::SignedOut);
                return Err(AppError::Authentication(
                    AppError::SESSION_EXPIRED.to_string(),
                ));
            }
            return Err(err);
        }

        let session = parse_json::<TokenResponse>(response).await?.into_session();
        self.set_session(Some(session.clone()), AuthChangeEvent::TokenRefreshed);
        tracing::info!(user_id = %session.user_id(), "Session refreshed");
        Ok(session)
    }

    // ─── Sign In / Sign Up / Sign Out ────────────────────────────────────────

    /// Sign in with email and password.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        tracing::debug!(email, "Attempting sign in");

        let response = self
            .request(Method::POST, "/token")
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Configuration(format!("Sign-in request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(auth_failure(response).await);
        }

        let session = parse_json::<TokenResponse>(response).await?.into_session();
        self.set_session(Some(session.clone()), AuthChangeEvent::SignedIn);
        tracing::info!(user_id = %session.user_id(), "Sign in successful");
        Ok(session)
    }

    /// Create an account with email and password.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AppError> {
        tracing::debug!(email, "Attempting sign up");

        let response = self
            .request(Method::POST, "/signup")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Configuration(format!("Sign-up request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(auth_failure(response).await);
        }

        let body: serde_json::Value = parse_json(response).await?;

        // With email confirmation enabled the service returns only the user.
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(body)
                .map_err(|e| AppError::Backend(format!("Invalid sign-up response: {}", e)))?
                .into_session();
            self.set_session(Some(session.clone()), AuthChangeEvent::SignedIn);
            tracing::info!(user_id = %session.user_id(), "Sign up successful, signed in");
            return Ok(SignUpOutcome::SignedIn(session));
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user: AuthUser = serde_json::from_value(user_value)
            .map_err(|e| AppError::Backend(format!("Invalid sign-up response: {}", e)))?;
        tracing::info!(user_id = %user.id, "Sign up successful, confirmation required");
        Ok(SignUpOutcome::ConfirmationRequired(user))
    }

    /// Sign out. Local state is always cleared; server-side failures are only logged.
    ///
    /// Calling this with no active session is a no-op.
    pub async fn sign_out(&self) {
        let Some(session) = self.current_session().or_else(|| self.load_persisted()) else {
            return;
        };

        self.set_session(None, AuthChangeEvent::SignedOut);

        let result = self
            .request(Method::POST, "/logout")
            .bearer_auth(&session.access_token)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(user_id = %session.user_id(), "Signed out");
            }
            Ok(response) => {
                tracing::warn!(
                    status = %response.status(),
                    user_id = %session.user_id(),
                    "Server sign-out failed, local session cleared anyway"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id = %session.user_id(),
                    "Server sign-out unreachable, local session cleared anyway"
                );
            }
        }
    }

    /// Delete the identity record for `user_id`.
    ///
    /// Uses the service-role key when configured, otherwise the user's own token
    /// (which the service may refuse).
    pub async fn delete_user(&self, user_id: &str) -> Result<(), AppError> {
        let bearer = match &self.inner.service_role_key {
            Some(key) => key.clone(),
            None => self.access_token().await?,
        };

        let path = format!("/admin/users/{}", urlencoding::encode(user_id));
        let response = self
            .request(Method::DELETE, &path)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| AppError::Configuration(format!("Delete user request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(auth_failure(response).await);
        }

        tracing::info!(user_id, "Identity record deleted");
        self.emit(AuthChangeEvent::UserDeleted, None);
        Ok(())
    }

    // ─── Server Calls ────────────────────────────────────────────────────────

    /// Fetch the user for an access token (server-side session verification).
    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, AppError> {
        let response = self
            .request(Method::GET, "/user")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Configuration(format!("Session check failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => parse_json(response).await,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Authentication(
                AppError::SESSION_EXPIRED.to_string(),
            )),
            status => Err(AppError::Backend(format!("Session check returned HTTP {}", status))),
        }
    }

    /// Check that the identity service is reachable.
    async fn health_check(&self) -> Result<(), AppError> {
        let response = self
            .request(Method::GET, "/health")
            .send()
            .await
            .map_err(|e| AppError::Configuration(format!("Identity service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Configuration(format!(
                "Identity service health check returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.inner
            .http
            .request(method, format!("{}{}", self.inner.auth_url, path))
            .header("apikey", &self.inner.api_key)
    }

    // ─── Session State ───────────────────────────────────────────────────────

    /// Replace the session, persist it and notify subscribers.
    fn set_session(&self, session: Option<Session>, kind: AuthChangeEvent) {
        self.replace_session(session.clone());
        self.persist(session.as_ref());
        self.emit(kind, session);
    }

    fn replace_session(&self, session: Option<Session>) {
        match self.inner.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        // No subscribers is fine.
        let _ = self.inner.events.send(AuthEvent { kind, session });
    }

    fn persist(&self, session: Option<&Session>) {
        let result = match session {
            Some(session) => serde_json::to_string(session)
                .map_err(|e| AppError::Internal(e.into()))
                .and_then(|json| self.inner.store.set(keys::REMOTE_SESSION, &json)),
            None => self.inner.store.remove(keys::REMOTE_SESSION).map(|_| ()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }

    fn load_persisted(&self) -> Option<Session> {
        let raw = match self.inner.store.get(keys::REMOTE_SESSION) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted session");
                let _ = self.inner.store.remove(keys::REMOTE_SESSION);
                None
            }
        }
    }
}

fn refresh_margin() -> Duration {
    Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
}

/// Token grant response from the identity service.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            expires_at: expiry_from_token(self.expires_at, self.expires_in, Utc::now()),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
        }
    }
}

/// Error body shapes used by the identity service.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .filter(|m| !m.trim().is_empty())
    }
}

/// Convert a failed auth response into an error carrying the server's message.
async fn auth_failure(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message);

    if status.is_server_error() {
        tracing::warn!(status = %status, body = %body, "Identity service error");
        return AppError::Backend(format!("HTTP {}: {}", status, body));
    }

    AppError::Authentication(message.unwrap_or_else(|| AppError::UNEXPECTED.to_string()))
}

async fn parse_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    response
        .json()
        .await
        .map_err(|e| AppError::Backend(format!("JSON parse error: {}", e)))
}
