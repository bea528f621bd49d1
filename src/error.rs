// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent user-facing messages.

use crate::services::account::DeletionStep;

/// Application error type.
///
/// Every remote or local failure is converted into one of these variants at the
/// orchestration boundary; nothing below the presentation layer panics.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Remote service unreachable or misconfigured. Triggers local fallback.
    #[error("Remote service unavailable: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Account deletion failed at {step}: {message}")]
    Deletion { step: DeletionStep, message: String },

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not available in this authentication mode: {0}")]
    Unsupported(&'static str),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message carried by `Authentication` when the access/refresh token is no longer accepted.
    pub const SESSION_EXPIRED: &'static str = "Session expired";

    /// Fallback message when the identity service gives no usable reason.
    pub const UNEXPECTED: &'static str = "An unexpected error occurred";

    /// Check if this error means the remote session is no longer valid.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, AppError::Authentication(msg) if msg == Self::SESSION_EXPIRED)
            || matches!(self, AppError::Unauthorized)
    }

    /// Check if this error should make startup fall back to local authentication.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_) | AppError::Backend(_) | AppError::Internal(_)
        )
    }

    /// Text suitable for showing to the user.
    ///
    /// Internal details (storage paths, HTTP bodies) are logged, not shown.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Configuration(_) => {
                "Unable to reach the server. Continuing in offline mode.".to_string()
            }
            AppError::Authentication(msg) => msg.clone(),
            AppError::Unauthorized => "Please sign in again.".to_string(),
            AppError::Deletion { step, message } => {
                tracing::error!(%step, error = %message, "Account deletion failed");
                "An error occurred while deleting your account. Please try again or contact support."
                    .to_string()
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Local storage error");
                "Unable to save settings on this device.".to_string()
            }
            AppError::Backend(msg) => {
                tracing::error!(error = %msg, "Backend error");
                "The server could not complete the request. Please try again.".to_string()
            }
            AppError::NotFound(what) => format!("{} was not found.", what),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Unsupported(operation) => {
                format!("{} is not available while offline.", operation)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                Self::UNEXPECTED.to_string()
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
