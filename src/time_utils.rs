// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Token lifetime assumed when the identity service sends none we can use.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Resolve a token expiry from the absolute `expires_at` (unix seconds) the
/// identity service usually sends, or from the relative `expires_in`.
///
/// Out-of-range values fall back to the default lifetime.
pub fn expiry_from_token(
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(expiry) = expires_at.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
        return expiry;
    }

    expires_in
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .or_else(|| {
            if expires_in.is_some() {
                tracing::warn!(expires_in = ?expires_in, "Unusable token lifetime, assuming default");
            }
            now.checked_add_signed(Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
        })
        .unwrap_or(now)
}
