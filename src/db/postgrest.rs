// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hosted backend data client with typed operations.
//!
//! Provides high-level operations for:
//! - Tracks (racing venues owned by a user)
//! - Readings (per-lane measurements taken at a track)
//! - User-scoped row deletion and counting for account erasure
//!
//! Rows are addressed through the REST interface at `/rest/v1/{table}`
//! using `column=eq.value` filters. Every request carries the signed-in
//! user's access token, refreshed through the identity client as needed.

use crate::config::Config;
use crate::db::collections;
use crate::error::AppError;
use crate::models::{NewReading, NewTrack, Reading, Track};
use crate::services::identity::IdentityClient;
use reqwest::{Method, StatusCode};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use validator::Validate;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Backend data client.
#[derive(Clone)]
pub struct SupabaseDb {
    client: Option<Connection>,
}

#[derive(Clone)]
struct Connection {
    http: reqwest::Client,
    /// `{SUPABASE_URL}/rest/v1`
    rest_url: String,
    api_key: String,
    identity: IdentityClient,
}

impl SupabaseDb {
    /// Create a client that authenticates with `identity`'s session.
    pub fn new(config: &Config, identity: IdentityClient) -> Result<Self, AppError> {
        if !config.is_remote_configured() {
            return Err(AppError::Configuration(
                "Backend data service is not configured".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(url = %config.supabase_url, "Backend data service configured");

        Ok(Self {
            client: Some(Connection {
                http,
                rest_url: format!("{}/rest/v1", config.supabase_url.trim_end_matches('/')),
                api_key: config.supabase_anon_key.clone(),
                identity,
            }),
        })
    }

    /// Create an offline client (local auth mode).
    ///
    /// All operations return a `Configuration` error if called.
    pub fn offline() -> Self {
        Self { client: None }
    }

    pub fn is_online(&self) -> bool {
        self.client.is_some()
    }

    /// Helper to get the connection or return an error if offline.
    fn get_client(&self) -> Result<&Connection, AppError> {
        self.client.as_ref().ok_or_else(|| {
            AppError::Configuration("Backend not configured (offline mode)".to_string())
        })
    }

    /// Start an authenticated request against `table`.
    async fn request(&self, method: Method, table: &str) -> Result<reqwest::RequestBuilder, AppError> {
        let conn = self.get_client()?;
        let token = conn.identity.access_token().await?;

        Ok(conn
            .http
            .request(method, format!("{}/{}", conn.rest_url, table))
            .header("apikey", &conn.api_key)
            .bearer_auth(token))
    }

    // ─── Track Operations ────────────────────────────────────────────────────

    /// All tracks owned by a user, newest first.
    pub async fn list_tracks(&self, user_id: &str) -> Result<Vec<Track>, AppError> {
        let response = self
            .request(Method::GET, collections::TRACKS)
            .await?
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await
            .map_err(unreachable_backend)?;

        check_response_json(response, collections::TRACKS).await
    }

    /// Get a track by ID, scoped to its owner.
    pub async fn get_track(&self, user_id: &str, track_id: &str) -> Result<Option<Track>, AppError> {
        let response = self
            .request(Method::GET, collections::TRACKS)
            .await?
            .query(&[
                ("select", "*".to_string()),
                ("id", eq(track_id)),
                ("user_id", eq(user_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .map_err(unreachable_backend)?;

        let rows: Vec<Track> = check_response_json(response, collections::TRACKS).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_track(&self, user_id: &str, track: &NewTrack) -> Result<Track, AppError> {
        track.validate()?;

        let response = self
            .request(Method::POST, collections::TRACKS)
            .await?
            .header("Prefer", "return=representation")
            .json(&TrackRow {
                name: &track.name,
                user_id,
            })
            .send()
            .await
            .map_err(unreachable_backend)?;

        let created: Track =
            single_row(check_response_json(response, collections::TRACKS).await?)?;
        tracing::info!(user_id, track_id = %created.id, "Track created");
        Ok(created)
    }

    pub async fn rename_track(
        &self,
        user_id: &str,
        track_id: &str,
        track: &NewTrack,
    ) -> Result<Track, AppError> {
        track.validate()?;

        let response = self
            .request(Method::PATCH, collections::TRACKS)
            .await?
            .header("Prefer", "return=representation")
            .query(&[("id", eq(track_id)), ("user_id", eq(user_id))])
            .json(&serde_json::json!({ "name": track.name }))
            .send()
            .await
            .map_err(unreachable_backend)?;

        let rows: Vec<Track> = check_response_json(response, collections::TRACKS).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Track".to_string()))
    }

    /// Delete a track. Whether its readings cascade is up to the backend;
    /// a foreign-key refusal becomes `BadRequest`.
    pub async fn delete_track(&self, user_id: &str, track_id: &str) -> Result<(), AppError> {
        let response = self
            .request(Method::DELETE, collections::TRACKS)
            .await?
            .header("Prefer", "return=representation")
            .query(&[
                ("id", eq(track_id)),
                ("user_id", eq(user_id)),
                ("select", "id".to_string()),
            ])
            .send()
            .await
            .map_err(unreachable_backend)?;

        let deleted: Vec<IgnoredAny> =
            match check_response_json(response, collections::TRACKS).await {
                Ok(rows) => rows,
                Err(AppError::BadRequest(_)) => {
                    return Err(AppError::BadRequest("Track still has readings".to_string()))
                }
                Err(e) => return Err(e),
            };

        if deleted.is_empty() {
            return Err(AppError::NotFound("Track".to_string()));
        }
        tracing::info!(user_id, track_id, "Track deleted");
        Ok(())
    }

    // ─── Reading Operations ──────────────────────────────────────────────────

    /// Readings owned by a user, optionally for one track, newest first.
    pub async fn list_readings(
        &self,
        user_id: &str,
        track_id: Option<&str>,
    ) -> Result<Vec<Reading>, AppError> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "date.desc,time.desc".to_string()),
        ];
        if let Some(track_id) = track_id {
            query.push(("track_id", eq(track_id)));
        }

        let response = self
            .request(Method::GET, collections::READINGS)
            .await?
            .query(&query)
            .send()
            .await
            .map_err(unreachable_backend)?;

        check_response_json(response, collections::READINGS).await
    }

    pub async fn get_reading(
        &self,
        user_id: &str,
        reading_id: &str,
    ) -> Result<Option<Reading>, AppError> {
        let response = self
            .request(Method::GET, collections::READINGS)
            .await?
            .query(&[
                ("select", "*".to_string()),
                ("id", eq(reading_id)),
                ("user_id", eq(user_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .map_err(unreachable_backend)?;

        let rows: Vec<Reading> = check_response_json(response, collections::READINGS).await?;
        Ok(rows.into_iter().next())
    }

    /// Create a reading. The referenced track must exist for this user.
    pub async fn create_reading(
        &self,
        user_id: &str,
        reading: &NewReading,
    ) -> Result<Reading, AppError> {
        reading.validate()?;
        self.ensure_track(user_id, &reading.track_id).await?;

        let response = self
            .request(Method::POST, collections::READINGS)
            .await?
            .header("Prefer", "return=representation")
            .json(&ReadingRow { user_id, reading })
            .send()
            .await
            .map_err(unreachable_backend)?;

        let created: Reading =
            single_row(check_response_json(response, collections::READINGS).await?)?;
        tracing::info!(
            user_id,
            reading_id = %created.id,
            track_id = %created.track_id,
            "Reading created"
        );
        Ok(created)
    }

    /// Replace the fields of an existing reading.
    pub async fn update_reading(
        &self,
        user_id: &str,
        reading_id: &str,
        reading: &NewReading,
    ) -> Result<Reading, AppError> {
        reading.validate()?;
        self.ensure_track(user_id, &reading.track_id).await?;

        let response = self
            .request(Method::PATCH, collections::READINGS)
            .await?
            .header("Prefer", "return=representation")
            .query(&[("id", eq(reading_id)), ("user_id", eq(user_id))])
            .json(reading)
            .send()
            .await
            .map_err(unreachable_backend)?;

        let rows: Vec<Reading> = check_response_json(response, collections::READINGS).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Reading".to_string()))
    }

    pub async fn delete_reading(&self, user_id: &str, reading_id: &str) -> Result<(), AppError> {
        let response = self
            .request(Method::DELETE, collections::READINGS)
            .await?
            .header("Prefer", "return=representation")
            .query(&[
                ("id", eq(reading_id)),
                ("user_id", eq(user_id)),
                ("select", "id".to_string()),
            ])
            .send()
            .await
            .map_err(unreachable_backend)?;

        let deleted: Vec<IgnoredAny> = check_response_json(response, collections::READINGS).await?;
        if deleted.is_empty() {
            return Err(AppError::NotFound("Reading".to_string()));
        }
        tracing::debug!(user_id, reading_id, "Reading deleted");
        Ok(())
    }

    /// A reading must never point at a missing track.
    async fn ensure_track(&self, user_id: &str, track_id: &str) -> Result<(), AppError> {
        match self.get_track(user_id, track_id).await? {
            Some(_) => Ok(()),
            None => {
                tracing::warn!(user_id, track_id, "Rejecting reading for unknown track");
                Err(AppError::NotFound("Track".to_string()))
            }
        }
    }

    // ─── User Data Deletion ──────────────────────────────────────────────────

    /// Delete every row of `table` where `column` equals `user_id`.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_rows(
        &self,
        table: &str,
        column: &str,
        user_id: &str,
    ) -> Result<usize, AppError> {
        let response = self
            .request(Method::DELETE, table)
            .await?
            .header("Prefer", "return=representation")
            .query(&[(column, eq(user_id)), ("select", "id".to_string())])
            .send()
            .await
            .map_err(unreachable_backend)?;

        let deleted: Vec<IgnoredAny> = check_response_json(response, table).await?;
        tracing::debug!(table, user_id, count = deleted.len(), "Deleted user rows");
        Ok(deleted.len())
    }

    /// Count rows of `table` where `column` equals `user_id`.
    pub async fn count_rows(&self, table: &str, column: &str, user_id: &str) -> Result<usize, AppError> {
        let response = self
            .request(Method::GET, table)
            .await?
            .query(&[("select", "id".to_string()), (column, eq(user_id))])
            .send()
            .await
            .map_err(unreachable_backend)?;

        let rows: Vec<IgnoredAny> = check_response_json(response, table).await?;
        Ok(rows.len())
    }
}

// ─── Wire Types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TrackRow<'a> {
    name: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
struct ReadingRow<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    reading: &'a NewReading,
}

/// Error body returned by the REST interface.
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

// ─── Helper Functions ────────────────────────────────────────────────────────

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

fn unreachable_backend(e: reqwest::Error) -> AppError {
    AppError::Configuration(format!("Backend unreachable: {}", e))
}

fn single_row<T>(rows: Vec<T>) -> Result<T, AppError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| AppError::Backend("Insert returned no rows".to_string()))
}

/// Map a non-success response to an error, or parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    table: &str,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_status(status, &body, table));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Backend(format!("JSON parse error: {}", e)))
}

fn map_status(status: StatusCode, body: &str, table: &str) -> AppError {
    let error: PostgrestError = serde_json::from_str(body).unwrap_or_default();

    match (status, error.code.as_deref()) {
        (StatusCode::UNAUTHORIZED, _) => {
            AppError::Authentication(AppError::SESSION_EXPIRED.to_string())
        }
        (StatusCode::NOT_FOUND, _) | (_, Some("42P01" | "PGRST205")) => {
            AppError::NotFound(format!("Table {}", table))
        }
        (StatusCode::CONFLICT, _) | (_, Some("23503")) => AppError::BadRequest(
            error
                .details
                .or(error.message)
                .unwrap_or_else(|| "Conflicting change".to_string()),
        ),
        _ => {
            tracing::warn!(status = %status, table, body, "Backend request failed");
            AppError::Backend(format!("HTTP {}: {}", status, body))
        }
    }
}
