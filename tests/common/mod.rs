// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process fake of the hosted backend.
//!
//! Serves the identity endpoints under `/auth/v1` and the row endpoints
//! under `/rest/v1/{table}` from an axum router bound to 127.0.0.1:0.
//! Records every operation it receives and can inject failures.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use track_readings::config::Config;
use track_readings::storage::{MemoryStore, SharedStore};
use track_readings::AppState;

pub const SERVICE_ROLE_KEY: &str = "fake-service-role-key";
const JWT_SECRET: &[u8] = b"fake-backend-secret";

#[derive(Clone)]
struct FakeUser {
    id: String,
    email: String,
    password: String,
}

#[derive(Default)]
struct FakeState {
    users: Mutex<Vec<FakeUser>>,
    /// access token -> user id
    access_tokens: Mutex<HashMap<String, String>>,
    /// refresh token -> user id
    refresh_tokens: Mutex<HashMap<String, String>>,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    operations: Mutex<Vec<String>>,
    stalled: AtomicBool,
    fail_identity_delete: AtomicBool,
    require_confirmation: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
    missing_tables: Mutex<HashSet<String>>,
    token_lifetime_secs: AtomicI64,
    next_id: AtomicU64,
}

impl FakeState {
    fn record(&self, op: impl Into<String>) {
        self.operations.lock().unwrap().push(op.into());
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn user_for_token(&self, headers: &HeaderMap) -> Option<String> {
        let token = bearer(headers)?;
        self.access_tokens.lock().unwrap().get(token).cloned()
    }

    fn user_by_id(&self, id: &str) -> Option<FakeUser> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    fn mint_session(&self, user: &FakeUser) -> Value {
        #[derive(Serialize)]
        struct Claims<'a> {
            sub: &'a str,
            email: &'a str,
            exp: i64,
            iat: i64,
            jti: String,
        }

        let now = chrono::Utc::now().timestamp();
        let lifetime = self.token_lifetime_secs.load(Ordering::SeqCst);
        let claims = Claims {
            sub: &user.id,
            email: &user.email,
            exp: now + lifetime,
            iat: now,
            jti: self.next_id("jti"),
        };
        let access_token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET),
        )
        .unwrap();
        let refresh_token = self.next_id("refresh");

        self.access_tokens
            .lock()
            .unwrap()
            .insert(access_token.clone(), user.id.clone());
        self.refresh_tokens
            .lock()
            .unwrap()
            .insert(refresh_token.clone(), user.id.clone());

        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": lifetime,
            "expires_at": now + lifetime,
            "refresh_token": refresh_token,
            "user": { "id": user.id, "email": user.email }
        })
    }

    async fn maybe_stall(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

/// Running fake backend. The server lives as long as the test runtime.
pub struct FakeBackend {
    pub url: String,
    state: Arc<FakeState>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState {
            token_lifetime_secs: AtomicI64::new(3600),
            ..Default::default()
        });

        let app = Router::new()
            .route("/auth/v1/health", get(health))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/user", get(user))
            .route("/auth/v1/logout", post(logout))
            .route("/auth/v1/admin/users/{id}", delete(admin_delete_user))
            .route(
                "/rest/v1/{table}",
                get(rest_select)
                    .post(rest_insert)
                    .patch(rest_update)
                    .delete(rest_delete),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    /// Remote-configured config with test-sized PIN hashing and timeout.
    pub fn config(&self, data_dir: &FsPath) -> Config {
        Config {
            supabase_url: self.url.clone(),
            supabase_anon_key: "fake-anon-key".to_string(),
            supabase_service_role_key: None,
            data_dir: data_dir.to_path_buf(),
            session_timeout: Duration::from_millis(500),
            pin_hash_iterations: 1_000,
        }
    }

    pub fn add_user(&self, email: &str, password: &str) -> String {
        let id = self.state.next_id("user");
        self.state.users.lock().unwrap().push(FakeUser {
            id: id.clone(),
            email: email.to_string(),
            password: password.to_string(),
        });
        id
    }

    pub fn has_user(&self, id: &str) -> bool {
        self.state.user_by_id(id).is_some()
    }

    /// Mint a session for an existing user, as if signed in elsewhere.
    pub fn mint_session(&self, user_id: &str) -> Value {
        let user = self.state.user_by_id(user_id).unwrap();
        self.state.mint_session(&user)
    }

    /// Invalidate every issued access and refresh token.
    pub fn revoke_all_tokens(&self) {
        self.state.access_tokens.lock().unwrap().clear();
        self.state.refresh_tokens.lock().unwrap().clear();
    }

    pub fn insert_row(&self, table: &str, mut row: Value) -> Value {
        if row.get("id").is_none() {
            row["id"] = json!(self.state.next_id(table));
        }
        if row.get("created_at").is_none() {
            row["created_at"] = json!(chrono::Utc::now().to_rfc3339());
        }
        self.state
            .tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        row
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count_where(&self, table: &str, column: &str, value: &str) -> usize {
        self.rows(table)
            .iter()
            .filter(|row| row.get(column).is_some_and(|v| value_matches(v, value)))
            .count()
    }

    pub fn operations(&self) -> Vec<String> {
        self.state.operations.lock().unwrap().clone()
    }

    pub fn clear_operations(&self) {
        self.state.operations.lock().unwrap().clear();
    }

    /// Hold identity health and session checks for 30 seconds.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn fail_deletes_on(&self, table: &str) {
        self.state
            .failing_deletes
            .lock()
            .unwrap()
            .insert(table.to_string());
    }

    /// Make a table answer as if it does not exist.
    pub fn drop_table(&self, table: &str) {
        self.state
            .missing_tables
            .lock()
            .unwrap()
            .insert(table.to_string());
    }

    pub fn fail_identity_delete(&self, fail: bool) {
        self.state.fail_identity_delete.store(fail, Ordering::SeqCst);
    }

    pub fn require_email_confirmation(&self, required: bool) {
        self.state.require_confirmation.store(required, Ordering::SeqCst);
    }

    pub fn set_token_lifetime(&self, secs: i64) {
        self.state.token_lifetime_secs.store(secs, Ordering::SeqCst);
    }
}

/// Isolated in-memory device store.
pub fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

/// App state signed in as a freshly created user.
pub async fn signed_in_app(backend: &FakeBackend, data_dir: &FsPath) -> (AppState, String) {
    let user_id = backend.add_user("crew@example.com", "burnout123");
    let state = AppState::with_store(backend.config(data_dir), memory_store()).await;
    state
        .auth
        .sign_in_with_email("crew@example.com", "burnout123")
        .await
        .unwrap();
    (state, user_id)
}

// ─── Identity Handlers ───────────────────────────────────────────────────────

async fn health(State(s): State<Arc<FakeState>>) -> Response {
    s.record("GET health");
    s.maybe_stall().await;
    Json(json!({ "name": "GoTrue", "version": "fake" })).into_response()
}

async fn token(
    State(s): State<Arc<FakeState>>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let grant = query.get("grant_type").cloned().unwrap_or_default();
    s.record(format!("POST token {}", grant));

    let user = match grant.as_str() {
        "password" => {
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            s.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.email == email && u.password == password)
                .cloned()
        }
        "refresh_token" => {
            let refresh = body["refresh_token"].as_str().unwrap_or_default();
            let user_id = s.refresh_tokens.lock().unwrap().remove(refresh);
            user_id.and_then(|id| s.user_by_id(&id))
        }
        _ => None,
    };

    match user {
        Some(user) => Json(s.mint_session(&user)).into_response(),
        None if grant == "refresh_token" => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid Refresh Token: Refresh Token Not Found"
            })),
        )
            .into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })),
        )
            .into_response(),
    }
}

async fn signup(State(s): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    s.record("POST signup");
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();

    if s.users.lock().unwrap().iter().any(|u| u.email == email) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "code": 422, "msg": "User already registered" })),
        )
            .into_response();
    }

    let user = FakeUser {
        id: s.next_id("user"),
        email,
        password,
    };
    s.users.lock().unwrap().push(user.clone());

    if s.require_confirmation.load(Ordering::SeqCst) {
        return Json(json!({ "id": user.id, "email": user.email })).into_response();
    }
    Json(s.mint_session(&user)).into_response()
}

async fn user(State(s): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    s.record("GET user");
    s.maybe_stall().await;

    match s.user_for_token(&headers).and_then(|id| s.user_by_id(&id)) {
        Some(user) => Json(json!({ "id": user.id, "email": user.email })).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "msg": "invalid JWT: unable to parse or verify signature" })),
        )
            .into_response(),
    }
}

async fn logout(State(s): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    s.record("POST logout");
    if let Some(token) = bearer(&headers) {
        s.access_tokens.lock().unwrap().remove(token);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn admin_delete_user(
    State(s): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    s.record("DELETE identity");

    if s.fail_identity_delete.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "msg": "Database error deleting user" })),
        )
            .into_response();
    }

    let allowed = bearer(&headers) == Some(SERVICE_ROLE_KEY)
        || s.user_for_token(&headers).as_deref() == Some(id.as_str());
    if !allowed {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "msg": "User not allowed" })),
        )
            .into_response();
    }

    s.users.lock().unwrap().retain(|u| u.id != id);
    Json(json!({})).into_response()
}

// ─── Row Handlers ────────────────────────────────────────────────────────────

fn rest_guard(s: &FakeState, headers: &HeaderMap, table: &str) -> Result<(), Response> {
    if s.user_for_token(headers).is_none() {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "PGRST301", "message": "JWT expired" })),
        )
            .into_response());
    }
    if s.missing_tables.lock().unwrap().contains(table) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "code": "PGRST205",
                "message": format!("Could not find the table 'public.{}' in the schema cache", table)
            })),
        )
            .into_response());
    }
    Ok(())
}

async fn rest_select(
    State(s): State<Arc<FakeState>>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    s.record(format!("GET {}", table));
    if let Err(response) = rest_guard(&s, &headers, &table) {
        return response;
    }

    let mut rows: Vec<Value> = s
        .tables
        .lock()
        .unwrap()
        .get(&table)
        .map(|rows| rows.iter().filter(|r| row_matches(r, &query)).cloned().collect())
        .unwrap_or_default();

    if let Some(order) = query.get("order") {
        sort_rows(&mut rows, order);
    }
    if let Some(limit) = query.get("limit").and_then(|l| l.parse::<usize>().ok()) {
        rows.truncate(limit);
    }

    Json(project(rows, &query)).into_response()
}

async fn rest_insert(
    State(s): State<Arc<FakeState>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    s.record(format!("POST {}", table));
    if let Err(response) = rest_guard(&s, &headers, &table) {
        return response;
    }

    let mut row = body;
    row["id"] = json!(s.next_id(&table));
    row["created_at"] = json!(chrono::Utc::now().to_rfc3339());
    s.tables
        .lock()
        .unwrap()
        .entry(table)
        .or_default()
        .push(row.clone());

    (StatusCode::CREATED, Json(json!([row]))).into_response()
}

async fn rest_update(
    State(s): State<Arc<FakeState>>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    s.record(format!("PATCH {}", table));
    if let Err(response) = rest_guard(&s, &headers, &table) {
        return response;
    }

    let mut tables = s.tables.lock().unwrap();
    let mut updated = Vec::new();
    if let (Some(rows), Some(changes)) = (tables.get_mut(&table), body.as_object()) {
        for row in rows.iter_mut().filter(|r| row_matches(r, &query)) {
            for (key, value) in changes {
                row[key.as_str()] = value.clone();
            }
            updated.push(row.clone());
        }
    }

    Json(project(updated, &query)).into_response()
}

async fn rest_delete(
    State(s): State<Arc<FakeState>>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    s.record(format!("DELETE {}", table));
    if let Err(response) = rest_guard(&s, &headers, &table) {
        return response;
    }

    if s.failing_deletes.lock().unwrap().contains(&table) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "code": "XX000", "message": "injected failure" })),
        )
            .into_response();
    }

    let mut tables = s.tables.lock().unwrap();
    let doomed: Vec<Value> = tables
        .get(&table)
        .map(|rows| rows.iter().filter(|r| row_matches(r, &query)).cloned().collect())
        .unwrap_or_default();

    // Readings reference tracks; refuse to orphan them.
    if table == "tracks" {
        let referenced = tables.get("readings").is_some_and(|readings| {
            readings.iter().any(|reading| {
                doomed
                    .iter()
                    .any(|track| reading.get("track_id") == track.get("id"))
            })
        });
        if referenced {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "code": "23503",
                    "message": "update or delete on table \"tracks\" violates foreign key constraint",
                    "details": "Key is still referenced from table \"readings\"."
                })),
            )
                .into_response();
        }
    }

    if let Some(rows) = tables.get_mut(&table) {
        rows.retain(|r| !row_matches(r, &query));
    }

    Json(project(doomed, &query)).into_response()
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

/// Apply `column=eq.value` filters; other parameters are ignored.
fn row_matches(row: &Value, query: &HashMap<String, String>) -> bool {
    query
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "select" | "order" | "limit"))
        .all(|(column, filter)| match filter.strip_prefix("eq.") {
            Some(expected) => row.get(column).is_some_and(|v| value_matches(v, expected)),
            None => false,
        })
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn sort_rows(rows: &mut [Value], order: &str) {
    let specs: Vec<(&str, bool)> = order
        .split(',')
        .map(|spec| match spec.rsplit_once('.') {
            Some((column, "desc")) => (column, true),
            Some((column, _)) => (column, false),
            None => (spec, false),
        })
        .collect();

    rows.sort_by(|a, b| {
        specs
            .iter()
            .map(|(column, desc)| {
                let ord = sort_key(a, column).cmp(&sort_key(b, column));
                if *desc {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn project(rows: Vec<Value>, query: &HashMap<String, String>) -> Vec<Value> {
    let Some(select) = query.get("select").filter(|s| s.as_str() != "*") else {
        return rows;
    };
    let columns: Vec<&str> = select.split(',').collect();
    rows.into_iter()
        .map(|row| {
            let projected: serde_json::Map<String, Value> = columns
                .iter()
                .filter_map(|c| row.get(*c).map(|v| (c.to_string(), v.clone())))
                .collect();
            Value::Object(projected)
        })
        .collect()
}
