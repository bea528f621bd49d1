// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Track Readings: track-condition logging for drag-racing teams
//!
//! This crate provides the client core below the presentation layer:
//! device storage, the local PIN credential store, the hosted backend
//! client, the dual-mode auth orchestrator, the launch redirect decision
//! and account erasure.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod time_utils;

use config::Config;
use db::SupabaseDb;
use services::{
    AccountService, AuthMode, AuthOrchestrator, BrowseService, IdentityClient,
    LocalCredentialStore, RedirectTarget,
};
use std::sync::Arc;
use storage::{FallbackStore, FileStore, SharedStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: SharedStore,
    pub credentials: Arc<LocalCredentialStore>,
    pub auth: AuthOrchestrator,
    pub db: SupabaseDb,
    pub account_service: AccountService,
    pub browse_service: BrowseService,
}

impl AppState {
    /// Build the state on top of the device file store in `config.data_dir`.
    pub async fn initialize(config: Config) -> Self {
        let primary: SharedStore = Arc::new(FileStore::new(config.store_path()));
        let store: SharedStore = Arc::new(FallbackStore::new(primary));
        Self::with_store(config, store).await
    }

    /// Build the state on top of an existing store. Never fails: remote
    /// problems leave the app in local PIN mode.
    pub async fn with_store(config: Config, store: SharedStore) -> Self {
        let credentials = Arc::new(LocalCredentialStore::new(
            store.clone(),
            config.pin_hash_iterations,
        ));

        let identity = if config.is_remote_configured() {
            match IdentityClient::new(&config, store.clone()) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::warn!(error = %e, "Identity client unavailable");
                    None
                }
            }
        } else {
            None
        };

        let auth = AuthOrchestrator::initialize(&config, identity, credentials.clone()).await;

        let db = match auth.identity() {
            Some(identity) => SupabaseDb::new(&config, identity.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Backend data service unavailable");
                SupabaseDb::offline()
            }),
            None => SupabaseDb::offline(),
        };

        tracing::info!(
            mode = auth.mode().as_str(),
            online = db.is_online(),
            "Application state initialized"
        );

        Self {
            account_service: AccountService::new(db.clone()),
            browse_service: BrowseService::new(db.clone()),
            config,
            store,
            credentials,
            auth,
            db,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.auth.mode()
    }

    /// Launch redirect, read fresh from the device store.
    pub fn launch_target(&self) -> RedirectTarget {
        services::resolve_redirect(self.store.as_ref())
    }
}
