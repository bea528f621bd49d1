// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track Readings headless bootstrap
//!
//! Runs the launch sequence (storage, auth mode selection, redirect
//! decision) and reports the outcome as structured logs.

use track_readings::{config::Config, time_utils::format_utc_rfc3339, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        remote_configured = config.is_remote_configured(),
        data_dir = %config.data_dir.display(),
        "Starting Track Readings"
    );

    let state = AppState::initialize(config).await;

    let snapshot = state.auth.snapshot();
    let target = state.launch_target();
    let session_expires_at = snapshot
        .session
        .as_ref()
        .map(|s| format_utc_rfc3339(s.expires_at));
    tracing::info!(
        mode = snapshot.mode.as_str(),
        is_pin_setup = snapshot.is_pin_setup,
        authenticated = snapshot.is_authenticated(),
        user_id = snapshot.user().map(|u| u.id.as_str()),
        session_expires_at = session_expires_at.as_deref(),
        route = target.route(),
        "Launch redirect resolved"
    );

    state.auth.shutdown();
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("track_readings=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
