// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account erasure.
//!
//! Removes all user-scoped rows, verifies nothing remains, and only then
//! deletes the identity record. A failure before the identity step aborts
//! the erasure with the identity intact, so the account never looks deleted
//! while data is left behind.

use crate::db::{collections, SupabaseDb};
use crate::error::{AppError, Result};
use crate::services::auth::AuthOrchestrator;
use futures_util::future;
use std::fmt;

/// Steps of the erasure sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStep {
    Readings,
    Tracks,
    TeamMembership,
    Profile,
    Verification,
    Identity,
}

impl fmt::Display for DeletionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeletionStep::Readings => "readings",
            DeletionStep::Tracks => "tracks",
            DeletionStep::TeamMembership => "team membership",
            DeletionStep::Profile => "profile",
            DeletionStep::Verification => "verification",
            DeletionStep::Identity => "identity",
        };
        f.write_str(name)
    }
}

/// How far the erasure got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasureOutcome {
    /// Data and identity record removed.
    Completed,
    /// Data removed; the identity record must be removed manually.
    IdentityPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErasureReport {
    pub readings_deleted: usize,
    pub tracks_deleted: usize,
    pub outcome: ErasureOutcome,
}

impl ErasureReport {
    pub fn message(&self) -> &'static str {
        match self.outcome {
            ErasureOutcome::Completed => "Your account and all data have been deleted.",
            ErasureOutcome::IdentityPending => {
                "Your data has been deleted. Please contact support to complete account deletion."
            }
        }
    }
}

/// Account-level operations.
#[derive(Clone)]
pub struct AccountService {
    db: SupabaseDb,
}

impl AccountService {
    pub fn new(db: SupabaseDb) -> Self {
        Self { db }
    }

    /// Delete all data for the signed-in user, then the user itself.
    ///
    /// The user is signed out whenever the data steps succeed, including when
    /// only the identity step fails.
    pub async fn delete_account(&self, auth: &AuthOrchestrator) -> Result<ErasureReport> {
        let (Some(identity), Some(user)) = (auth.identity(), auth.user()) else {
            return Err(AppError::Unauthorized);
        };
        let user_id = user.id.as_str();

        tracing::info!(user_id, "Starting account deletion");

        // 1. Readings reference tracks, so they go first.
        let readings_deleted = self
            .db
            .delete_rows(collections::READINGS, "user_id", user_id)
            .await
            .map_err(|e| step_failed(DeletionStep::Readings, e))?;

        // 2. Tracks
        let tracks_deleted = self
            .db
            .delete_rows(collections::TRACKS, "user_id", user_id)
            .await
            .map_err(|e| step_failed(DeletionStep::Tracks, e))?;

        // 3. Membership and profile are independent of each other.
        let (membership, profile) = future::join(
            self.db
                .delete_rows(collections::TEAM_MEMBERS, "user_id", user_id),
            self.db.delete_rows(collections::USER_PROFILES, "id", user_id),
        )
        .await;
        tolerate_missing(DeletionStep::TeamMembership, membership)?;
        tolerate_missing(DeletionStep::Profile, profile)?;

        // 4. Nothing user-scoped may survive past this point.
        self.verify_erased(user_id).await?;

        // 5. Identity record last.
        let outcome = match identity.delete_user(user_id).await {
            Ok(()) => ErasureOutcome::Completed,
            Err(e) => {
                tracing::warn!(
                    user_id,
                    step = %DeletionStep::Identity,
                    error = %e,
                    "Identity deletion failed after data removal, manual completion required"
                );
                ErasureOutcome::IdentityPending
            }
        };

        auth.sign_out().await;

        tracing::info!(
            user_id,
            readings_deleted,
            tracks_deleted,
            outcome = ?outcome,
            "Account deletion finished"
        );

        Ok(ErasureReport {
            readings_deleted,
            tracks_deleted,
            outcome,
        })
    }

    async fn verify_erased(&self, user_id: &str) -> Result<()> {
        let (readings, tracks) = future::try_join(
            self.db.count_rows(collections::READINGS, "user_id", user_id),
            self.db.count_rows(collections::TRACKS, "user_id", user_id),
        )
        .await
        .map_err(|e| step_failed(DeletionStep::Verification, e))?;

        if readings > 0 || tracks > 0 {
            return Err(AppError::Deletion {
                step: DeletionStep::Verification,
                message: format!("{} readings and {} tracks remain", readings, tracks),
            });
        }
        Ok(())
    }
}

fn step_failed(step: DeletionStep, error: AppError) -> AppError {
    tracing::error!(%step, error = %error, "Account deletion step failed");
    AppError::Deletion {
        step,
        message: error.to_string(),
    }
}

/// Missing tables or rows are fine for the optional steps.
fn tolerate_missing(step: DeletionStep, result: Result<usize>) -> Result<()> {
    match result {
        Ok(count) => {
            tracing::debug!(%step, count, "Deleted rows");
            Ok(())
        }
        Err(AppError::NotFound(what)) => {
            tracing::warn!(%step, what = %what, "Skipping deletion step, nothing to delete");
            Ok(())
        }
        Err(e) => Err(step_failed(step, e)),
    }
}
