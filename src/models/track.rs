// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Track (racing venue) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// A racing venue owned by a user/team, stored in the `tracks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub struct Track {
    pub id: String,
    pub name: String,
    /// Owning user's identity ID
    #[serde(rename = "user_id")]
    pub owner_user_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

/// Payload for creating or renaming a track.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTrack {
    #[validate(length(min = 1, max = 100, message = "Track name must be 1-100 characters"))]
    pub name: String,
}

impl NewTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
        }
    }
}
