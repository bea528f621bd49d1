// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Track-condition reading model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Shown in place of a measurement that was left blank.
pub const NOT_AVAILABLE: &str = "N/A";

/// Measurements for one lane. Values are kept as entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct LaneReading {
    /// Track surface temperature (°F)
    #[serde(default)]
    pub track_temp: String,
    #[serde(default)]
    pub uv_index: String,
    /// Traction compound (keg) at the starting line
    #[serde(default, rename = "kegSL")]
    pub keg_sl: String,
    /// Traction compound (keg) downtrack
    #[serde(default)]
    pub keg_out: String,
    /// Grippo reading at the starting line
    #[serde(default, rename = "grippoSL")]
    pub grippo_sl: String,
    /// Grippo reading downtrack
    #[serde(default)]
    pub grippo_out: String,
    #[serde(default)]
    pub shine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
}

impl LaneReading {
    /// Render a measurement for display, substituting `N/A` for blanks.
    pub fn display(value: &str) -> &str {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            NOT_AVAILABLE
        } else {
            trimmed
        }
    }

    /// Track temperature with its unit, e.g. `"112°F"` or `"N/A°F"`.
    pub fn track_temp_label(&self) -> String {
        format!("{}°F", Self::display(&self.track_temp))
    }

    /// Labelled measurement rows in detail-view order.
    pub fn rows(&self) -> [(&'static str, &str); 7] {
        [
            ("Track Temp", Self::display(&self.track_temp)),
            ("UV Index", Self::display(&self.uv_index)),
            ("Keg SL", Self::display(&self.keg_sl)),
            ("Keg Out", Self::display(&self.keg_out)),
            ("Grippo SL", Self::display(&self.grippo_sl)),
            ("Grippo Out", Self::display(&self.grippo_out)),
            ("Shine", Self::display(&self.shine)),
        ]
    }
}

/// Which lane a sub-record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneSide {
    Left,
    Right,
}

impl LaneSide {
    pub fn title(self) -> &'static str {
        match self {
            LaneSide::Left => "Left Lane",
            LaneSide::Right => "Right Lane",
        }
    }
}

/// A timestamped measurement set for a track, stored in the `readings` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "app/types/generated/")
)]
pub struct Reading {
    pub id: String,
    /// Owning user's identity ID
    pub user_id: String,
    /// Track this reading was taken at (must exist)
    pub track_id: String,
    /// Date as entered, e.g. "2024-06-01"
    pub date: String,
    /// Time as entered, e.g. "14:30"
    pub time: String,
    /// Class running on track when the reading was taken
    #[serde(default)]
    pub class_currently_running: Option<String>,
    pub left_lane: LaneReading,
    pub right_lane: LaneReading,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn lane(&self, side: LaneSide) -> &LaneReading {
        match side {
            LaneSide::Left => &self.left_lane,
            LaneSide::Right => &self.right_lane,
        }
    }

    /// Sort key: newest first when compared in reverse.
    pub fn sort_key(&self) -> (&str, &str) {
        (self.date.as_str(), self.time.as_str())
    }
}

/// Payload for creating or replacing a reading.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewReading {
    #[validate(length(min = 1, message = "A reading must reference a track"))]
    pub track_id: String,
    #[validate(length(min = 1, message = "Date is required"))]
    pub date: String,
    #[validate(length(min = 1, message = "Time is required"))]
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_currently_running: Option<String>,
    #[validate(nested)]
    pub left_lane: LaneReading,
    #[validate(nested)]
    pub right_lane: LaneReading,
}
