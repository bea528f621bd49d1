// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod reading;
pub mod session;
pub mod track;

pub use reading::{LaneReading, LaneSide, NewReading, Reading};
pub use session::{AuthUser, Session};
pub use track::{NewTrack, Track};
