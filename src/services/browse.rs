//! Client-side filtering and summaries of fetched tracks and readings.

use crate::db::SupabaseDb;
use crate::error::Result;
use crate::models::{LaneSide, Reading, Track};
use futures_util::future;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Filter applied to a user's readings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingQuery {
    /// Only readings for this track
    pub track_id: Option<String>,
    /// Case-insensitive match on date, time, class or lane notes
    pub search: Option<String>,
}

impl ReadingQuery {
    fn matches(&self, reading: &Reading) -> bool {
        if let Some(track_id) = &self.track_id {
            if &reading.track_id != track_id {
                return false;
            }
        }

        let Some(term) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return true;
        };
        let term = term.to_lowercase();
        let hit = |text: &str| text.to_lowercase().contains(&term);

        hit(reading.date.as_str())
            || hit(reading.time.as_str())
            || reading.class_currently_running.as_deref().is_some_and(hit)
            || [LaneSide::Left, LaneSide::Right]
                .into_iter()
                .filter_map(|side| reading.lane(side).notes.as_deref())
                .any(hit)
    }
}

/// Readings matching `query`, newest first.
pub fn filter_readings<'a>(readings: &'a [Reading], query: &ReadingQuery) -> Vec<&'a Reading> {
    let mut matched: Vec<&Reading> = readings.iter().filter(|r| query.matches(r)).collect();
    matched.sort_by(|a, b| newest_first(a, b));
    matched
}

fn newest_first(a: &Reading, b: &Reading) -> Ordering {
    (b.sort_key(), b.created_at).cmp(&(a.sort_key(), a.created_at))
}

/// Per-track overview row.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub track: Track,
    pub reading_count: usize,
    pub latest: Option<Reading>,
}

/// One summary per track, in the order the tracks were given.
pub fn summarize_tracks(tracks: &[Track], readings: &[Reading]) -> Vec<TrackSummary> {
    let mut by_track: HashMap<&str, Vec<&Reading>> = HashMap::new();
    for reading in readings {
        by_track
            .entry(reading.track_id.as_str())
            .or_default()
            .push(reading);
    }

    tracks
        .iter()
        .map(|track| {
            let track_readings = by_track.get(track.id.as_str());
            TrackSummary {
                track: track.clone(),
                reading_count: track_readings.map_or(0, Vec::len),
                latest: track_readings
                    .and_then(|rs| rs.iter().min_by(|a, b| newest_first(a, b)))
                    .map(|r| (*r).clone()),
            }
        })
        .collect()
}

/// Fetches a user's data and applies the helpers above.
#[derive(Clone)]
pub struct BrowseService {
    db: SupabaseDb,
}

impl BrowseService {
    pub fn new(db: SupabaseDb) -> Self {
        Self { db }
    }

    pub async fn search_readings(
        &self,
        user_id: &str,
        query: &ReadingQuery,
    ) -> Result<Vec<Reading>> {
        let readings = self
            .db
            .list_readings(user_id, query.track_id.as_deref())
            .await?;
        Ok(filter_readings(&readings, query)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn track_overview(&self, user_id: &str) -> Result<Vec<TrackSummary>> {
        let (tracks, readings) = future::try_join(
            self.db.list_tracks(user_id),
            self.db.list_readings(user_id, None),
        )
        .await?;

        tracing::debug!(
            user_id,
            tracks = tracks.len(),
            readings = readings.len(),
            "Loaded track overview"
        );
        Ok(summarize_tracks(&tracks, &readings))
    }
}
