//! Database layer (hosted backend tables).

pub mod postgrest;

pub use postgrest::SupabaseDb;

/// Table names as constants.
pub mod collections {
    pub const TRACKS: &str = "tracks";
    pub const READINGS: &str = "readings";
    /// Team membership rows (keyed by user_id)
    pub const TEAM_MEMBERS: &str = "team_members";
    /// Profile rows (keyed by id = identity user ID)
    pub const USER_PROFILES: &str = "user_profiles";
}
