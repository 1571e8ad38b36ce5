//! Telemetry wire shape for one download session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a game file being streamed.
pub type GameId = i64;

/// One sampled tick: a DTO per live session, sorted by session id.
pub type StatsFrame = Vec<SessionStatsDto>;

/// Dashboard-facing view of a session's bandwidth accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatsDto {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub username: Option<String>,
    pub remote_ip: String,
    pub active_downloads: u32,
    /// Order is not significant.
    pub active_game_ids: Vec<GameId>,
    pub total_bytes_transferred: u64,
    pub current_bytes_per_second: u64,
    /// Oldest sample first.
    #[serde(default)]
    pub bandwidth_history: Vec<u64>,
}
