//! Point-in-time copies of tracker state.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use bandgate_core::{GameId, SessionStatsDto, StatsFrame};

/// Immutable snapshot of one tracker, detached from the live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub username: Option<String>,
    pub remote_ip: String,
    pub active_downloads: u32,
    pub active_game_ids: HashSet<GameId>,
    pub total_bytes_transferred: u64,
    pub current_bytes_per_second: u64,
    /// Oldest sample first.
    pub bandwidth_history: Vec<u64>,
}

impl SessionStats {
    pub fn to_dto(&self) -> SessionStatsDto {
        let mut active_game_ids: Vec<GameId> = self.active_game_ids.iter().copied().collect();
        active_game_ids.sort_unstable();

        SessionStatsDto {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            username: self.username.clone(),
            remote_ip: self.remote_ip.clone(),
            active_downloads: self.active_downloads,
            active_game_ids,
            total_bytes_transferred: self.total_bytes_transferred,
            current_bytes_per_second: self.current_bytes_per_second,
            bandwidth_history: self.bandwidth_history.clone(),
        }
    }
}

/// Convert a stats map into a frame sorted by session id.
pub fn to_frame(stats: &HashMap<String, SessionStats>) -> StatsFrame {
    let mut frame: StatsFrame = stats.values().map(SessionStats::to_dto).collect();
    frame.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    frame
}
