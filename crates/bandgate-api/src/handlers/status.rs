//! /status handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub sessions: usize,
    pub active_downloads: u64,
    pub total_bytes_transferred: u64,
    pub subscribers: usize,
}

/// Aggregate counters only; per-session detail is admin-gated.
pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let stats = state.registry().get_stats();

    let active_downloads = stats.values().map(|s| u64::from(s.active_downloads)).sum();
    let total_bytes_transferred = stats
        .values()
        .map(|s| s.total_bytes_transferred)
        .fold(0u64, u64::saturating_add);

    Json(StatusResponse {
        sessions: stats.len(),
        active_downloads,
        total_bytes_transferred,
        subscribers: state.publisher.subscriber_count(),
    })
}
