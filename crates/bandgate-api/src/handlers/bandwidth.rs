//! /bandwidth handlers: live telemetry and session administration.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde::Serialize;

use bandgate_core::SessionStatsDto;

use super::{require_admin, store_error, ApiState};

// ── /bandwidth/subscribe ──────────────────────────────────────────────────────

/// Server-sent events, one `bandwidth` event per published buffer. Callers
/// without admin privilege get a stream that ends immediately.
pub async fn handle_subscribe(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if !state.admin.is_admin(&headers) {
        tracing::debug!("telemetry subscription without admin privilege");
        return Sse::new(stream::empty::<Result<Event, Infallible>>()).into_response();
    }

    let subscription = state.publisher.subscribe();
    let shutdown = state.shutdown_tx.subscribe();
    tracing::debug!(
        subscribers = state.publisher.subscriber_count(),
        "telemetry subscriber connected"
    );

    let events = stream::unfold(
        (subscription, shutdown),
        |(mut subscription, mut shutdown)| async move {
            let next = tokio::select! {
                event = subscription.recv() => event,
                _ = shutdown.recv() => None,
            };
            let event = next?;
            let sse = Event::default().event("bandwidth").json_data(&*event);
            Some((sse, (subscription, shutdown)))
        },
    );

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ── /bandwidth/sessions ───────────────────────────────────────────────────────

pub async fn handle_sessions(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionStatsDto>>, (StatusCode, String)> {
    require_admin(&state, &headers)?;
    let sessions = state.publisher.active_sessions().map_err(store_error)?;
    Ok(Json(sessions))
}

// ── /bandwidth/sessions/:id (DELETE) ──────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSessionResponse {
    pub session_id: String,
    pub cleared: bool,
}

pub async fn handle_clear_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<ClearSessionResponse>, (StatusCode, String)> {
    require_admin(&state, &headers)?;
    let cleared = state
        .publisher
        .clear_session(&session_id)
        .map_err(store_error)?;

    Ok(Json(ClearSessionResponse {
        session_id,
        cleared,
    }))
}
