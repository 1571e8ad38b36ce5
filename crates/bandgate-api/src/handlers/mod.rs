//! HTTP API handlers: exposes bandwidth telemetry as JSON and SSE.

pub mod bandwidth;
pub mod status;

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};

use bandgate_services::{BandwidthError, SessionRegistry, TelemetryPublisher};

#[derive(Clone)]
pub struct ApiState {
    pub publisher: Arc<TelemetryPublisher<SessionRegistry>>,
    pub admin: AdminGate,
    /// Shutdown broadcast sender; open SSE streams end when it fires.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ApiState {
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.publisher.store()
    }
}

/// Decides whether a request carries administrator privilege.
///
/// A request is admin when its `Authorization: Bearer` token equals the
/// configured one. With no token configured nobody is admin.
#[derive(Clone, Default)]
pub struct AdminGate {
    token: Option<Arc<str>>,
}

impl AdminGate {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    pub fn is_admin(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return false;
        };
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|presented| ct_eq(presented.trim().as_bytes(), expected.as_bytes()))
    }
}

// Constant-time for equal lengths.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn require_admin(state: &ApiState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    if state.admin.is_admin(headers) {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "admin access required".to_string()))
    }
}

fn store_error(e: BandwidthError) -> (StatusCode, String) {
    tracing::error!(error = %e, "bandwidth store failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use bandwidth::{handle_clear_session, handle_sessions, handle_subscribe};
pub use status::handle_status;
