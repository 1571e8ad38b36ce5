pub mod handlers;

use anyhow::Context;
use axum::routing::{delete, get};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::{AdminGate, ApiState};

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/bandwidth/subscribe", get(handlers::handle_subscribe))
        .route("/bandwidth/sessions", get(handlers::handle_sessions))
        .route(
            "/bandwidth/sessions/{id}",
            delete(handlers::handle_clear_session),
        )
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the API on 127.0.0.1 until the shutdown broadcast fires.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown_tx.subscribe();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("binding API port {port}"))?;
    tracing::info!(port, "API listening on 127.0.0.1");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
