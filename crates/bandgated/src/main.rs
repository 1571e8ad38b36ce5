//! bandgated: per-session download bandwidth governor daemon.
//!
//! The daemon owns the session registry and runs the telemetry, reaper and
//! API tasks around it. Downloads reach the registry through
//! `bandgate_services::DownloadService`, which the download-serving handler
//! embeds with a clone of the same registry; until one is attached the
//! dashboard shows no sessions.

use std::sync::Arc;

use anyhow::Result;

use bandgate_core::config::BandgateConfig;
use bandgate_services::{
    run_reaper_loop, run_telemetry_loop, IdleReaper, SessionRegistry, TelemetryPublisher,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BandgateConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BandgateConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BandgateConfig::default()
    });

    let limit = config.downloads.max_bytes_per_second();
    tracing::info!(
        bandwidth_limit_enabled = config.downloads.bandwidth_limit_enabled,
        max_bytes_per_second = limit,
        "bandgated starting"
    );
    if config.api.admin_token.is_none() {
        tracing::warn!("no admin token configured; telemetry endpoints will refuse every caller");
    }

    // Shared state
    let registry = Arc::new(SessionRegistry::new());
    let publisher = Arc::new(TelemetryPublisher::new(registry.clone(), &config.telemetry));
    let reaper = Arc::new(IdleReaper::new(
        registry.clone(),
        config.reaper.inactivity_threshold(),
    ));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let mut tasks = tokio::task::JoinSet::new();

    tasks.spawn(run_telemetry_loop(
        publisher.clone(),
        config.telemetry.sample_interval(),
        shutdown_tx.subscribe(),
    ));

    tasks.spawn(run_reaper_loop(
        reaper,
        config.reaper.interval(),
        shutdown_tx.subscribe(),
    ));

    {
        let state = bandgate_api::ApiState {
            publisher: publisher.clone(),
            admin: bandgate_api::AdminGate::new(config.api.admin_token.clone()),
            shutdown_tx: shutdown_tx.clone(),
        };
        let port = config.api.port;
        tasks.spawn(async move {
            if let Err(e) = bandgate_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = tasks.join_next()   => tracing::error!("task exited early: {:?}", r),
    }

    // Stop the remaining tasks and release any download blocked in a throttle.
    let _ = shutdown_tx.send(());
    registry.interrupt_all();

    while tasks.join_next().await.is_some() {}
    tracing::info!(sessions = registry.len(), "bandgated stopped");

    Ok(())
}
