use crate::*;

use bandgate_services::run_telemetry_loop;
use tokio::sync::broadcast;

/// A dashboard subscribed before a download sees it in a later frame, in the
/// camelCase wire shape.
#[tokio::test]
async fn test_dashboard_sees_download_progress() -> Result<()> {
    let registry = Arc::new(SessionRegistry::new());
    let publisher = Arc::new(TelemetryPublisher::with_capacity(registry.clone(), 10, 64));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sampler = tokio::spawn(run_telemetry_loop(
        publisher.clone(),
        Duration::from_millis(20),
        shutdown_rx,
    ));

    let mut dashboard = publisher.subscribe();

    let service = DownloadService::new(registry.clone(), limited(8));
    let download = tokio::task::spawn_blocking(move || {
        service.process_download(body(300_000), Vec::new(), &request("viewer", 5))
    });

    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = dashboard.recv().await {
            let newest = event.last().and_then(|frame| frame.first()).cloned();
            if let Some(session) = newest {
                if session.total_bytes_transferred > 0 {
                    return Some((event, session));
                }
            }
        }
        None
    })
    .await
    .context("no frame with traffic arrived")?;
    let (event, session) = seen.context("publisher went away")?;

    assert_eq!(session.session_id, "viewer");
    assert_eq!(session.username.as_deref(), Some("alice"));
    assert!(event.len() <= 10);

    let json = serde_json::to_value(&*event)?;
    let wire = &json[json.as_array().map_or(0, |a| a.len() - 1)][0];
    for key in [
        "sessionId",
        "startTime",
        "username",
        "remoteIp",
        "activeDownloads",
        "activeGameIds",
        "totalBytesTransferred",
        "currentBytesPerSecond",
        "bandwidthHistory",
    ] {
        assert!(wire.get(key).is_some(), "missing {key}: {wire}");
    }

    download.await??;
    shutdown_tx.send(())?;
    sampler.await?;
    Ok(())
}

/// A dashboard that connects after traffic gets the buffered history first.
#[tokio::test]
async fn test_late_dashboard_receives_history() -> Result<()> {
    let registry = Arc::new(SessionRegistry::new());
    let publisher = TelemetryPublisher::with_capacity(registry.clone(), 5, 64);

    let tracker = registry.get_tracker("s-1", 0);
    for n in 1..=8u64 {
        tracker.record_bytes(n * 1000);
        publisher.tick()?;
    }

    let mut late = publisher.subscribe();
    let replay = late.try_recv().context("no replay")?;
    assert_eq!(replay.len(), 5);
    assert!(late.try_recv().is_none());

    // Oldest first.
    let totals: Vec<u64> = replay.iter().map(|f| f[0].total_bytes_transferred).collect();
    assert!(totals.windows(2).all(|w| w[0] < w[1]), "{totals:?}");
    Ok(())
}

#[tokio::test]
async fn test_cleared_session_leaves_next_frame() -> Result<()> {
    let registry = Arc::new(SessionRegistry::new());
    let publisher = TelemetryPublisher::with_capacity(registry.clone(), 10, 64);
    registry.get_tracker("keep", 0);
    registry.get_tracker("drop", 0);
    publisher.tick()?;

    let mut dashboard = publisher.subscribe();
    dashboard.try_recv().context("no replay")?;

    assert!(publisher.clear_session("drop")?);
    assert!(publisher.tick()?);

    let event = dashboard.try_recv().context("no event after clear")?;
    let ids: Vec<&str> = event
        .last()
        .into_iter()
        .flatten()
        .map(|s| s.session_id.as_str())
        .collect();
    assert_eq!(ids, ["keep"]);
    Ok(())
}
