use crate::*;

use bandgate_services::{run_reaper_loop, IdleReaper};
use tokio::sync::broadcast;

/// The reaper never evicts a session mid-download, and evicts it once the
/// download ends.
#[tokio::test]
async fn test_reaper_waits_for_downloads_to_end() -> Result<()> {
    let registry = Arc::new(SessionRegistry::new());
    registry.get_tracker("idle", 0);
    let busy = registry.get_tracker("busy", 0);
    let lease = DownloadLease::acquire(busy, Some(1), Some("alice"), None);

    let reaper = Arc::new(IdleReaper::new(registry.clone(), Duration::ZERO));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(run_reaper_loop(
        reaper,
        Duration::from_millis(10),
        shutdown_rx,
    ));

    wait_until(|| registry.get("idle").is_none()).await?;
    assert!(registry.get("busy").is_some());

    drop(lease);
    wait_until(|| registry.is_empty()).await?;

    shutdown_tx.send(())?;
    task.await?;
    Ok(())
}

/// Accounting survives until the reaper runs: a returning session keeps its
/// lifetime total.
#[test]
fn test_total_survives_idle_period_until_swept() -> Result<()> {
    let registry = Arc::new(SessionRegistry::new());
    let service = DownloadService::new(registry.clone(), unlimited());
    service.process_download(body(10_000), Vec::new(), &request("returning", 1))?;

    let reaper = IdleReaper::new(registry.clone(), Duration::from_secs(3600));
    assert_eq!(reaper.sweep()?, 0);

    service.process_download(body(5_000), Vec::new(), &request("returning", 2))?;
    let tracker = registry.get("returning").context("tracker vanished")?;
    assert_eq!(tracker.total_bytes_transferred(), 15_000);

    let eager = IdleReaper::new(registry.clone(), Duration::ZERO);
    assert_eq!(eager.sweep()?, 1);
    assert!(registry.is_empty());
    Ok(())
}

async fn wait_until(condition: impl Fn() -> bool) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("condition not reached in time")
}
