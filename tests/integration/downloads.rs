use crate::*;

use std::io::Write;
use std::net::TcpStream;

/// Several downloads on one session accumulate into a single tracker.
#[test]
fn test_concurrent_downloads_share_session() {
    let service = Arc::new(DownloadService::new(Arc::new(SessionRegistry::new()), unlimited()));

    let handles: Vec<_> = (0..4)
        .map(|game| {
            let service = service.clone();
            std::thread::spawn(move || {
                service
                    .process_download(body(100_000), Vec::new(), &request("shared", game))
                    .unwrap()
            })
        })
        .collect();
    for h in handles {
        let outcome = h.join().unwrap();
        assert_eq!(outcome.bytes, 100_000);
        assert!(!outcome.interrupted);
    }

    let registry = service.registry();
    assert_eq!(registry.len(), 1);
    let tracker = registry.get("shared").unwrap();
    assert_eq!(tracker.total_bytes_transferred(), 400_000);
    assert_eq!(tracker.active_downloads(), 0);
    assert!(tracker.active_game_ids().is_empty());
    assert_eq!(tracker.username().as_deref(), Some("alice"));
}

/// 1 Mbps is 125_000 B/s: the first 64 KiB chunk bursts, the rest is paced.
#[test]
fn test_limited_download_is_paced() {
    let service = DownloadService::new(Arc::new(SessionRegistry::new()), limited(1));

    let outcome = service
        .process_download(body(250_000), Vec::new(), &request("slow", 1))
        .unwrap();

    assert_eq!(outcome.bytes, 250_000);
    assert!(
        outcome.elapsed >= Duration::from_millis(1200),
        "download finished too fast: {:?}",
        outcome.elapsed
    );
    assert!(outcome.elapsed < Duration::from_secs(4), "{:?}", outcome.elapsed);
}

/// Distinct sessions are paced independently.
#[test]
fn test_sessions_do_not_share_budget() {
    let service = Arc::new(DownloadService::new(Arc::new(SessionRegistry::new()), limited(8)));

    let start = Instant::now();
    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|session| {
            let service = service.clone();
            std::thread::spawn(move || {
                service
                    .process_download(body(500_000), Vec::new(), &request(session, 1))
                    .unwrap()
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().bytes, 500_000);
    }

    // 1 MB/s each; three sessions sharing one budget would need ~1.5s.
    assert!(start.elapsed() < Duration::from_millis(1200), "{:?}", start.elapsed());
}

#[test]
fn test_download_over_tcp() -> Result<()> {
    let (addr, receiver) = byte_counting_listener()?;
    let service = DownloadService::new(Arc::new(SessionRegistry::new()), unlimited());

    let stream = TcpStream::connect(addr)?;
    let outcome = service.process_download(body(1_000_000), stream, &request("tcp", 9))?;

    assert!(!outcome.interrupted);
    assert_eq!(outcome.bytes, 1_000_000);
    // The sink's close shuts down the write half, so the reader sees EOF.
    assert_eq!(receiver.join().unwrap(), 1_000_000);
    Ok(())
}

#[test]
fn test_client_hangup_is_reported() -> Result<()> {
    let (addr, peer) = hanging_up_listener(64 * 1024)?;
    let service = DownloadService::new(Arc::new(SessionRegistry::new()), unlimited());

    let stream = TcpStream::connect(addr)?;
    let outcome = service.process_download(body(32 * 1024 * 1024), stream, &request("gone", 2))?;
    peer.join().unwrap();

    assert!(outcome.interrupted);
    assert!(outcome.bytes < 32 * 1024 * 1024);
    let tracker = service.registry().get("gone").unwrap();
    assert_eq!(tracker.active_downloads(), 0);
    Ok(())
}

/// Shutdown wakes downloads parked in the throttle.
#[test]
fn test_interrupt_all_releases_blocked_writers() {
    let registry = Arc::new(SessionRegistry::new());
    let tracker = registry.get_tracker("parked", 1000);
    tracker.throttle(1000).unwrap();

    let writer = {
        let tracker = tracker.clone();
        std::thread::spawn(move || {
            let mut w = ThrottledWriter::new(std::io::sink(), tracker, Some(1), None, None);
            w.write_all(&[0u8; 50_000])
        })
    };

    let start = Instant::now();
    while !writer.is_finished() {
        std::thread::sleep(Duration::from_millis(20));
        registry.interrupt_all();
    }

    assert!(writer.join().unwrap().is_err());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(tracker.active_downloads(), 0);
}
