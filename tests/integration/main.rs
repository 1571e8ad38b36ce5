//! Bandgate integration test harness.
//!
//! Drives the governor the way the download handler and the daemon do:
//! plain threads copy bodies through the stream wrappers while the telemetry
//! and reaper loops run on tokio.
//!
//!   cargo test --test integration

mod downloads;
mod reaper;
mod telemetry;

use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::thread::JoinHandle;

pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

pub use anyhow::{Context, Result};

pub use bandgate_core::config::DownloadsConfig;
pub use bandgate_services::{
    DownloadLease, DownloadRequest, DownloadService, SessionRegistry, TelemetryPublisher,
    ThrottledWriter,
};

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn unlimited() -> DownloadsConfig {
    DownloadsConfig::default()
}

pub fn limited(mbps: u64) -> DownloadsConfig {
    DownloadsConfig {
        bandwidth_limit_enabled: true,
        bandwidth_limit_mbps: mbps,
    }
}

pub fn request(session_id: &str, game_id: i64) -> DownloadRequest {
    DownloadRequest {
        session_id: session_id.to_string(),
        game_id: Some(game_id),
        game_title: Some(format!("game-{game_id}")),
        username: Some("alice".to_string()),
        remote_ip: Some("127.0.0.1".to_string()),
    }
}

pub fn body(len: usize) -> std::io::Cursor<Vec<u8>> {
    std::io::Cursor::new((0..len).map(|i| (i % 251) as u8).collect())
}

/// Accept one connection and read it to EOF. The handle yields the number of
/// bytes received.
pub fn byte_counting_listener() -> Result<(SocketAddr, JoinHandle<u64>)> {
    let listener = TcpListener::bind("127.0.0.1:0").context("binding test listener")?;
    let addr = listener.local_addr()?;
    let handle = std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return 0;
        };
        let mut buf = [0u8; 16 * 1024];
        let mut total = 0u64;
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return total,
                Ok(n) => total += n as u64,
            }
        }
    });
    Ok((addr, handle))
}

/// Accept one connection, read `limit` bytes and hang up.
pub fn hanging_up_listener(limit: usize) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").context("binding test listener")?;
    let addr = listener.local_addr()?;
    let handle = std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = vec![0u8; limit];
            let _ = stream.read_exact(&mut buf);
        }
    });
    Ok((addr, handle))
}
