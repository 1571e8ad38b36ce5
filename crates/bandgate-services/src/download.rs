//! Download service: serves one file body through the session's governor.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bandgate_core::config::DownloadsConfig;
use bandgate_core::GameId;

use crate::registry::SessionRegistry;
use crate::stream::{DownloadSink, GovernedWriter, THROTTLE_CHUNK_SIZE};

/// What the download handler knows about one request.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub session_id: String,
    pub game_id: Option<GameId>,
    /// Only used in log output.
    pub game_title: Option<String>,
    pub username: Option<String>,
    pub remote_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Bytes handed to the client sink.
    pub bytes: u64,
    pub elapsed: Duration,
    /// The client went away or the throttle was interrupted before the body
    /// was fully delivered.
    pub interrupted: bool,
}

pub struct DownloadService {
    registry: Arc<SessionRegistry>,
    downloads: DownloadsConfig,
}

impl DownloadService {
    pub fn new(registry: Arc<SessionRegistry>, downloads: DownloadsConfig) -> Self {
        Self {
            registry,
            downloads,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Copy `source` into `sink`, throttled to the configured per-session
    /// budget.
    ///
    /// Failures on the client side end the transfer quietly and are reported
    /// through `DownloadOutcome::interrupted`. Failures reading `source` are
    /// returned.
    pub fn process_download<R, W>(
        &self,
        mut source: R,
        sink: W,
        request: &DownloadRequest,
    ) -> io::Result<DownloadOutcome>
    where
        R: Read,
        W: DownloadSink,
    {
        let limit = self.downloads.max_bytes_per_second();
        let tracker = self.registry.get_tracker(&request.session_id, limit);
        let mut writer = GovernedWriter::new(
            sink,
            tracker,
            request.game_id,
            request.username.as_deref(),
            request.remote_ip.as_deref(),
        );

        let title = request.game_title.as_deref().unwrap_or("<untitled>");
        tracing::info!(
            session = %request.session_id,
            game = title,
            game_id = ?request.game_id,
            max_bytes_per_second = limit,
            throttled = writer.is_throttled(),
            "download started"
        );

        let start = Instant::now();
        let mut buf = vec![0u8; THROTTLE_CHUNK_SIZE];
        let mut bytes = 0u64;
        let mut client_error = None;

        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(session = %request.session_id, game = title, error = %e, "reading download source failed");
                    // Dropping the writer ends the download on the tracker.
                    return Err(e);
                }
            };
            if let Err(e) = writer.write_all(&buf[..n]) {
                client_error = Some(e);
                break;
            }
            bytes += n as u64;
        }

        if client_error.is_none() {
            client_error = writer.flush().err();
        }
        let close_result = writer.close();
        if client_error.is_none() {
            client_error = close_result.err();
        }

        let elapsed = start.elapsed();
        let interrupted = match client_error {
            Some(e) => {
                tracing::debug!(
                    session = %request.session_id,
                    game = title,
                    bytes,
                    error = %e,
                    "download interrupted by client"
                );
                true
            }
            None => {
                let secs = elapsed.as_secs_f64();
                let avg = if secs > 0.0 { (bytes as f64 / secs) as u64 } else { bytes };
                tracing::info!(
                    session = %request.session_id,
                    game = title,
                    bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    avg_bytes_per_second = avg,
                    "download completed"
                );
                false
            }
        };

        Ok(DownloadOutcome {
            bytes,
            elapsed,
            interrupted,
        })
    }
}
