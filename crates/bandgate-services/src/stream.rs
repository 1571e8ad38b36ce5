//! Writers that account every outbound byte against a session tracker.
//!
//! Wrapping a sink takes a [`DownloadLease`], which marks the download as
//! started; the lease is released exactly once, on `close` or on drop, so the
//! tracker's active-download count is kept even when the sink fails.

use std::io::{self, Cursor, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use bandgate_core::GameId;

use crate::tracker::SessionTracker;

/// Largest slice handed to a single `throttle` call.
pub const THROTTLE_CHUNK_SIZE: usize = 64 * 1024;

/// An outbound byte sink with an explicit end of stream.
pub trait DownloadSink: Write {
    /// Finish the stream. Defaults to a flush.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl DownloadSink for Vec<u8> {}
impl DownloadSink for Cursor<Vec<u8>> {}
impl DownloadSink for io::Sink {}
impl DownloadSink for std::fs::File {}

impl DownloadSink for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.shutdown(Shutdown::Write)
    }
}

impl<S: DownloadSink + ?Sized> DownloadSink for Box<S> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<S: DownloadSink + ?Sized> DownloadSink for &mut S {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

// ── Lease ────────────────────────────────────────────────────────────────────

/// One active download on a tracker.
#[derive(Debug)]
pub struct DownloadLease {
    tracker: Arc<SessionTracker>,
    game_id: Option<GameId>,
    released: bool,
}

impl DownloadLease {
    pub fn acquire(
        tracker: Arc<SessionTracker>,
        game_id: Option<GameId>,
        username: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Self {
        tracker.download_started(game_id, username, remote_ip);
        Self {
            tracker,
            game_id,
            released: false,
        }
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.game_id
    }

    /// Mark the download completed. Later calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.download_completed(self.game_id);
        }
    }
}

impl Drop for DownloadLease {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Monitored ────────────────────────────────────────────────────────────────

/// Records bytes without throttling. Used for unlimited sessions.
#[derive(Debug)]
pub struct MonitoredWriter<W> {
    inner: W,
    lease: DownloadLease,
}

impl<W: DownloadSink> MonitoredWriter<W> {
    pub fn new(
        inner: W,
        tracker: Arc<SessionTracker>,
        game_id: Option<GameId>,
        username: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Self {
        Self {
            inner,
            lease: DownloadLease::acquire(tracker, game_id, username, remote_ip),
        }
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        self.lease.tracker()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Close the sink and end the download, even if the close fails.
    pub fn close(self) -> io::Result<()> {
        let Self {
            mut inner,
            mut lease,
        } = self;
        let result = inner.close();
        lease.release();
        result
    }
}

impl<W: DownloadSink> Write for MonitoredWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lease.tracker().record_bytes(buf.len() as u64);
        self.inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ── Throttled ────────────────────────────────────────────────────────────────

/// Throttles each chunk of at most [`THROTTLE_CHUNK_SIZE`] bytes before
/// forwarding it.
#[derive(Debug)]
pub struct ThrottledWriter<W> {
    inner: W,
    lease: DownloadLease,
}

impl<W: DownloadSink> ThrottledWriter<W> {
    pub fn new(
        inner: W,
        tracker: Arc<SessionTracker>,
        game_id: Option<GameId>,
        username: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Self {
        Self {
            inner,
            lease: DownloadLease::acquire(tracker, game_id, username, remote_ip),
        }
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        self.lease.tracker()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn close(self) -> io::Result<()> {
        let Self {
            mut inner,
            mut lease,
        } = self;
        let result = inner.close();
        lease.release();
        result
    }
}

impl<W: DownloadSink> Write for ThrottledWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        for chunk in buf.chunks(THROTTLE_CHUNK_SIZE) {
            let forwarded = self
                .lease
                .tracker()
                .throttle(chunk.len() as u64)
                // Not ErrorKind::Interrupted: write_all would retry it.
                .map_err(io::Error::other)
                .and_then(|()| self.inner.write_all(chunk));
            match forwarded {
                Ok(()) => written += chunk.len(),
                // Report the chunks already forwarded.
                Err(_) if written > 0 => return Ok(written),
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ── Either ───────────────────────────────────────────────────────────────────

/// Picks the throttled writer for limited sessions and the monitored writer
/// otherwise.
#[derive(Debug)]
pub enum GovernedWriter<W> {
    Monitored(MonitoredWriter<W>),
    Throttled(ThrottledWriter<W>),
}

impl<W: DownloadSink> GovernedWriter<W> {
    pub fn new(
        inner: W,
        tracker: Arc<SessionTracker>,
        game_id: Option<GameId>,
        username: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Self {
        if tracker.max_bytes_per_second() > 0 {
            Self::Throttled(ThrottledWriter::new(inner, tracker, game_id, username, remote_ip))
        } else {
            Self::Monitored(MonitoredWriter::new(inner, tracker, game_id, username, remote_ip))
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        match self {
            Self::Monitored(w) => w.tracker(),
            Self::Throttled(w) => w.tracker(),
        }
    }

    pub fn close(self) -> io::Result<()> {
        match self {
            Self::Monitored(w) => w.close(),
            Self::Throttled(w) => w.close(),
        }
    }
}

impl<W: DownloadSink> Write for GovernedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Monitored(w) => w.write(buf),
            Self::Throttled(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Monitored(w) => w.flush(),
            Self::Throttled(w) => w.flush(),
        }
    }
}
