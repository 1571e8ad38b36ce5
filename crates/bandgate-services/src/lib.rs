pub mod download;
pub mod error;
pub mod qos;
pub mod reaper;
pub mod registry;
pub mod stats;
pub mod stream;
pub mod telemetry;
pub mod tracker;

pub use download::{DownloadOutcome, DownloadRequest, DownloadService};
pub use error::BandwidthError;
pub use qos::TokenBucket;
pub use reaper::{run_reaper_loop, IdleReaper};
pub use registry::{SessionRegistry, TrackerStore};
pub use stats::SessionStats;
pub use stream::{
    DownloadLease, DownloadSink, GovernedWriter, MonitoredWriter, ThrottledWriter,
    THROTTLE_CHUNK_SIZE,
};
pub use telemetry::{run_telemetry_loop, TelemetryEvent, TelemetryPublisher, TelemetrySubscription};
pub use tracker::{SessionTracker, ANONYMOUS_USER, MAX_BANDWIDTH_HISTORY, MONITORING_WINDOW};
