//! Errors raised by the bandwidth subsystem.

#[derive(Debug, thiserror::Error)]
pub enum BandwidthError {
    /// A blocked `throttle` call was woken by `SessionTracker::interrupt`.
    /// The bytes it was given are already recorded.
    #[error("throttle interrupted for session {0}")]
    Interrupted(String),
    /// The tracker store failed while being sampled or swept.
    #[error("tracker store failure: {0}")]
    Store(String),
}
