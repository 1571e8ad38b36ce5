//! bandgate-core: shared configuration and wire types.
//! All other bandgate crates depend on this one.

pub mod config;
pub mod stats;

pub use stats::{GameId, SessionStatsDto, StatsFrame};
