//! Configuration system for bandgate.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BANDGATE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/bandgate/config.toml
//!   3. ~/.config/bandgate/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 1 Mbps expressed in bytes per second.
pub const BYTES_PER_SECOND_PER_MBPS: u64 = 125_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BandgateConfig {
    pub downloads: DownloadsConfig,
    pub telemetry: TelemetryConfig,
    pub reaper: ReaperConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Throttle downloads per session when true.
    pub bandwidth_limit_enabled: bool,
    /// Per-session budget in megabits per second. 0 = unlimited.
    pub bandwidth_limit_mbps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Sampling cadence of the dashboard publisher.
    pub sample_interval_ms: u64,
    /// Number of changed frames kept and republished on every change.
    pub history_len: usize,
    /// Broadcast channel capacity per subscriber.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub interval_secs: u64,
    /// Idle trackers older than this are evicted.
    pub inactivity_threshold_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    /// Bearer token granting admin access. None = nobody is admin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            history_len: 10,
            channel_capacity: 1024,
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            inactivity_threshold_secs: 24 * 60 * 60,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 9101,
            admin_token: None,
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl DownloadsConfig {
    /// Per-session byte budget. 0 means unlimited.
    pub fn max_bytes_per_second(&self) -> u64 {
        if self.bandwidth_limit_enabled && self.bandwidth_limit_mbps > 0 {
            self.bandwidth_limit_mbps * BYTES_PER_SECOND_PER_MBPS
        } else {
            0
        }
    }
}

impl TelemetryConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn inactivity_threshold(&self) -> Duration {
        Duration::from_secs(self.inactivity_threshold_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("bandgate")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BandgateConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BandgateConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BANDGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BandgateConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BANDGATE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("BANDGATE_DOWNLOADS__BANDWIDTH_LIMIT_ENABLED") {
            self.downloads.bandwidth_limit_enabled = v == "true" || v == "1";
        }
        if let Some(v) = var("BANDGATE_DOWNLOADS__BANDWIDTH_LIMIT_MBPS") {
            if let Ok(n) = v.parse() {
                self.downloads.bandwidth_limit_mbps = n;
            }
        }
        if let Some(v) = var("BANDGATE_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Some(v) = var("BANDGATE_API__ADMIN_TOKEN") {
            self.api.admin_token = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = var("BANDGATE_REAPER__INACTIVITY_THRESHOLD_SECS") {
            if let Ok(n) = v.parse() {
                self.reaper.inactivity_threshold_secs = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_unlimited() {
        let config = BandgateConfig::default();
        assert!(!config.downloads.bandwidth_limit_enabled);
        assert_eq!(config.downloads.max_bytes_per_second(), 0);
        assert_eq!(config.telemetry.sample_interval(), Duration::from_secs(1));
        assert_eq!(
            config.reaper.inactivity_threshold(),
            Duration::from_secs(86_400)
        );
        assert!(config.api.admin_token.is_none());
    }

    #[test]
    fn mbps_converts_to_bytes_per_second() {
        let downloads = DownloadsConfig {
            bandwidth_limit_enabled: true,
            bandwidth_limit_mbps: 8,
        };
        assert_eq!(downloads.max_bytes_per_second(), 1_000_000);

        let disabled = DownloadsConfig {
            bandwidth_limit_enabled: false,
            bandwidth_limit_mbps: 8,
        };
        assert_eq!(disabled.max_bytes_per_second(), 0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = BandgateConfig::from_toml(
            r#"
            [downloads]
            bandwidth_limit_enabled = true
            bandwidth_limit_mbps = 100

            [api]
            admin_token = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.downloads.max_bytes_per_second(), 12_500_000);
        assert_eq!(config.api.admin_token.as_deref(), Some("secret"));
        assert_eq!(config.api.port, 9101);
        assert_eq!(config.telemetry.history_len, 10);
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("BANDGATE_DOWNLOADS__BANDWIDTH_LIMIT_ENABLED", "1"),
            ("BANDGATE_DOWNLOADS__BANDWIDTH_LIMIT_MBPS", "4"),
            ("BANDGATE_API__PORT", "not-a-port"),
            ("BANDGATE_API__ADMIN_TOKEN", "tok"),
        ]
        .into_iter()
        .collect();

        let mut config = BandgateConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.downloads.max_bytes_per_second(), 500_000);
        // Unparseable values leave the previous setting in place.
        assert_eq!(config.api.port, 9101);
        assert_eq!(config.api.admin_token.as_deref(), Some("tok"));
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("bandgate-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        // Set env to point to our temp path
        unsafe {
            std::env::set_var("BANDGATE_CONFIG", config_path.to_str().unwrap());
        }

        let path =
            BandgateConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let text = std::fs::read_to_string(&path).unwrap();
        let config = BandgateConfig::from_toml(&text).expect("defaults should parse back");
        assert_eq!(config.reaper.interval_secs, 86_400);

        // Clean up
        unsafe {
            std::env::remove_var("BANDGATE_CONFIG");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
