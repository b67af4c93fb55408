//! Downloader configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Knobs for one download operation.
///
/// Every field has a default matching the remote's comfortable request
/// cadence, so `DownloadConfig::default()` is a working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Upper bound on the random component of the inter-request delay,
    /// in seconds.
    pub base_delay_secs: f64,

    /// Fixed component of the inter-request delay, in seconds.
    pub min_delay_secs: f64,

    /// Candle cap per request; also fixes the window length.
    pub candles_per_request: u32,

    /// Checkpoint the accumulated series every N successful calls.
    pub checkpoint_every: u32,

    /// Transient failures tolerated on a single window before aborting.
    pub error_budget: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 0.3,
            min_delay_secs: 0.0,
            candles_per_request: 1000,
            checkpoint_every: 30,
            error_budget: 3,
        }
    }
}

impl DownloadConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_remote_cadence() {
        let config = DownloadConfig::default();
        assert_eq!(config.base_delay_secs, 0.3);
        assert_eq!(config.candles_per_request, 1000);
        assert_eq!(config.checkpoint_every, 30);
        assert_eq!(config.error_budget, 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = DownloadConfig::from_toml("candles_per_request = 500").unwrap();
        assert_eq!(config.candles_per_request, 500);
        assert_eq!(config.checkpoint_every, 30);
        assert_eq!(config.base_delay_secs, 0.3);
    }

    #[test]
    fn full_toml_roundtrip() {
        let config = DownloadConfig {
            base_delay_secs: 1.0,
            min_delay_secs: 0.2,
            candles_per_request: 250,
            checkpoint_every: 10,
            error_budget: 5,
        };
        let toml_str = toml::to_string(&config).unwrap();
        assert_eq!(DownloadConfig::from_toml(&toml_str).unwrap(), config);
    }

    #[test]
    fn garbage_toml_is_an_error() {
        assert!(DownloadConfig::from_toml("candles_per_request = \"many\"").is_err());
    }
}
