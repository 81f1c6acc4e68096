//! Centralized configuration for the performer library.
//!
//! Constants live on unit structs grouped by concern. `LoaderSettings` is the
//! runtime-tunable subset, deserializable from JSON and defaulting to the
//! constants below.

use crate::error::{PerformerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Timing used by the gate and the loading state machine.
pub struct GateConfig;

impl GateConfig {
    /// How long a fetch waits for connectivity before giving up.
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(2);
    /// Delay before the "no network" hint may be shown.
    pub const NO_NETWORK_HINT_DELAY: Duration = Duration::from_millis(500);
    /// Message shown for every non-success outcome.
    pub const FAILURE_MESSAGE: &'static str = "Download failed.";
}

/// Connectivity probing.
pub struct ProbeConfig;

impl ProbeConfig {
    pub const PROBE_URLS: [&'static str; 2] = [
        "https://www.google.com/generate_204",
        "https://cloudflare.com/cdn-cgi/trace",
    ];
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const OFFLINE_RECHECK_INTERVAL: Duration = Duration::from_secs(2);
    pub const ONLINE_VERIFY_INTERVAL: Duration = Duration::from_secs(30);
}

/// HTTP client settings for fetches.
pub struct HttpConfig;

impl HttpConfig {
    pub const USER_AGENT: &'static str = concat!("performer/", env!("CARGO_PKG_VERSION"));
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024; // 32MB
}

/// Runtime settings for an image loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LoaderSettings {
    /// Maximum wait for connectivity, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Delay before the "no network" hint, in milliseconds.
    pub hint_delay_ms: u64,
    /// URLs probed to decide whether the network is reachable.
    pub probe_urls: Vec<String>,
    pub probe_timeout_ms: u64,
    pub offline_recheck_secs: u64,
    pub online_verify_secs: u64,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: GateConfig::FETCH_TIMEOUT.as_millis() as u64,
            hint_delay_ms: GateConfig::NO_NETWORK_HINT_DELAY.as_millis() as u64,
            probe_urls: ProbeConfig::PROBE_URLS.iter().map(|s| s.to_string()).collect(),
            probe_timeout_ms: ProbeConfig::PROBE_TIMEOUT.as_millis() as u64,
            offline_recheck_secs: ProbeConfig::OFFLINE_RECHECK_INTERVAL.as_secs(),
            online_verify_secs: ProbeConfig::ONLINE_VERIFY_INTERVAL.as_secs(),
        }
    }
}

impl LoaderSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PerformerError::io_with_path(e, path))?;
        let settings: Self = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that could never produce a working loader.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_ms == 0 {
            return Err(PerformerError::Config {
                message: "fetch_timeout_ms must be greater than zero".to_string(),
            });
        }
        if self.probe_urls.is_empty() {
            return Err(PerformerError::Config {
                message: "at least one probe URL is required".to_string(),
            });
        }
        for url in &self.probe_urls {
            url::Url::parse(url)?;
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn hint_delay(&self) -> Duration {
        Duration::from_millis(self.hint_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn offline_recheck_interval(&self) -> Duration {
        Duration::from_secs(self.offline_recheck_secs)
    }

    pub fn online_verify_interval(&self) -> Duration {
        Duration::from_secs(self.online_verify_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_constants() {
        let settings = LoaderSettings::default();
        assert_eq!(settings.fetch_timeout(), GateConfig::FETCH_TIMEOUT);
        assert_eq!(settings.hint_delay(), Duration::from_millis(500));
        assert_eq!(settings.probe_urls.len(), ProbeConfig::PROBE_URLS.len());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fetch_timeout_ms": 750}}"#).unwrap();

        let settings = LoaderSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.fetch_timeout(), Duration::from_millis(750));
        assert_eq!(settings.hint_delay(), GateConfig::NO_NETWORK_HINT_DELAY);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let settings = LoaderSettings {
            fetch_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(PerformerError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_probe_url() {
        let settings = LoaderSettings {
            probe_urls: vec!["::nope::".to_string()],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_file_missing_path() {
        let err = LoaderSettings::from_file("/nonexistent/performer.json").unwrap_err();
        assert!(matches!(err, PerformerError::Io { path: Some(_), .. }));
    }
}
