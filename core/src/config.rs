//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TrackerError};

/// Base URL of the hosted v2 API.
pub const DEFAULT_BASE_URL: &str = "https://www.pivotaltracker.com/services/v2";

/// Settings for a `TrackerClient`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:3000/services/v2` when debugging.
    pub base_url: String,
    /// Upper bound on each whole request, in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| TrackerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by `TRACKER_BASE_URL` and `TRACKER_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(base_url) = lookup("TRACKER_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(raw) = lookup("TRACKER_TIMEOUT_SECS") {
            let secs = raw.trim().parse().map_err(|_| {
                TrackerError::Config(format!("TRACKER_TIMEOUT_SECS '{raw}' is not a number"))
            })?;
            config.timeout_secs = Some(secs);
        }
        Ok(config)
    }

    /// The base URL without a trailing `/`.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_hosted_https_api() {
        let config = ClientConfig::default();
        assert!(config.base_url.starts_with("https://"));
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let config = ClientConfig::with_base_url("http://localhost:3000/services/v2/");
        assert_eq!(config.normalized_base_url(), "http://localhost:3000/services/v2");
    }

    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let config = ClientConfig::from_toml_str("timeout_secs = 5").unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ClientConfig::from_toml_str("timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "base_url = \"http://localhost:9000/services/v2\"\n").unwrap();
        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "http://localhost:9000/services/v2");
    }

    #[test]
    fn load_missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn env_lookup_overrides_defaults() {
        let config = ClientConfig::from_lookup(|key| match key {
            "TRACKER_BASE_URL" => Some("http://debug/services/v2".to_string()),
            "TRACKER_TIMEOUT_SECS" => Some("30".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.base_url, "http://debug/services/v2");
        assert_eq!(config.timeout_secs, Some(30));
    }

    #[test]
    fn env_lookup_rejects_bad_timeout() {
        let err = ClientConfig::from_lookup(|key| {
            (key == "TRACKER_TIMEOUT_SECS").then(|| "never".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }
}
