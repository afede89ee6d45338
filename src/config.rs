//! Configuration types for coursecap

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote API configuration (base path, matching predicate, paging)
///
/// Groups settings that describe the token-protected API the crawler talks
/// to. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API, up to and including the fixed API prefix
    /// (e.g., `https://school.api.example.org/api`). Required.
    #[serde(default)]
    pub base_url: String,

    /// Path markers used by the transport observer to decide which outbound
    /// calls to inspect. A call matches when its target URL contains any of
    /// these substrings.
    #[serde(default = "default_path_markers")]
    pub path_markers: Vec<String>,

    /// Page size requested from the listing endpoints (default: 200)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// HTTP request timeout in seconds (default: 15)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path_markers: default_path_markers(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Credential discovery configuration
///
/// Bounds and intervals for the ordered fallback chain. Used as a nested
/// sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum traversal depth for the runtime introspection provider
    /// (default: 500). Prevents unbounded walks of self-referential host
    /// state.
    #[serde(default = "default_introspection_depth")]
    pub introspection_depth: usize,

    /// How long to wait after the benign probe request for the observer to
    /// capture a credential, in milliseconds (default: 500). The probe is
    /// attempted exactly once.
    #[serde(default = "default_probe_wait_ms")]
    pub probe_wait_ms: u64,

    /// Minimum length of the opaque token portion for a value to be
    /// recognized as a bearer credential (default: 100)
    #[serde(default = "default_token_min_length")]
    pub token_min_length: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            introspection_depth: default_introspection_depth(),
            probe_wait_ms: default_probe_wait_ms(),
            token_min_length: default_token_min_length(),
        }
    }
}

impl DiscoveryConfig {
    /// Probe wait as a [`Duration`]
    pub fn probe_wait(&self) -> Duration {
        Duration::from_millis(self.probe_wait_ms)
    }
}

/// Artifact aggregation configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Number of artifact fetches issued concurrently per batch (default: 10).
    ///
    /// Batch N+1 never starts before batch N fully resolves; this is the
    /// only concurrency bound in the pipeline.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Export emission configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory the output artifacts are written into (default: "./captures")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

/// Main configuration for [`CourseCapture`](crate::CourseCapture)
///
/// Fields are organized into logical sub-configs:
/// - [`api`](ApiConfig) - base URL, observer predicate, paging, timeouts
/// - [`discovery`](DiscoveryConfig) - credential fallback-chain bounds
/// - [`artifacts`](ArtifactConfig) - batch fetching
/// - [`export`](ExportConfig) - output artifact emission
///
/// All sub-config fields are flattened so the serialized format stays flat
/// (no nesting in JSON/TOML).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(flatten)]
    pub api: ApiConfig,

    /// Credential discovery settings
    #[serde(flatten)]
    pub discovery: DiscoveryConfig,

    /// Artifact aggregation settings
    #[serde(flatten)]
    pub artifacts: ArtifactConfig,

    /// Export emission settings
    #[serde(flatten)]
    pub export: ExportConfig,
}

impl Config {
    /// Create a configuration with the given API base URL and defaults for
    /// everything else
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                ..ApiConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API base URL is empty or not a valid
    /// absolute URL, or if the artifact batch size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(Error::config(
                "API base URL must not be empty",
                Some("base_url"),
            ));
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::config(
                format!("API base URL is not a valid URL: {}", self.api.base_url),
                Some("base_url"),
            ));
        }
        if self.artifacts.batch_size == 0 {
            return Err(Error::config(
                "artifact batch size must be at least 1",
                Some("batch_size"),
            ));
        }
        Ok(())
    }
}

fn default_path_markers() -> Vec<String> {
    vec![
        "groupAssessments".to_string(),
        "assessments".to_string(),
        "problemInstances".to_string(),
    ]
}

fn default_page_size() -> u32 {
    200
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("coursecap/{}", env!("CARGO_PKG_VERSION"))
}

fn default_introspection_depth() -> usize {
    500
}

fn default_probe_wait_ms() -> u64 {
    500
}

fn default_token_min_length() -> usize {
    100
}

fn default_batch_size() -> usize {
    10
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./captures")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.api.page_size, 200);
        assert_eq!(config.api.request_timeout_secs, 15);
        assert_eq!(config.discovery.introspection_depth, 500);
        assert_eq!(config.discovery.probe_wait_ms, 500);
        assert_eq!(config.discovery.token_min_length, 100);
        assert_eq!(config.artifacts.batch_size, 10);
        assert_eq!(config.export.output_dir, PathBuf::from("./captures"));
    }

    #[test]
    fn validate_rejects_empty_base_url() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base URL"));
    }

    #[test]
    fn validate_rejects_relative_base_url() {
        let config = Config::new("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = Config::new("https://api.example.org/api");
        config.artifacts.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_sensible_config() {
        let config = Config::new("https://api.example.org/api");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_deserializes_from_flat_json() {
        let json = r#"{
            "base_url": "https://api.example.org/api",
            "batch_size": 5,
            "probe_wait_ms": 250
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.org/api");
        assert_eq!(config.artifacts.batch_size, 5);
        assert_eq!(config.discovery.probe_wait_ms, 250);
        // untouched fields fall back to defaults
        assert_eq!(config.api.page_size, 200);
    }
}
