//! Configuration Management
//!
//! Settings for the emulator, read from a YAML file. Every field is optional;
//! effective values resolve CLI flag > config file > environment > default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default listen port
pub const DEFAULT_PORT: u16 = 5000;

/// Default AWS account id used as `ownerId`
pub const DEFAULT_ACCOUNT_ID: &str = "123456789012";

/// Default base of GCP `selfLink` URLs
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/compute/v1";

/// GCP list calls return at most this many items per page
pub const GCP_MAX_PAGE_SIZE: usize = 500;

/// Completed GCP operations kept per project and location
pub const DEFAULT_OPERATION_HISTORY: usize = 1000;

/// Emulator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Listen address
    #[serde(default)]
    pub bind: Option<String>,
    /// Listen port
    #[serde(default)]
    pub port: Option<u16>,
    /// AWS account id reported as the owner of every resource
    #[serde(default)]
    pub account_id: Option<String>,
    /// AWS region, used to derive availability zones
    #[serde(default)]
    pub region: Option<String>,
    /// GCP zones accepted in zonal paths and listed by aggregatedList
    #[serde(default)]
    pub zones: Option<Vec<String>>,
    /// Base URL for GCP self links
    #[serde(default)]
    pub base_url: Option<String>,
    /// GCP page size when `maxResults` is absent
    #[serde(default)]
    pub default_page_size: Option<usize>,
    /// Upper bound on GCP `maxResults`
    #[serde(default)]
    pub max_page_size: Option<usize>,
    /// GCP operations kept per project and location; older ones are dropped
    #[serde(default)]
    pub operation_history: Option<usize>,
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudmock").join("config.yaml"))
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from an explicit file. Errors are reported.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn effective_bind(&self) -> String {
        self.bind
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Get effective account id (config > CLOUDMOCK_ACCOUNT_ID > default)
    pub fn effective_account_id(&self) -> String {
        self.account_id
            .clone()
            .or_else(|| std::env::var("CLOUDMOCK_ACCOUNT_ID").ok())
            .filter(|id| id.len() == 12 && id.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string())
    }

    /// Get effective AWS region (config > AWS_REGION > AWS_DEFAULT_REGION > us-east-1)
    pub fn effective_region(&self) -> String {
        self.region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "us-east-1".to_string())
    }

    pub fn effective_zones(&self) -> Vec<String> {
        match &self.zones {
            Some(zones) if !zones.is_empty() => zones.clone(),
            _ => default_zones(),
        }
    }

    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn effective_max_page_size(&self) -> usize {
        self.max_page_size
            .unwrap_or(GCP_MAX_PAGE_SIZE)
            .clamp(1, GCP_MAX_PAGE_SIZE)
    }

    pub fn effective_default_page_size(&self) -> usize {
        self.default_page_size
            .unwrap_or(GCP_MAX_PAGE_SIZE)
            .clamp(1, self.effective_max_page_size())
    }

    pub fn effective_operation_history(&self) -> usize {
        self.operation_history
            .unwrap_or(DEFAULT_OPERATION_HISTORY)
            .max(1)
    }
}

/// Zones known to the emulator when none are configured
pub fn default_zones() -> Vec<String> {
    [
        "us-central1-a",
        "us-central1-b",
        "us-central1-c",
        "us-central1-f",
        "us-east1-b",
        "us-east1-c",
        "us-east1-d",
        "us-west1-a",
        "us-west1-b",
        "europe-west1-b",
        "europe-west1-c",
        "asia-east1-a",
    ]
    .iter()
    .map(|z| z.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config {
            account_id: Some("000000000000".to_string()),
            region: Some("eu-west-1".to_string()),
            ..Config::default()
        };
        assert_eq!(config.effective_port(), DEFAULT_PORT);
        assert_eq!(config.effective_account_id(), "000000000000");
        assert_eq!(config.effective_region(), "eu-west-1");
        assert_eq!(config.effective_base_url(), DEFAULT_BASE_URL);
        assert!(config.effective_zones().contains(&"us-central1-a".to_string()));
    }

    #[test]
    fn test_invalid_account_id_falls_back() {
        let config = Config {
            account_id: Some("not-an-account".to_string()),
            ..Config::default()
        };
        assert_eq!(config.effective_account_id().len(), 12);
    }

    #[test]
    fn test_page_sizes_are_clamped() {
        let config = Config {
            default_page_size: Some(10_000),
            max_page_size: Some(50),
            ..Config::default()
        };
        assert_eq!(config.effective_max_page_size(), 50);
        assert_eq!(config.effective_default_page_size(), 50);
    }

    #[test]
    fn test_operation_history() {
        assert_eq!(Config::default().effective_operation_history(), DEFAULT_OPERATION_HISTORY);
        let config = Config {
            operation_history: Some(0),
            ..Config::default()
        };
        assert_eq!(config.effective_operation_history(), 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.yaml");
        let config = Config {
            port: Some(9000),
            zones: Some(vec!["us-east1-b".to_string()]),
            base_url: Some("http://localhost:9000/compute/v1/".to_string()),
            ..Config::default()
        };

        config.save_to(&path).expect("save");
        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded, config);
        assert_eq!(loaded.effective_base_url(), "http://localhost:9000/compute/v1");
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "port: [not, a, port]").expect("write");
        assert!(Config::load_from(&path).is_err());
    }
}
