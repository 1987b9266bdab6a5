use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, num::NonZeroUsize, path::PathBuf, time::Duration};

use crate::{
    fetcher::{FetchOptions, TransportErrorPolicy},
    provider::DEFAULT_BASE_URL,
};

pub const DEFAULT_OUTPUT_DIR: &str = "output_data";

pub fn default_cities() -> Vec<String> {
    ["São Paulo", "Rio de Janeiro", "Belo Horizonte", "Paris", "New York"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// cities = ["Paris", "New York"]
/// output_dir = "output_data"
/// on_transport_error = "skip"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub cities: Vec<String>,
    pub output_dir: PathBuf,
    pub concurrency: NonZeroUsize,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: Option<u64>,
    pub on_transport_error: TransportErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let fetch = FetchOptions::default();
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
            cities: default_cities(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            concurrency: fetch.concurrency,
            retries: fetch.retries,
            retry_backoff_ms: fetch.retry_backoff.as_millis() as u64,
            timeout_secs: None,
            on_transport_error: fetch.on_transport_error,
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::parse_file(&path)
    }

    fn parse_file(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "cityweather", "cityweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty()).ok_or_else(|| {
            anyhow!(
                "No API key configured.\n\
                 Hint: run `cityweather configure`, pass --api-key or set OPENWEATHER_API_KEY."
            )
        })
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            concurrency: self.concurrency,
            retries: self.retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            on_transport_error: self.on_transport_error,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behaviour() {
        let cfg = Config::default();
        let opts = cfg.fetch_options();

        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.cities.len(), 5);
        assert_eq!(cfg.output_dir, PathBuf::from("output_data"));
        assert_eq!(opts.concurrency.get(), 1);
        assert_eq!(opts.retries, 0);
        assert_eq!(opts.timeout, None);
        assert_eq!(opts.on_transport_error, TransportErrorPolicy::Abort);
    }

    #[test]
    fn require_api_key_errors_when_missing_or_empty() {
        let mut cfg = Config::default();
        let err = cfg.require_api_key().unwrap_err();
        assert!(err.to_string().contains("No API key configured"));

        cfg.api_key = Some(String::new());
        assert!(cfg.require_api_key().is_err());

        cfg.api_key = Some("KEY".into());
        assert_eq!(cfg.require_api_key().unwrap(), "KEY");
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            api_key = "abc"
            cities = ["Oslo"]
            timeout_secs = 10
            on_transport_error = "skip"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.api_key.as_deref(), Some("abc"));
        assert_eq!(cfg.cities, ["Oslo"]);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);

        let opts = cfg.fetch_options();
        assert_eq!(opts.timeout, Some(Duration::from_secs(10)));
        assert_eq!(opts.on_transport_error, TransportErrorPolicy::Skip);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let res: Result<Config, _> = toml::from_str("concurrency = 0");
        assert!(res.is_err());
    }

    #[test]
    fn toml_roundtrip_preserves_config() {
        let cfg = Config {
            api_key: Some("KEY".into()),
            timeout_secs: Some(3),
            ..Default::default()
        };

        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn parse_file_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "cities = 3").unwrap();

        let err = Config::parse_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
