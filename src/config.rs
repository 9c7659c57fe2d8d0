//! Configuration management for narramine.
//!
//! Settings come from an optional TOML file plus the environment. Every field
//! has a default so a bare `narramine init` works without any config file.
//! Configuration problems are fatal at pipeline start; no partial run is
//! attempted against a half-valid setup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the model API key.
pub const API_KEY_ENV: &str = "NARRAMINE_API_KEY";
/// Fallback key variable, matching the upstream provider's conventional name.
pub const API_KEY_ENV_FALLBACK: &str = "GEMINI_API_KEY";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Cache directory {} could not be created: {}", .0.display(), .1)]
    CacheDir(PathBuf, std::io::Error),

    #[error("Model API key not set (export NARRAMINE_API_KEY or GEMINI_API_KEY)")]
    MissingApiKey,
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Minimum theme confidence for a record to count as accepted.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Minimum delay between live model requests, in milliseconds.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Retry ceiling for transport and provider errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Cap on narratives processed per invocation (0 = unlimited).
    #[serde(default)]
    pub batch_limit: usize,
    /// Narratives with fewer trimmed characters than this are skipped.
    #[serde(default = "default_min_narrative_chars")]
    pub min_narrative_chars: usize,
    /// Estimated provider cost per live request, for run reports.
    #[serde(default = "default_cost_per_request")]
    pub cost_per_request: f64,
}

fn default_confidence_threshold() -> f64 {
    0.6
}
fn default_min_request_interval_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_min_narrative_chars() -> usize {
    10
}
fn default_cost_per_request() -> f64 {
    0.0001
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            min_request_interval_ms: default_min_request_interval_ms(),
            max_retries: default_max_retries(),
            batch_limit: 0,
            min_narrative_chars: default_min_narrative_chars(),
            cost_per_request: default_cost_per_request(),
        }
    }
}

/// Model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model to use for extraction.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key. Usually left unset here and supplied via the environment.
    #[serde(default)]
    pub api_key: Option<String>,
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmSettings {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .or_else(|| std::env::var(API_KEY_ENV_FALLBACK).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Data directory holding the database and extraction cache.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Extraction cache directory (default: `<data_dir>/cache`).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Prompt version to activate before a run. When unset, the version
    /// already active in the store is used.
    #[serde(default)]
    pub active_prompt_version: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub llm: LlmSettings,
}

impl Settings {
    /// Load settings from an explicit file, or defaults when absent.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from("narramine.toml");
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("narramine")
    }

    /// Effective cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("cache"))
    }

    /// Path to the analytics database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("narramine.db")
    }

    /// Validate everything a pipeline run needs up front.
    ///
    /// `needs_api_key` is false when every pending unit can be served from
    /// cache, or when a test backend is injected.
    pub fn validate_for_run(&self, needs_api_key: bool) -> Result<(), ConfigError> {
        let cache_dir = self.cache_dir();
        fs::create_dir_all(&cache_dir).map_err(|e| ConfigError::CacheDir(cache_dir, e))?;

        if needs_api_key && self.llm.resolve_api_key().is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.pipeline.confidence_threshold, 0.6);
        assert_eq!(settings.pipeline.max_retries, 3);
        assert_eq!(settings.pipeline.min_narrative_chars, 10);
        assert!(settings.llm.model.contains("gemini"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            data_dir = "/tmp/narramine-test"

            [pipeline]
            confidence_threshold = 0.75
            batch_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(settings.pipeline.confidence_threshold, 0.75);
        assert_eq!(settings.pipeline.batch_limit, 50);
        // Unset fields keep their defaults.
        assert_eq!(settings.pipeline.max_retries, 3);
        assert_eq!(settings.database_path().file_name().unwrap(), "narramine.db");
    }

    #[test]
    fn test_cache_dir_defaults_under_data_dir() {
        let settings: Settings = toml::from_str(r#"data_dir = "/tmp/nm""#).unwrap();
        assert_eq!(settings.cache_dir(), PathBuf::from("/tmp/nm/cache"));
    }
}
