//! Application configuration.
//!
//! Loaded from `~/.config/taxclaw/config.json`; every option has a default so
//! a missing file means a fully local setup. Cloud mode is an explicit opt-in
//! twice over: `backend = "cloud"` plus `cloud_ack = true`. Without the
//! acknowledgment, anything that would send document content off-machine
//! fails before a single byte leaves.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "TaxClaw";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shown when cloud mode is configured without the acknowledgment flag.
pub const PRIVACY_WARNING: &str = "PRIVACY WARNING: You have configured TaxClaw to use a cloud-hosted AI model. \
Tax documents contain sensitive personal and financial information including \
Social Security Numbers, income, and asset holdings. When using cloud models, \
document content is transmitted to a third-party AI provider outside your \
local control. For maximum privacy, use local models (the default). Set \
`cloud_ack: true` in config.json only if you understand and accept this.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cloud mode is configured but cloud_ack is not set; refusing to send document content to a cloud provider")]
    CloudModeNotAcknowledged,

    #[error("cloud mode requires an API key (set cloud_api_key or ANTHROPIC_API_KEY)")]
    MissingApiKey,

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which inference backend extraction uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Cloud,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    /// Explicit opt-in required before any cloud extraction.
    pub cloud_ack: bool,
    pub local_model: String,
    pub cloud_model: String,
    /// Usually left empty in the file; `ANTHROPIC_API_KEY` overrides.
    pub cloud_api_key: String,
    pub ollama_url: String,
    pub request_timeout_secs: u64,
    /// Any field below this confidence is flagged for review.
    pub review_floor: f32,
    /// Required fields must clear this (higher) floor.
    pub required_floor: f32,
    /// Segments classified below this force the whole record into review.
    pub classifier_floor: f32,
    /// Transient backend failures are retried this many times.
    pub retry_count: u32,
    /// Initial backoff; doubles per attempt.
    pub retry_backoff_ms: u64,
    /// Overrides the default data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            cloud_ack: false,
            local_model: "llama3.2-vision".to_string(),
            cloud_model: "claude-haiku-4-5".to_string(),
            cloud_api_key: String::new(),
            ollama_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 300,
            review_floor: 0.70,
            required_floor: 0.85,
            classifier_floor: 0.60,
            retry_count: 2,
            retry_backoff_ms: 500,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load from the default config path, falling back to defaults when the
    /// file does not exist. `ANTHROPIC_API_KEY` overrides an empty key.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        let mut config = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };
        if config.cloud_api_key.is_empty() {
            if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
                config.cloud_api_key = key;
            }
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Fail fast when cloud mode is configured without the privacy
    /// acknowledgment or an API key. Local mode always passes.
    pub fn ensure_cloud_acknowledged(&self) -> Result<(), ConfigError> {
        if self.backend == BackendKind::Cloud {
            if !self.cloud_ack {
                return Err(ConfigError::CloudModeNotAcknowledged);
            }
            if self.cloud_api_key.is_empty() {
                return Err(ConfigError::MissingApiKey);
            }
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_path().join("uploads")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_path().join("tax.db")
    }
}

/// `~/.config/taxclaw/config.json`
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taxclaw")
        .join("config.json")
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taxclaw")
}

pub fn default_log_filter() -> String {
    "taxclaw=info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fully_local() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::Local);
        assert!(!config.cloud_ack);
        assert!(config.ensure_cloud_acknowledged().is_ok());
    }

    #[test]
    fn cloud_without_ack_is_rejected() {
        let config = Config {
            backend: BackendKind::Cloud,
            cloud_ack: false,
            cloud_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.ensure_cloud_acknowledged(),
            Err(ConfigError::CloudModeNotAcknowledged)
        ));
    }

    #[test]
    fn cloud_without_key_is_rejected() {
        let config = Config {
            backend: BackendKind::Cloud,
            cloud_ack: true,
            ..Config::default()
        };
        assert!(matches!(
            config.ensure_cloud_acknowledged(),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn acknowledged_cloud_passes() {
        let config = Config {
            backend: BackendKind::Cloud,
            cloud_ack: true,
            cloud_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        assert!(config.ensure_cloud_acknowledged().is_ok());
    }

    #[test]
    fn thresholds_default_sanely() {
        let config = Config::default();
        assert!(config.review_floor < config.required_floor);
        assert!(config.classifier_floor <= config.review_floor);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let back: Config = serde_json::from_str(r#"{"backend": "cloud"}"#).unwrap();
        assert_eq!(back.backend, BackendKind::Cloud);
        assert_eq!(back.retry_backoff_ms, 500);
        assert!(!back.cloud_ack);
    }
}
