//! Client configuration.
//!
//! ```toml
//! base_url = "https://clinic.example.org/api/"
//! stage = "assessment"
//! poll_interval_secs = 5
//! token_env = "CLINIC_QUEUE_TOKEN"
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 500
//! max_delay_ms = 8000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::QueueStage;
use crate::poller::{PollingController, RetryPolicy};

/// Environment variable read for the bearer token when none is configured.
pub const DEFAULT_TOKEN_ENV: &str = "CLINIC_QUEUE_TOKEN";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Retry settings as written in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Settings for talking to the queueing service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Service root, e.g. `https://clinic.example.org/api/`
    pub base_url: String,
    /// Queue to watch
    #[serde(default)]
    pub stage: QueueStage,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bearer token; prefer `token_env` outside of development
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

impl ClientConfig {
    /// Defaults for a service root.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stage: QueueStage::default(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            token: None,
            token_env: default_token_env(),
            retry: RetryConfig::default(),
        }
    }

    /// Load and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be greater than 0".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be greater than 0".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid("retry.base_delay_ms exceeds retry.max_delay_ms".into()));
        }
        Ok(())
    }

    /// Configured token, else the one in `token_env`.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    /// Controller for the configured queue.
    pub fn controller(&self) -> PollingController {
        PollingController::new(self.stage, self.poll_interval(), self.retry_policy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml_str(r#"base_url = "http://localhost:8000/""#).unwrap();
        assert_eq!(config, ClientConfig::new("http://localhost:8000/"));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_full_config() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "https://clinic.example.org/api/"
            stage = "treatment"
            poll_interval_secs = 2
            token = "abc"

            [retry]
            max_retries = 5
            base_delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.stage, QueueStage::Treatment);
        assert_eq!(config.resolve_token().as_deref(), Some("abc"));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.max_delay_ms, 8000);
        assert_eq!(config.controller().queue(), QueueStage::Treatment);
    }

    #[test]
    fn test_stage_aliases_match_command_line() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "http://clinic.local"
            stage = "triage"
            "#,
        )
        .unwrap();
        assert_eq!(config.stage, "triage".parse::<QueueStage>().unwrap());
    }

    #[test]
    fn test_invalid_values() {
        let result = ClientConfig::from_toml_str(r#"base_url = "clinic.local""#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = ClientConfig::from_toml_str(
            r#"
            base_url = "http://clinic.local"
            poll_interval_secs = 0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = ClientConfig::from_toml_str(
            r#"
            base_url = "http://clinic.local"
            stage = "pharmacy"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_token_from_env() {
        let mut config = ClientConfig::new("http://clinic.local");
        config.token_env = "CLINIC_QUEUE_TEST_TOKEN_FROM_ENV".into();
        std::env::set_var("CLINIC_QUEUE_TEST_TOKEN_FROM_ENV", " secret \n");
        assert_eq!(config.resolve_token().as_deref(), Some("secret"));

        config.token_env = "CLINIC_QUEUE_TEST_TOKEN_UNSET".into();
        assert_eq!(config.resolve_token(), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"http://127.0.0.1:8000/\"\nstage = \"assessment\"").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.stage, QueueStage::Assessment);
    }

    #[test]
    fn test_missing_file() {
        let result = ClientConfig::load("/nonexistent/clinic-queue.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
