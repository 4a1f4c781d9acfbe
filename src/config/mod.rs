mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::path::Path;
use std::time::Duration;

/// Headroom a job gets past the oracle timeout before the stall sweep may
/// hand it to another worker
const STALL_MARGIN_SEC: u64 = 30;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database: default_database(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            stall_timeout_sec: default_stall_timeout_sec(),
            retry: RetryConfig::default(),
            oracle: OracleConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load config if the file exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_base_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_base_ms must be positive".to_string(),
            ));
        }
        if self.retry.backoff_max_ms < self.retry.backoff_base_ms {
            return Err(ConfigError::Invalid(
                "retry.backoff_max_ms must not be below retry.backoff_base_ms".to_string(),
            ));
        }
        if self.oracle.timeout_sec == 0 {
            return Err(ConfigError::Invalid(
                "oracle.timeout_sec must be positive".to_string(),
            ));
        }
        let min_stall = self.oracle.timeout_sec.saturating_add(STALL_MARGIN_SEC);
        if self.stall_timeout_sec < min_stall {
            return Err(ConfigError::Invalid(format!(
                "stall_timeout_sec must be at least oracle.timeout_sec + {} ({})",
                STALL_MARGIN_SEC, min_stall
            )));
        }
        Ok(())
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_sec)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
database: /var/lib/goalplan/app.db
concurrency: 8
retry:
  max_attempts: 5
oracle:
  provider: openai_http
  openai_http:
    model: gpt-4.1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_base_ms, 1000);
        assert_eq!(config.oracle.provider, OracleProvider::OpenaiHttp);
        assert_eq!(config.oracle.openai_http.model, "gpt-4.1");
        assert_eq!(config.oracle.openai_http.api_key_env, "OPENAI_API_KEY");
        assert!(config.notify.event_url.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms: 250\nstall_timeout_sec: 30").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.stall_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_validate_rejects_bad_retry() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.backoff_max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stall_timeout_sec = 0;
        assert!(config.validate().is_err());

        // A healthy oracle call must never look stalled
        let mut config = Config::default();
        config.oracle.timeout_sec = 120;
        config.stall_timeout_sec = 30;
        assert!(config.validate().is_err());
        config.stall_timeout_sec = 149;
        assert!(config.validate().is_err());
        config.stall_timeout_sec = 150;
        config.validate().unwrap();
    }
}
