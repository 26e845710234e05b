//! Pipeline configuration.
//!
//! Defaults match the deployed cluster layout; every value can be overridden
//! through environment variables and, for the common ones, CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::search::SearchToolConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for per-structure pipeline runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineConfig {
    /// Domain-search tool settings.
    pub search: SearchToolConfig,
    /// Keep per-structure temporary directories after a run.
    pub keep_tmp: bool,
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DOMAIN_SEARCH_INTERPRETER`: interpreter for the tool; empty to run it directly
    /// - `DOMAIN_SEARCH_PROGRAM`: tool script or executable
    /// - `DOMAIN_SEARCH_DATABASE`: fold-classification database path
    /// - `DOMAIN_SEARCH_DEVICE`: compute device (default: cpu)
    /// - `DOMAIN_SEARCH_THREADS`: thread count (default: 1)
    /// - `DOMAIN_SEARCH_ITERATE`: pass `--iterate` (default: true)
    /// - `DOMAIN_SEARCH_TIMEOUT_SECS`: timeout per structure (default: 3600)
    /// - `PIPELINE_KEEP_TMP`: keep temporary directories (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DOMAIN_SEARCH_INTERPRETER") {
            config.search.interpreter = if val.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        if let Ok(val) = std::env::var("DOMAIN_SEARCH_PROGRAM") {
            config.search.program = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DOMAIN_SEARCH_DATABASE") {
            config.search.database = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DOMAIN_SEARCH_DEVICE") {
            config.search.device = val;
        }

        if let Ok(val) = std::env::var("DOMAIN_SEARCH_THREADS") {
            config.search.threads = parse_env_value(&val, "DOMAIN_SEARCH_THREADS")?;
        }

        if let Ok(val) = std::env::var("DOMAIN_SEARCH_ITERATE") {
            config.search.iterate = parse_env_bool(&val, "DOMAIN_SEARCH_ITERATE")?;
        }

        if let Ok(val) = std::env::var("DOMAIN_SEARCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "DOMAIN_SEARCH_TIMEOUT_SECS")?;
            config.search.timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("PIPELINE_KEEP_TMP") {
            config.keep_tmp = parse_env_bool(&val, "PIPELINE_KEEP_TMP")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.program.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "search program cannot be empty".to_string(),
            ));
        }

        if self.search.database.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "search database cannot be empty".to_string(),
            ));
        }

        if self.search.device.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "search device cannot be empty".to_string(),
            ));
        }

        if self.search.threads == 0 {
            return Err(ConfigError::ValidationFailed(
                "search threads must be greater than 0".to_string(),
            ));
        }

        if self.search.timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "search timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Sets the tool interpreter (`None` runs the tool directly).
    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.search.interpreter = interpreter;
        self
    }

    /// Sets the tool program.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.search.program = program.into();
        self
    }

    /// Sets the database path.
    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.search.database = database.into();
        self
    }

    /// Sets the thread count.
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.search.threads = threads;
        self
    }

    /// Sets the per-structure timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.search.timeout = timeout;
        self
    }

    /// Keeps temporary directories after each run.
    pub fn with_keep_tmp(mut self, keep: bool) -> Self {
        self.keep_tmp = keep;
        self
    }
}

/// Parse an environment variable value into the target type.
pub(crate) fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
pub(crate) fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.search.device, "cpu");
        assert_eq!(config.search.threads, 1);
        assert!(config.search.iterate);
        assert!(config.search.output_headers);
        assert!(config.search.interpreter.is_some());
        assert!(!config.keep_tmp);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new()
            .with_interpreter(None)
            .with_program("/usr/local/bin/merizo")
            .with_database("/data/cath")
            .with_threads(8)
            .with_timeout(Duration::from_secs(60))
            .with_keep_tmp(true);

        assert!(config.search.interpreter.is_none());
        assert_eq!(config.search.program, PathBuf::from("/usr/local/bin/merizo"));
        assert_eq!(config.search.database, PathBuf::from("/data/cath"));
        assert_eq!(config.search.threads, 8);
        assert_eq!(config.search.timeout, Duration::from_secs(60));
        assert!(config.keep_tmp);
    }

    #[test]
    fn test_validation_rejects_zero_threads() {
        let config = PipelineConfig::new().with_threads(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("threads"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let config = PipelineConfig::new().with_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let threads: u32 = parse_env_value("4", "DOMAIN_SEARCH_THREADS").unwrap();
        assert_eq!(threads, 4);

        let err = parse_env_value::<u32>("four", "DOMAIN_SEARCH_THREADS").unwrap_err();
        assert!(err.to_string().contains("DOMAIN_SEARCH_THREADS"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("yes", "X").unwrap());
        assert!(parse_env_bool("TRUE", "X").unwrap());
        assert!(!parse_env_bool("off", "X").unwrap());
        assert!(parse_env_bool("maybe", "X").is_err());
    }
}
