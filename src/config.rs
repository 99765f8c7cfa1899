// Configuration File Support
//
// This module provides configuration file parsing for the delegation tool.
// Configuration lives in `config.json` under the base directory
// ($DELEGATE_HOME, default ~/.claude/hooks/delegation), with environment
// variable overrides. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::delegation::{ExecutionTimeout, ExecutorConfig};
use crate::error::ConfigError;
use crate::registry::{ServiceOverride, ServiceRegistry};
use crate::usage::UsageSettings;

pub const CONFIG_FILE: &str = "config.json";
pub const HOME_ENV: &str = "DELEGATE_HOME";

/// Upper bounds keeping usage windows inside chrono's range
pub const MAX_RETENTION_HOURS: i64 = 24 * 365 * 10;
pub const MAX_SESSION_TIMEOUT_SECS: i64 = 7 * 24 * 3600;
pub const MAX_SUMMARY_DAYS: i64 = 36_500;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Child process limits
    pub execution: ExecutionConfig,

    /// Usage tracking windows
    pub usage: UsageConfig,

    /// Per-service overrides and additional services, keyed by name
    pub services: BTreeMap<String, ServiceOverride>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("Failed to parse log level: {}", e)))
    }
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Timeout for a delegated call when none is given
    pub default_timeout_secs: u64,

    /// Timeout for each readiness probe
    pub probe_timeout_secs: u64,

    /// Maximum captured bytes per output stream
    pub max_output_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: crate::delegation::timeout::DEFAULT_TIMEOUT_SECS,
            probe_timeout_secs: crate::delegation::timeout::PROBE_TIMEOUT_SECS,
            max_output_size: crate::delegation::executor::MAX_OUTPUT_SIZE,
        }
    }
}

/// Usage tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UsageConfig {
    /// How far back the working view reaches
    pub retention_hours: i64,

    /// Gap after which a new session starts
    pub session_timeout_secs: i64,

    /// Default period for usage reports
    pub summary_days: i64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            retention_hours: crate::usage::store::DEFAULT_RETENTION_HOURS,
            session_timeout_secs: crate::usage::session::DEFAULT_SESSION_TIMEOUT_SECS,
            summary_days: 7,
        }
    }
}

/// Base directory for configuration and usage state
///
/// `$DELEGATE_HOME` if set, otherwise `~/.claude/hooks/delegation`.
pub fn default_home() -> PathBuf {
    home_from(std::env::var_os(HOME_ENV).map(PathBuf::from))
}

fn home_from(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".claude")
                .join("hooks")
                .join("delegation")
        })
}

impl Config {
    /// Path of the configuration file under `home`
    pub fn config_path(home: &Path) -> PathBuf {
        home.join(CONFIG_FILE)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read, parsed
    /// or validated. If the config file does not exist, returns the default
    /// configuration with environment overrides applied.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            let config = Self::default().apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        // Apply environment variable overrides
        let config = config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - DELEGATE_LOG_LEVEL
    /// - DELEGATE_LOG_FORMAT
    /// - DELEGATE_TIMEOUT_SECS
    pub fn apply_env_overrides(self) -> Self {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn apply_env_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging overrides
        if let Some(level) = lookup("DELEGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DELEGATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Execution overrides
        if let Some(timeout) = lookup("DELEGATE_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.trim().parse::<u64>() {
                if timeout > 0 {
                    self.execution.default_timeout_secs = timeout;
                }
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return invalid(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ))
            }
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return invalid(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                ))
            }
        }

        // Validate execution configuration
        if self.execution.default_timeout_secs == 0 {
            return invalid("Default timeout must be > 0".to_string());
        }
        if self.execution.probe_timeout_secs == 0 {
            return invalid("Probe timeout must be > 0".to_string());
        }
        if self.execution.max_output_size < 16 {
            return invalid("Max output size must be at least 16 bytes".to_string());
        }

        // Validate usage configuration
        if !(1..=MAX_RETENTION_HOURS).contains(&self.usage.retention_hours) {
            return invalid(format!(
                "Usage retention must be between 1 and {} hours",
                MAX_RETENTION_HOURS
            ));
        }
        if !(1..=MAX_SESSION_TIMEOUT_SECS).contains(&self.usage.session_timeout_secs) {
            return invalid(format!(
                "Session timeout must be between 1 and {} seconds",
                MAX_SESSION_TIMEOUT_SECS
            ));
        }
        if !(1..=MAX_SUMMARY_DAYS).contains(&self.usage.summary_days) {
            return invalid(format!(
                "Summary period must be between 1 and {} days",
                MAX_SUMMARY_DAYS
            ));
        }

        // Validate service overrides
        for (name, service) in &self.services {
            if name.trim().is_empty() {
                return invalid("Service name must not be empty".to_string());
            }
            if service.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return invalid(format!("Service '{}' has empty command", name));
            }
        }

        Ok(())
    }

    pub fn usage_settings(&self) -> UsageSettings {
        UsageSettings {
            retention: chrono::Duration::hours(self.usage.retention_hours),
            session_timeout: chrono::Duration::seconds(self.usage.session_timeout_secs),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: ExecutionTimeout::from_secs(self.execution.default_timeout_secs),
            max_output_size: self.execution.max_output_size,
            working_dir: None,
        }
    }

    /// Built-in services merged with the configured overrides
    pub fn build_registry(&self) -> ServiceRegistry {
        let mut registry = ServiceRegistry::with_defaults()
            .with_probe_timeout(ExecutionTimeout::from_secs(self.execution.probe_timeout_secs));
        registry.merge_user_config(&self.services);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::{NamedTempFile, TempDir};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.execution.default_timeout_secs, 300);
        assert_eq!(config.execution.probe_timeout_secs, 10);
        assert_eq!(config.usage.retention_hours, 24);
        assert_eq!(config.usage.session_timeout_secs, 3600);
        assert_eq!(config.usage.summary_days, 7);
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_timeouts() {
        let mut config = Config::default();
        config.execution.default_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.execution.probe_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_usage_windows() {
        let mut config = Config::default();
        config.usage.retention_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.usage.session_timeout_secs = -5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_oversized_windows() {
        let mut config = Config::default();
        config.usage.retention_hours = MAX_RETENTION_HOURS;
        config.usage.session_timeout_secs = MAX_SESSION_TIMEOUT_SECS;
        config.usage.summary_days = MAX_SUMMARY_DAYS;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.usage.retention_hours = 100_000_000_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.usage.session_timeout_secs = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.usage.summary_days = MAX_SUMMARY_DAYS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_oversized_retention_is_invalid() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(
            temp_file.path(),
            r#"{"usage": {"retention_hours": 100000000000}}"#,
        )
        .unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_config_validation_empty_service_command() {
        let mut config = Config::default();
        config.services.insert(
            "custom".to_string(),
            ServiceOverride {
                command: Some("  ".to_string()),
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("custom"));
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_path(dir.path().join("config.json"));
        assert!(config.is_ok());
    }

    #[test]
    fn test_load_valid_json_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let json = r#"{
            "logging": {"level": "debug", "format": "json"},
            "execution": {"default_timeout_secs": 60},
            "usage": {"summary_days": 3},
            "services": {
                "gemini": {"quota_limits": {"requests_per_minute": 30}},
                "local": {"command": "ollama-run", "auth_method": "cli"}
            }
        }"#;
        fs::write(temp_file.path(), json).unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        let config: Config = serde_json::from_str(&content).unwrap();
        let config = config.apply_env_overrides_from(no_env);
        config.validate().unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.execution.default_timeout_secs, 60);
        assert_eq!(config.execution.probe_timeout_secs, 10);
        assert_eq!(config.usage.summary_days, 3);
        assert_eq!(config.services.len(), 2);

        let registry = config.build_registry();
        assert_eq!(registry.names(), vec!["gemini", "qwen", "local"]);
        assert_eq!(
            registry.resolve("gemini").unwrap().quota_limits.requests_per_minute,
            30
        );
    }

    #[test]
    fn test_load_invalid_json_config() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), r#"{"logging": {"level": "#).unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DELEGATE_LOG_LEVEL", "debug"),
            ("DELEGATE_LOG_FORMAT", "json"),
            ("DELEGATE_TIMEOUT_SECS", "42"),
        ]);

        let config = Config::default()
            .apply_env_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.execution.default_timeout_secs, 42);
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let config = Config::default().apply_env_overrides_from(|key| match key {
            "DELEGATE_TIMEOUT_SECS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.execution.default_timeout_secs, 300);

        let config = Config::default().apply_env_overrides_from(|key| match key {
            "DELEGATE_TIMEOUT_SECS" => Some("soon".to_string()),
            _ => None,
        });
        assert_eq!(config.execution.default_timeout_secs, 300);
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path(Path::new("/tmp/delegate"));
        assert_eq!(path, PathBuf::from("/tmp/delegate/config.json"));
    }

    #[test]
    fn test_home_resolution() {
        assert_eq!(
            home_from(Some(PathBuf::from("/srv/delegate"))),
            PathBuf::from("/srv/delegate")
        );
        assert!(home_from(None).ends_with(".claude/hooks/delegation"));
        assert!(home_from(Some(PathBuf::new())).ends_with(".claude/hooks/delegation"));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.logging.log_level().unwrap(), tracing::Level::DEBUG);

        config.logging.level = "INFO".to_string();
        assert_eq!(config.logging.log_level().unwrap(), tracing::Level::INFO);

        config.logging.level = "invalid".to_string();
        assert!(config.logging.log_level().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let mut config = Config::default();
        config.usage.retention_hours = 48;
        config.execution.max_output_size = 4096;

        let settings = config.usage_settings();
        assert_eq!(settings.retention, chrono::Duration::hours(48));
        assert_eq!(settings.session_timeout, chrono::Duration::hours(1));

        let executor = config.executor_config();
        assert_eq!(executor.max_output_size, 4096);
        assert_eq!(executor.timeout.as_secs(), 300);
    }

    #[test]
    fn test_valid_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = Config::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Log level {} should be valid", level);
        }
    }
}
