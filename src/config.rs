//! Toolgate Configuration Module
//!
//! Tunables for logging, retries, metrics, circuit breakers and alerts.
//! Durations are written as seconds (`f64`).
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`TOOLGATE_LOG_LEVEL`, `TOOLGATE_LOG_JSON`,
//!    `TOOLGATE_METRICS_CAPACITY`, `TOOLGATE_RETRY_MAX_ATTEMPTS`)
//! 2. Config file given on the command line
//! 3. Config file at `~/.config/toolgate/config.toml`
//! 4. Defaults
//!
//! ```toml
//! [retry]
//! max_attempts = 4
//! strategy = "jitter"
//!
//! [breakers.qdrant]
//! failure_threshold = 3
//! recovery_timeout_seconds = 20.0
//!
//! [[alerts]]
//! metric_type = "error_rate"
//! threshold_value = 0.5
//! window_seconds = 300.0
//! alert_level = "critical"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result, ToolgateError};
use crate::resilience::retry::{default_non_retryable_codes, default_retryable_codes};
use crate::resilience::{
    default_breakers, default_thresholds, AlertThreshold, AttemptHistory, CircuitBreakerConfig,
    RetryConfig, RetryStrategy,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolgateConfig {
    pub logging: LoggingConfig,
    pub retry: RetrySettings,
    pub metrics: MetricsSettings,
    /// Breakers registered at startup, keyed by upstream name
    pub breakers: BTreeMap<String, BreakerSettings>,
    pub alerts: Vec<AlertThreshold>,
}

impl Default for ToolgateConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            retry: RetrySettings::default(),
            metrics: MetricsSettings::default(),
            breakers: default_breakers()
                .into_iter()
                .map(|(name, config)| (name, BreakerSettings::from(&config)))
                .collect(),
            alerts: default_thresholds(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `toolgate=debug`, ...)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Retry settings, converted into a [`RetryConfig`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub exponential_base: f64,
    pub jitter_range: f64,
    pub retryable_codes: Vec<ErrorCode>,
    pub non_retryable_codes: Vec<ErrorCode>,
    pub timeout_per_attempt_seconds: Option<f64>,
    /// Attempt records kept per operation
    pub history_per_operation: usize,
    /// Operations tracked in the attempt history
    pub history_max_operations: usize,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        let mut retryable: Vec<ErrorCode> = default_retryable_codes().into_iter().collect();
        let mut non_retryable: Vec<ErrorCode> =
            default_non_retryable_codes().into_iter().collect();
        retryable.sort();
        non_retryable.sort();

        Self {
            max_attempts: defaults.max_attempts,
            strategy: defaults.strategy,
            base_delay_seconds: defaults.base_delay.as_secs_f64(),
            max_delay_seconds: defaults.max_delay.as_secs_f64(),
            exponential_base: defaults.exponential_base,
            jitter_range: defaults.jitter_range,
            retryable_codes: retryable,
            non_retryable_codes: non_retryable,
            timeout_per_attempt_seconds: None,
            history_per_operation: AttemptHistory::DEFAULT_PER_OPERATION,
            history_max_operations: AttemptHistory::DEFAULT_MAX_OPERATIONS,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            strategy: self.strategy,
            base_delay: seconds(self.base_delay_seconds),
            max_delay: seconds(self.max_delay_seconds),
            exponential_base: self.exponential_base,
            jitter_range: self.jitter_range,
            retryable_codes: self.retryable_codes.iter().copied().collect(),
            non_retryable_codes: self.non_retryable_codes.iter().copied().collect(),
            timeout_per_attempt: self.timeout_per_attempt_seconds.map(seconds),
        }
    }

    pub fn attempt_history(&self) -> AttemptHistory {
        AttemptHistory::new(self.history_per_operation, self.history_max_operations)
    }
}

/// Metrics collector settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsSettings {
    /// Ring buffer capacity
    pub capacity: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            capacity: crate::resilience::metrics::DEFAULT_CAPACITY,
        }
    }
}

/// One circuit breaker, converted into a [`CircuitBreakerConfig`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_seconds: f64,
    pub timeout_seconds: f64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            recovery_timeout_seconds: config.recovery_timeout.as_secs_f64(),
            timeout_seconds: config.timeout.as_secs_f64(),
        }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_timeout: seconds(self.recovery_timeout_seconds),
            timeout: seconds(self.timeout_seconds),
        }
    }
}

/// Seconds to `Duration`, saturating instead of panicking
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn config_error(reason: impl Into<String>) -> ToolgateError {
    ToolgateError::ConfigError {
        reason: reason.into(),
    }
}

impl ToolgateConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/toolgate/` on Unix, `%APPDATA%/toolgate/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("toolgate")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default path, falling back to defaults if it is missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            config_error(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| config_error(format!("Failed to parse config file: {}", e)))
    }

    /// File (explicit or default) + environment, validated
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        }
        .with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    config_error(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| config_error(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| config_error(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Merge with environment variables
    ///
    /// Empty values are ignored; unparsable values are an error.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(level) = env_var("TOOLGATE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(json) = env_var("TOOLGATE_LOG_JSON") {
            self.logging.json = match json.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(config_error(format!(
                        "TOOLGATE_LOG_JSON must be a boolean, got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(capacity) = env_var("TOOLGATE_METRICS_CAPACITY") {
            self.metrics.capacity = capacity.parse().map_err(|e| {
                config_error(format!("TOOLGATE_METRICS_CAPACITY: {}", e))
            })?;
        }

        if let Some(attempts) = env_var("TOOLGATE_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts.parse().map_err(|e| {
                config_error(format!("TOOLGATE_RETRY_MAX_ATTEMPTS: {}", e))
            })?;
        }

        Ok(self)
    }

    /// Reject values the resilience layer cannot run with
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(config_error("retry.max_attempts must be at least 1"));
        }
        if !(retry.exponential_base > 0.0) {
            return Err(config_error("retry.exponential_base must be positive"));
        }
        if !(0.0..=1.0).contains(&retry.jitter_range) {
            return Err(config_error("retry.jitter_range must be within [0, 1]"));
        }
        if !(retry.base_delay_seconds >= 0.0) {
            return Err(config_error("retry.base_delay_seconds must not be negative"));
        }
        if !(retry.max_delay_seconds >= retry.base_delay_seconds) {
            return Err(config_error(
                "retry.max_delay_seconds must not be below retry.base_delay_seconds",
            ));
        }
        if retry.timeout_per_attempt_seconds.is_some_and(|t| !(t > 0.0)) {
            return Err(config_error("retry.timeout_per_attempt_seconds must be positive"));
        }
        if let Some(code) = retry
            .retryable_codes
            .iter()
            .find(|c| retry.non_retryable_codes.contains(c))
        {
            tracing::debug!(%code, "Code listed as both retryable and non-retryable, never retried");
        }

        if self.metrics.capacity == 0 {
            return Err(config_error("metrics.capacity must be at least 1"));
        }

        for (name, breaker) in &self.breakers {
            if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
                return Err(config_error(format!(
                    "breakers.{}: thresholds must be at least 1",
                    name
                )));
            }
            if !(breaker.recovery_timeout_seconds >= 0.0) || !(breaker.timeout_seconds > 0.0) {
                return Err(config_error(format!(
                    "breakers.{}: timeouts must be positive",
                    name
                )));
            }
        }

        for alert in &self.alerts {
            if !(alert.window_seconds > 0.0 && alert.window_seconds.is_finite()) {
                return Err(config_error(format!(
                    "alert '{}' needs a positive, finite window_seconds",
                    alert.key()
                )));
            }
            if !(alert.cooldown_seconds >= 0.0 && alert.cooldown_seconds.is_finite()) {
                return Err(config_error(format!(
                    "alert '{}' needs a non-negative, finite cooldown_seconds",
                    alert.key()
                )));
            }
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
