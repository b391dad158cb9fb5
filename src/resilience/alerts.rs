//! Alert thresholds and rate-limited alert evaluation
//!
//! The [`AlertEngine`] lives inside the metrics collector's lock. It only
//! decides *whether* an alert fires; delivery happens through [`AlertSink`]s
//! after the lock is released.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::Result;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// What a threshold measures over its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    ErrorRate,
    ErrorCount,
    SuccessRate,
    /// Average processing time in milliseconds
    Latency,
    /// Requests per minute
    Throughput,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ErrorRate => "error_rate",
            Self::ErrorCount => "error_count",
            Self::SuccessRate => "success_rate",
            Self::Latency => "latency",
            Self::Throughput => "throughput",
        };
        f.write_str(s)
    }
}

fn default_cooldown_seconds() -> f64 {
    1800.0
}

fn default_enabled() -> bool {
    true
}

/// Static alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub metric_type: MetricType,
    pub threshold_value: f64,
    pub window_seconds: f64,
    pub alert_level: AlertLevel,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AlertThreshold {
    pub fn new(
        metric_type: MetricType,
        threshold_value: f64,
        window_seconds: f64,
        alert_level: AlertLevel,
        description: impl Into<String>,
    ) -> Self {
        Self {
            metric_type,
            threshold_value,
            window_seconds,
            alert_level,
            description: description.into(),
            cooldown_seconds: default_cooldown_seconds(),
            enabled: true,
        }
    }

    pub fn with_cooldown(mut self, seconds: f64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Cooldown key, shared by thresholds on the same metric and value
    pub fn key(&self) -> String {
        format!("{}_{}", self.metric_type, self.threshold_value)
    }

    pub fn window(&self) -> Duration {
        saturating_seconds(self.window_seconds)
    }

    fn cooldown(&self) -> Duration {
        saturating_seconds(self.cooldown_seconds)
    }
}

/// NaN and negatives map to zero, overflow to `Duration::MAX`
fn saturating_seconds(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Thresholds installed when none are configured
pub fn default_thresholds() -> Vec<AlertThreshold> {
    vec![
        AlertThreshold::new(
            MetricType::ErrorRate,
            0.1,
            300.0,
            AlertLevel::Warning,
            "Error rate exceeded 10% in 5 minutes",
        ),
        AlertThreshold::new(
            MetricType::ErrorRate,
            0.25,
            300.0,
            AlertLevel::Critical,
            "Error rate exceeded 25% in 5 minutes",
        ),
        AlertThreshold::new(
            MetricType::ErrorCount,
            50.0,
            600.0,
            AlertLevel::Error,
            "More than 50 errors in 10 minutes",
        ),
        AlertThreshold::new(
            MetricType::Latency,
            30000.0,
            300.0,
            AlertLevel::Warning,
            "Average processing time exceeded 30 seconds",
        ),
    ]
}

/// A fired alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub alert_level: AlertLevel,
    pub metric_type: MetricType,
    pub threshold_value: f64,
    pub current_value: f64,
    pub description: String,
    pub window_seconds: f64,
}

/// Alert delivery target
///
/// Delivery errors are logged by the collector and never reach the caller
/// that recorded the metric.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Thresholds plus the time each alert key last fired
#[derive(Debug)]
pub struct AlertEngine {
    thresholds: Vec<AlertThreshold>,
    history: HashMap<String, Instant>,
}

impl AlertEngine {
    pub fn new(thresholds: Vec<AlertThreshold>) -> Self {
        Self {
            thresholds,
            history: HashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &[AlertThreshold] {
        &self.thresholds
    }

    /// Check every enabled threshold.
    ///
    /// `measure` computes a metric over a window ending at `now`.
    pub fn evaluate<M>(&mut self, now: Instant, mut measure: M) -> Vec<Alert>
    where
        M: FnMut(MetricType, Duration) -> f64,
    {
        let mut fired = Vec::new();

        for threshold in self.thresholds.iter().filter(|t| t.enabled) {
            let key = threshold.key();
            if let Some(last) = self.history.get(&key) {
                if now.saturating_duration_since(*last) < threshold.cooldown() {
                    continue;
                }
            }

            let value = measure(threshold.metric_type, threshold.window());
            if value >= threshold.threshold_value {
                fired.push(Alert {
                    timestamp: Utc::now(),
                    alert_level: threshold.alert_level,
                    metric_type: threshold.metric_type,
                    threshold_value: threshold.threshold_value,
                    current_value: value,
                    description: threshold.description.clone(),
                    window_seconds: threshold.window_seconds,
                });
                self.history.insert(key, now);
            }
        }

        fired
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(default_thresholds())
    }
}
