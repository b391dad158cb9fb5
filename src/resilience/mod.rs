//! Resilience patterns for calls into unreliable upstreams
//!
//! This module provides:
//! - [`retry`]: Retry with configurable backoff and taxonomy-aware classification
//! - [`circuit_breaker`]: Circuit breaker pattern
//! - [`coordinator`]: Breaker/fallback registry composing retry around breaker
//! - [`metrics`]: Ring-buffer metrics, summaries and trends
//! - [`alerts`]: Alert thresholds with cooldowns
//! - [`health`]: Health score and recommendations

pub mod alerts;
pub mod circuit_breaker;
pub mod coordinator;
pub mod health;
pub mod metrics;
pub mod retry;

pub use alerts::{default_thresholds, Alert, AlertEngine, AlertLevel, AlertSink, AlertThreshold, MetricType};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus};
pub use coordinator::{default_breakers, Invocation, ResilienceCoordinator};
pub use health::{HealthComponents, HealthReport, HealthStatus};
pub use metrics::{
    ErrorMetric, ErrorTrends, MetricEntry, MetricsCollector, MetricsSummary, SuccessRecord, Trend,
    TrendAnalysis, TrendBucket,
};
pub use retry::{AttemptHistory, AttemptRecord, RetryConfig, RetryPolicy, RetryStrategy};
