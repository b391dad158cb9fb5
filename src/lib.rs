//! Toolgate - resilience layer for calls into unreliable upstreams
//!
//! Retry with backoff, circuit breakers, error metrics with alerting and a
//! health score, composed by [`ResilienceCoordinator`].

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod resilience;
pub mod sanitizer;

pub use config::ToolgateConfig;
pub use context::ResilienceContext;
pub use error::{
    ErrorCode, ErrorContext, FixSuggestion, Result, ServiceError, Severity, ToolgateError,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthReport, Invocation,
    MetricsCollector, ResilienceCoordinator, RetryConfig, RetryPolicy, RetryStrategy,
};
pub use sanitizer::{ErrorSanitizer, SafeErrorResponse, SanitizationLevel};
