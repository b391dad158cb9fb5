//! Circuit Breaker Pattern
//!
//! Prevents cascading failures by failing fast when an upstream is down.
//!
//! # States
//!
//! - **Closed**: Normal operation, requests go through
//! - **Open**: Too many failures, requests fail immediately
//! - **Half-Open**: Recovery timeout elapsed, probing the upstream
//!
//! In `Closed`, every success leaks one failure out of the counter, so
//! sporadic errors never add up to a trip. The EMA `success_rate` is
//! reported in [`CircuitStatus`] only; transitions depend on the counters.
//!
//! # Example
//!
//! ```rust,ignore
//! use toolgate::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("mistral_api", CircuitBreakerConfig::default());
//!
//! let result = breaker.call(|| async {
//!     call_mistral().await
//! }).await;
//! ```

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{Result, ToolgateError};

/// Smoothing factor of the success-rate moving average
const EMA_ALPHA: f64 = 0.1;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests flow through
    Closed,
    /// Upstream down - requests fail immediately
    Open,
    /// Probing recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures (net of leaked successes) before opening the circuit
    pub failure_threshold: u32,
    /// Successes in half-open needed to close the circuit
    pub success_threshold: u32,
    /// Time to wait in open state before probing
    pub recovery_timeout: Duration,
    /// Upper bound for one call made through the breaker
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Set failure threshold before circuit opens
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set success threshold to close circuit from half-open
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set recovery timeout duration
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Set per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    request_count: u64,
    success_rate: f64,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            request_count: 0,
            success_rate: 1.0,
            last_failure: None,
            last_failure_at: None,
        }
    }

    fn observe(&mut self, outcome: f64) {
        self.request_count += 1;
        self.success_rate = (1.0 - EMA_ALPHA) * self.success_rate + EMA_ALPHA * outcome;
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub request_count: u64,
    pub success_rate: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Seconds left before an open breaker lets a probe through
    pub time_until_half_open: f64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_seconds: f64,
}

/// Circuit breaker for one upstream dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Create a circuit breaker with default configuration
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Get the current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Execute an async operation through the circuit breaker.
    ///
    /// The call is bounded by the configured `timeout`; an elapsed call is
    /// recorded as a failure and surfaces as [`ToolgateError::Timeout`].
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.try_acquire()?;

        let result = match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(ToolgateError::Timeout {
                operation: self.name.clone(),
                duration_ms: self.config.timeout.as_millis() as u64,
            }),
        };

        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Execute a blocking operation through the circuit breaker.
    ///
    /// The call timeout is not enforced here; the caller owns the thread.
    pub fn call_sync<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.try_acquire()?;

        let result = operation();
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Reject while open, move to half-open once the recovery timeout passed
    fn try_acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner
            .last_failure
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX);
        if elapsed < self.config.recovery_timeout {
            let remaining = self.config.recovery_timeout - elapsed;
            return Err(ToolgateError::CircuitOpen {
                breaker: self.name.clone(),
                retry_after_ms: remaining.as_millis() as u64,
            });
        }

        inner.state = CircuitState::HalfOpen;
        inner.success_count = 0;
        tracing::info!(breaker = %self.name, "Circuit breaker half-open, probing upstream");
        Ok(())
    }

    /// Record a successful operation
    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.observe(1.0);

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    tracing::info!(breaker = %self.name, "Circuit breaker closed");
                }
            }
            // Call admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    /// Record a failed operation
    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.observe(0.0);
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!(breaker = %self.name, "Circuit breaker re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    /// Snapshot of counters and timing
    pub fn get_status(&self) -> CircuitStatus {
        let inner = self.inner.lock();
        let time_until_half_open = inner
            .last_failure
            .map(|at| {
                self.config
                    .recovery_timeout
                    .saturating_sub(at.elapsed())
                    .as_secs_f64()
            })
            .unwrap_or(0.0);

        CircuitStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            request_count: inner.request_count,
            success_rate: (inner.success_rate * 1000.0).round() / 1000.0,
            last_failure_time: inner.last_failure_at,
            time_until_half_open,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout_seconds: self.config.recovery_timeout.as_secs_f64(),
        }
    }

    /// Reset the circuit breaker to closed state (admin)
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::new();
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Force the circuit open for a full recovery timeout (admin)
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());
        tracing::warn!(breaker = %self.name, "Circuit breaker forced open");
    }

    /// Force the circuit to half-open state (for testing)
    #[cfg(test)]
    fn force_half_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::HalfOpen;
        inner.success_count = 0;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, ServiceError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn upstream_down() -> ToolgateError {
        ServiceError::new(ErrorCode::ApiServiceUnavailable, "upstream down").into()
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .call(|| async { Err::<(), _>(upstream_down()) })
            .await;
    }

    async fn succeed(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Ok::<_, ToolgateError>(()) }).await;
    }

    #[test]
    fn test_circuit_breaker_config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_circuit_breaker_config_builder() {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_secs(10))
            .with_success_threshold(1)
            .with_timeout(Duration::from_secs(2));

        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.recovery_timeout, Duration::from_secs(10));
        assert_eq!(config.success_threshold, 1);
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_circuit_breaker_initial_state_closed() {
        let breaker = CircuitBreaker::with_defaults("mistral_api");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.name(), "mistral_api");
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default().with_failure_threshold(3),
        );

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_circuit_breaker_rejects_when_open() {
        let breaker = CircuitBreaker::with_defaults("svc");
        breaker.force_open();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = breaker
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ToolgateError>(())
            })
            .await;

        assert!(matches!(result, Err(ToolgateError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_leaks_failure_count_in_closed() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default().with_failure_threshold(3),
        );

        fail(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await;
        assert_eq!(breaker.failure_count(), 1);

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        succeed(&breaker).await;
        let status = breaker.get_status();
        assert_eq!(status.failure_count, 3);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default().with_success_threshold(2),
        );
        breaker.force_half_open();

        succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_half_open_reopens_on_failure() {
        let breaker = CircuitBreaker::with_defaults("svc");
        breaker.force_half_open();

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_timeout_allows_probe() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_recovery_timeout(Duration::from_secs(5)),
        );
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(5100)).await;

        let result = breaker.call(|| async { Ok::<_, ToolgateError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_timeout(Duration::from_secs(1)),
        );

        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ToolgateError>(())
            })
            .await;

        assert!(matches!(result, Err(ToolgateError::Timeout { .. })));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_call_sync_records_outcomes() {
        let breaker = CircuitBreaker::new(
            "sync",
            CircuitBreakerConfig::default().with_failure_threshold(2),
        );
        assert_eq!(breaker.call_sync(|| Ok::<_, ToolgateError>(1)).unwrap(), 1);
        let _ = breaker.call_sync(|| Err::<(), _>(upstream_down()));
        let _ = breaker.call_sync(|| Err::<(), _>(upstream_down()));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            breaker.call_sync(|| Ok::<_, ToolgateError>(1)),
            Err(ToolgateError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_time_until_half_open() {
        let breaker = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_recovery_timeout(Duration::from_secs(10)),
        );
        assert_eq!(breaker.get_status().time_until_half_open, 0.0);

        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(4)).await;

        let status = breaker.get_status();
        assert_eq!(status.state, CircuitState::Open);
        assert!((status.time_until_half_open - 6.0).abs() < 1e-6);
        assert_eq!(status.request_count, 1);
        assert!((status.success_rate - 0.9).abs() < 1e-9);
        assert!(status.last_failure_time.is_some());
    }

    #[tokio::test]
    async fn test_reset_restores_closed_state() {
        let breaker = CircuitBreaker::with_defaults("svc");
        breaker.force_open();
        breaker.reset();

        let status = breaker.get_status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.request_count, 0);
        assert!(status.last_failure_time.is_none());
    }
}
