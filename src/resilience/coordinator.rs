//! Resilience coordinator
//!
//! Owns the named circuit breakers and per-operation fallbacks, and runs
//! business operations through them:
//!
//! ```text
//! RetryPolicy ─► CircuitBreaker ─► operation
//!      │               │
//!      └──── every attempt recorded in MetricsCollector
//! ```
//!
//! Retry wraps the breaker, so each attempt re-checks the breaker state and
//! retries never bypass an open circuit.
//!
//! # Example
//!
//! ```rust,ignore
//! use toolgate::resilience::{Invocation, ResilienceCoordinator};
//!
//! let text = coordinator
//!     .execute(
//!         Invocation::new("ocr_process").with_breaker("mistral_api").with_size_hint(2.5),
//!         || async { mistral.ocr(&document).await },
//!     )
//!     .await?;
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStatus};
use super::metrics::MetricsCollector;
use super::retry::{AttemptRecord, RetryConfig, RetryPolicy};
use crate::error::{Result, ToolgateError};

/// Type-erased fallback producing a `T`
type Fallback<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Breakers registered out of the box
pub fn default_breakers() -> Vec<(String, CircuitBreakerConfig)> {
    vec![
        (
            "mistral_api".to_string(),
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_success_threshold(2)
                .with_recovery_timeout(Duration::from_secs(30))
                .with_timeout(Duration::from_secs(60)),
        ),
        (
            "url_download".to_string(),
            CircuitBreakerConfig::default()
                .with_failure_threshold(5)
                .with_success_threshold(3)
                .with_recovery_timeout(Duration::from_secs(10))
                .with_timeout(Duration::from_secs(30)),
        ),
    ]
}

/// One call into an upstream
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub operation: String,
    /// Breaker gating the call, if any
    pub breaker: Option<String>,
    /// Cost hint recorded with metrics (payload size in MB)
    pub size_hint: f64,
    /// Replaces the coordinator's retry config for this call
    pub retry: Option<RetryConfig>,
    pub user_info: Option<serde_json::Value>,
}

impl Invocation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_breaker(mut self, breaker: impl Into<String>) -> Self {
        self.breaker = Some(breaker.into());
        self
    }

    pub fn with_size_hint(mut self, size_hint: f64) -> Self {
        self.size_hint = size_hint;
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn with_user_info(mut self, user_info: serde_json::Value) -> Self {
        self.user_info = Some(user_info);
        self
    }
}

/// Registry of breakers and fallbacks plus the shared metrics collector
pub struct ResilienceCoordinator {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    fallbacks: DashMap<String, Arc<dyn Any + Send + Sync>>,
    retry: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl ResilienceCoordinator {
    pub fn new(metrics: Arc<MetricsCollector>, retry: RetryConfig) -> Self {
        Self::with_policy(metrics, RetryPolicy::new(retry))
    }

    pub fn with_policy(metrics: Arc<MetricsCollector>, retry: RetryPolicy) -> Self {
        Self {
            breakers: DashMap::new(),
            fallbacks: DashMap::new(),
            retry,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Register (or replace) a named breaker
    pub fn register_breaker(
        &self,
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let name = name.into();
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
        if self.breakers.insert(name.clone(), breaker.clone()).is_some() {
            tracing::debug!(breaker = %name, "Replaced circuit breaker");
        }
        breaker
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    fn require_breaker(&self, name: &str) -> Result<Arc<CircuitBreaker>> {
        self.breaker(name)
            .ok_or_else(|| ToolgateError::BreakerNotRegistered {
                name: name.to_string(),
            })
    }

    /// Register a fallback run when `operation` ultimately fails.
    ///
    /// The fallback is looked up by operation name and output type; a
    /// fallback registered for another output type is ignored.
    pub fn register_fallback<T, F, Fut>(&self, operation: impl Into<String>, fallback: F)
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let erased: Fallback<T> = Arc::new(move || fallback().boxed());
        self.fallbacks.insert(operation.into(), Arc::new(erased));
    }

    fn fallback<T: 'static>(&self, operation: &str) -> Option<Fallback<T>> {
        let entry = self.fallbacks.get(operation)?;
        match entry.value().downcast_ref::<Fallback<T>>() {
            Some(f) => Some(Arc::clone(f)),
            None => {
                tracing::warn!(
                    operation,
                    "Fallback registered with a different output type, skipping"
                );
                None
            }
        }
    }

    /// Run `operation` under retry, breaker, metrics and fallback
    pub async fn execute<T, F, Fut>(&self, invocation: Invocation, operation: F) -> Result<T>
    where
        T: 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(invocation, operation, None).await
    }

    /// Like [`execute`](Self::execute), stopping once `cancel` fires
    pub async fn execute_with_cancel<T, F, Fut>(
        &self,
        invocation: Invocation,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T>
    where
        T: 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(invocation, operation, Some(cancel)).await
    }

    async fn run<T, F, Fut>(
        &self,
        invocation: Invocation,
        operation: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T>
    where
        T: 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = match &invocation.breaker {
            Some(name) => Some(self.require_breaker(name)?),
            None => None,
        };
        // The per-attempt limit is enforced inside the breaker so an elapsed
        // attempt is counted by the breaker and recorded in metrics.
        let mut config = invocation
            .retry
            .clone()
            .unwrap_or_else(|| self.retry.config().clone());
        let limit = config.timeout_per_attempt.take();
        let policy = RetryPolicy::new(config).with_history(Arc::clone(self.retry.history()));

        let name = invocation.operation.as_str();
        let size_hint = invocation.size_hint;
        let user_info = invocation.user_info.as_ref();
        let breaker = breaker.as_deref();
        let metrics = &*self.metrics;
        let operation = &operation;

        let attempt = move || async move {
            let started = Instant::now();
            let outcome = match breaker {
                Some(b) => b.call(|| within_limit(name, limit, operation())).await,
                None => within_limit(name, limit, operation()).await,
            };
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            match &outcome {
                Ok(_) => metrics.record_success(name, elapsed_ms, size_hint, user_info),
                Err(e) => metrics.record_error(e, name, elapsed_ms, size_hint, user_info),
            }
            outcome
        };

        let result = match cancel {
            Some(token) => policy.execute_with_cancel(name, token, attempt).await,
            None => policy.execute(name, attempt).await,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if matches!(error, ToolgateError::Cancelled { .. }) {
            return Err(error);
        }

        if let Some(fallback) = self.fallback::<T>(name) {
            tracing::info!(operation = name, code = error.code(), "Running fallback");
            match fallback().await {
                Ok(value) => return Ok(value),
                Err(fallback_error) => {
                    tracing::warn!(
                        operation = name,
                        error = %fallback_error,
                        "Fallback failed, returning original error"
                    );
                }
            }
        }
        Err(error)
    }

    /// Status of every registered breaker, keyed by name
    pub fn get_circuit_status(&self) -> BTreeMap<String, CircuitStatus> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get_status()))
            .collect()
    }

    pub fn reset_breaker(&self, name: &str) -> Result<()> {
        self.require_breaker(name)?.reset();
        Ok(())
    }

    pub fn force_open(&self, name: &str) -> Result<()> {
        self.require_breaker(name)?.force_open();
        Ok(())
    }

    pub fn attempt_history(&self, operation: &str) -> Vec<AttemptRecord> {
        self.retry.attempt_history(operation)
    }
}

async fn within_limit<T>(
    operation: &str,
    limit: Option<Duration>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| {
                Err(ToolgateError::Timeout {
                    operation: operation.to_string(),
                    duration_ms: limit.as_millis() as u64,
                })
            }),
        None => call.await,
    }
}

impl std::fmt::Debug for ResilienceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceCoordinator")
            .field("breakers", &self.breakers.len())
            .field("fallbacks", &self.fallbacks.len())
            .field("retry", self.retry.config())
            .finish()
    }
}
