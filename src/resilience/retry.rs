//! Retry with configurable backoff
//!
//! Retries failed operations according to a [`RetryStrategy`], classifying
//! every failure through the error taxonomy before deciding.
//!
//! Classification order:
//! 1. code in `non_retryable_codes` → abort
//! 2. code in `retryable_codes` → retry
//! 3. otherwise the error's own `recoverable` flag decides
//!
//! # Example
//!
//! ```rust,ignore
//! use toolgate::resilience::{RetryConfig, RetryPolicy};
//!
//! let policy = RetryPolicy::new(RetryConfig::default());
//!
//! let result = policy.execute("ocr_process", || async {
//!     call_mistral().await
//! }).await;
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, Result, ToolgateError};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    #[serde(alias = "fixed_delay")]
    Fixed,
    #[serde(alias = "linear_backoff")]
    Linear,
    #[default]
    #[serde(alias = "exponential_backoff")]
    Exponential,
    #[serde(alias = "random_jitter")]
    Jitter,
}

/// Codes retried regardless of the error's own `recoverable` flag
pub fn default_retryable_codes() -> HashSet<ErrorCode> {
    [
        ErrorCode::ApiTimeout,
        ErrorCode::ApiServiceUnavailable,
        ErrorCode::ApiRateLimitExceeded,
        ErrorCode::DownloadTimeout,
        ErrorCode::TimeoutError,
        ErrorCode::StorageError,
    ]
    .into_iter()
    .collect()
}

/// Codes never retried
pub fn default_non_retryable_codes() -> HashSet<ErrorCode> {
    [
        ErrorCode::ApiAuthenticationFailed,
        ErrorCode::InvalidFileFormat,
        ErrorCode::FileTooLarge,
        ErrorCode::FileCorrupted,
        ErrorCode::InvalidConfiguration,
        ErrorCode::MissingCredentials,
    ]
    .into_iter()
    .collect()
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub base_delay: Duration,
    /// Cap applied to every strategy
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Fraction (0.0 to 1.0) of the exponential delay used as ± jitter
    pub jitter_range: f64,
    pub retryable_codes: HashSet<ErrorCode>,
    pub non_retryable_codes: HashSet<ErrorCode>,
    /// Upper bound for a single attempt
    pub timeout_per_attempt: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter_range: 0.1,
            retryable_codes: default_retryable_codes(),
            non_retryable_codes: default_non_retryable_codes(),
            timeout_per_attempt: None,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Set jitter range (clamped to 0.0..=1.0)
    pub fn with_jitter_range(mut self, range: f64) -> Self {
        self.jitter_range = range.clamp(0.0, 1.0);
        self
    }

    pub fn with_retryable_code(mut self, code: ErrorCode) -> Self {
        self.retryable_codes.insert(code);
        self
    }

    pub fn with_non_retryable_code(mut self, code: ErrorCode) -> Self {
        self.non_retryable_codes.insert(code);
        self
    }

    pub fn with_timeout_per_attempt(mut self, timeout: Duration) -> Self {
        self.timeout_per_attempt = Some(timeout);
        self
    }
}

// ═══════════════════════════════════════════
// ATTEMPT HISTORY
// ═══════════════════════════════════════════

/// One attempt of one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl AttemptRecord {
    fn success(attempt: u32) -> Self {
        Self {
            attempt,
            timestamp: Utc::now(),
            success: true,
            error_code: None,
        }
    }

    fn failure(attempt: u32, code: &str) -> Self {
        Self {
            attempt,
            timestamp: Utc::now(),
            success: false,
            error_code: Some(code.to_string()),
        }
    }
}

struct HistoryEntry {
    last_used: u64,
    records: VecDeque<AttemptRecord>,
}

#[derive(Default)]
struct HistoryInner {
    tick: u64,
    entries: HashMap<String, HistoryEntry>,
}

/// Per-operation attempt log, bounded per operation and in operation count.
///
/// When a new operation arrives and the map is full, the least recently
/// written operation is evicted.
pub struct AttemptHistory {
    per_operation: usize,
    max_operations: usize,
    inner: Mutex<HistoryInner>,
}

impl AttemptHistory {
    pub const DEFAULT_PER_OPERATION: usize = 50;
    pub const DEFAULT_MAX_OPERATIONS: usize = 256;

    pub fn new(per_operation: usize, max_operations: usize) -> Self {
        Self {
            per_operation: per_operation.max(1),
            max_operations: max_operations.max(1),
            inner: Mutex::new(HistoryInner::default()),
        }
    }

    pub fn record(&self, operation: &str, record: AttemptRecord) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(operation) && inner.entries.len() >= self.max_operations {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(name, _)| name.clone());
            if let Some(name) = oldest {
                inner.entries.remove(&name);
            }
        }

        let entry = inner
            .entries
            .entry(operation.to_string())
            .or_insert_with(|| HistoryEntry {
                last_used: tick,
                records: VecDeque::new(),
            });
        entry.last_used = tick;
        entry.records.push_back(record);
        while entry.records.len() > self.per_operation {
            entry.records.pop_front();
        }
    }

    /// Records for one operation, oldest first
    pub fn get(&self, operation: &str) -> Vec<AttemptRecord> {
        self.inner
            .lock()
            .entries
            .get(operation)
            .map(|entry| entry.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&self, operation: &str) {
        self.inner.lock().entries.remove(operation);
    }
}

impl Default for AttemptHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PER_OPERATION, Self::DEFAULT_MAX_OPERATIONS)
    }
}

impl std::fmt::Debug for AttemptHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptHistory")
            .field("per_operation", &self.per_operation)
            .field("max_operations", &self.max_operations)
            .field("operations", &self.inner.lock().entries.len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// RETRY POLICY
// ═══════════════════════════════════════════

/// Retry policy that executes operations with backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    history: Arc<AttemptHistory>,
}

impl RetryPolicy {
    /// Create a new retry policy with its own attempt history
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            history: Arc::new(AttemptHistory::default()),
        }
    }

    /// Create a retry policy with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Write attempts into a shared history instead
    pub fn with_history(mut self, history: Arc<AttemptHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<AttemptHistory> {
        &self.history
    }

    pub fn attempt_history(&self, operation: &str) -> Vec<AttemptRecord> {
        self.history.get(operation)
    }

    /// Delay to wait after the given (1-indexed) failed attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let max = self.config.max_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential = base * self.config.exponential_base.powi(exponent);

        let raw = match self.config.strategy {
            RetryStrategy::Fixed => base,
            RetryStrategy::Linear => base * f64::from(attempt),
            RetryStrategy::Exponential => exponential,
            RetryStrategy::Jitter => {
                let range = self.config.jitter_range.clamp(0.0, 1.0);
                if range > 0.0 {
                    exponential * (1.0 + rand::thread_rng().gen_range(-range..=range))
                } else {
                    exponential
                }
            }
        };

        // 0 * inf from a zero base delay
        let raw = if raw.is_nan() { 0.0 } else { raw };
        if raw >= max {
            return self.config.max_delay;
        }
        Duration::from_secs_f64(raw.max(0.0))
    }

    /// Whether a failed attempt should be followed by another one
    pub fn should_retry(&self, error: &ToolgateError) -> bool {
        // Open breakers are never retried
        if matches!(error, ToolgateError::CircuitOpen { .. }) {
            return false;
        }
        if let Some(code) = error.taxonomy_code() {
            if self.config.non_retryable_codes.contains(&code) {
                return false;
            }
            if self.config.retryable_codes.contains(&code) {
                return true;
            }
        }
        error.is_recoverable()
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation_name, operation, None).await
    }

    /// Like [`execute`](Self::execute), but stops scheduling attempts once
    /// `cancel` fires. A pending backoff sleep is abandoned.
    pub async fn execute_with_cancel<F, Fut, T>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation_name, operation, Some(cancel)).await
    }

    async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return Err(cancelled(operation_name));
            }

            let outcome = match self.config.timeout_per_attempt {
                Some(limit) => tokio::time::timeout(limit, operation())
                    .await
                    .unwrap_or_else(|_| {
                        Err(ToolgateError::Timeout {
                            operation: operation_name.to_string(),
                            duration_ms: limit.as_millis() as u64,
                        })
                    }),
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => {
                    self.history
                        .record(operation_name, AttemptRecord::success(attempt));
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            self.history
                .record(operation_name, AttemptRecord::failure(attempt, error.code()));

            if error.is_unclassified() && !error.is_recoverable() {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    error = %error,
                    "Unknown error, not retrying"
                );
                return Err(error.into_classified(operation_name));
            }

            if !self.should_retry(&error) {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    code = error.code(),
                    "Non-retryable error, aborting"
                );
                return Err(error.into_classified(operation_name));
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    operation = operation_name,
                    attempts = attempt,
                    code = error.code(),
                    "Retry attempts exhausted"
                );
                return Err(error.into_classified(operation_name));
            }

            let delay = self.calculate_delay(attempt);
            tracing::info!(
                operation = operation_name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                code = error.code(),
                "Retrying after failure"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(cancelled(operation_name)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }

            attempt += 1;
        }
    }
}

fn cancelled(operation: &str) -> ToolgateError {
    ToolgateError::Cancelled {
        operation: operation.to_string(),
    }
}
