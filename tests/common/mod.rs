//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use toolgate::resilience::{Alert, AlertSink, MetricsCollector, ResilienceCoordinator};
use toolgate::{ErrorCode, Result, RetryConfig, ServiceError, ToolgateError};

/// Sink that keeps every delivered alert
#[derive(Default)]
pub struct CollectingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingSink {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

impl AlertSink for CollectingSink {
    fn deliver(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

pub fn service_error(code: ErrorCode, message: &str) -> ToolgateError {
    ServiceError::new(code, message).into()
}

/// Retry config with millisecond delays
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

/// Coordinator with no alert thresholds
pub fn quiet_coordinator(retry: RetryConfig) -> ResilienceCoordinator {
    let metrics = Arc::new(MetricsCollector::with_thresholds(1_000, Vec::new()));
    ResilienceCoordinator::new(metrics, retry)
}
