//! Application-wide resilience context
//!
//! Built once at startup from [`ToolgateConfig`] and handed to request
//! handlers by reference. Owns the coordinator, which shares the metrics
//! collector, and exposes the read-only status surface as JSON.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::ToolgateConfig;
use crate::error::Result;
use crate::resilience::{AlertSink, MetricsCollector, ResilienceCoordinator, RetryPolicy};

#[derive(Debug)]
pub struct ResilienceContext {
    coordinator: ResilienceCoordinator,
}

impl ResilienceContext {
    /// Wire metrics, retry policy and breakers from configuration
    pub fn from_config(config: &ToolgateConfig) -> Self {
        Self::build(config, Vec::new())
    }

    /// Same as [`from_config`](Self::from_config), delivering alerts to `sinks`
    pub fn with_sinks(config: &ToolgateConfig, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self::build(config, sinks)
    }

    fn build(config: &ToolgateConfig, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        let metrics = sinks.into_iter().fold(
            MetricsCollector::with_thresholds(config.metrics.capacity, config.alerts.clone()),
            MetricsCollector::with_sink,
        );

        let policy = RetryPolicy::new(config.retry.to_retry_config())
            .with_history(Arc::new(config.retry.attempt_history()));
        let coordinator = ResilienceCoordinator::with_policy(Arc::new(metrics), policy);

        for (name, settings) in &config.breakers {
            coordinator.register_breaker(name.clone(), settings.to_breaker_config());
        }

        tracing::info!(
            breakers = config.breakers.len(),
            capacity = config.metrics.capacity,
            alerts = config.alerts.len(),
            "Resilience context ready"
        );

        Self { coordinator }
    }

    pub fn coordinator(&self) -> &ResilienceCoordinator {
        &self.coordinator
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        self.coordinator.metrics()
    }

    pub fn health_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.metrics().get_health_score())?)
    }

    pub fn metrics_summary_json(&self, window: Duration) -> Result<Value> {
        Ok(serde_json::to_value(
            self.metrics().get_metrics_summary(window),
        )?)
    }

    pub fn circuit_status_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.coordinator.get_circuit_status())?)
    }

    pub fn error_trends_json(&self, window: Duration, bucket: Duration) -> Result<Value> {
        Ok(serde_json::to_value(
            self.metrics().get_error_trends(window, bucket)?,
        )?)
    }
}
