//! Error and success metrics collection
//!
//! Every outcome lands in one bounded ring buffer. Summaries, trend buckets
//! and alert checks are computed from the buffer on demand.
//!
//! # Example
//!
//! ```rust,ignore
//! use toolgate::resilience::MetricsCollector;
//! use std::time::Duration;
//!
//! let metrics = MetricsCollector::new(10_000);
//! metrics.record_success("ocr_process", 120.0, 2.5, None);
//!
//! let summary = metrics.get_metrics_summary(Duration::from_secs(3600));
//! println!("error rate: {}", summary.error_rate);
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use super::alerts::{default_thresholds, Alert, AlertEngine, AlertSink, AlertThreshold, MetricType};
use super::health::HealthReport;
use crate::error::{Result, Severity, ToolgateError};

/// Default ring buffer capacity
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Entries included in an export
const EXPORT_RECENT: usize = 100;

/// Messages listed in a summary
const TOP_MESSAGES: usize = 10;

/// Upper bound on trend buckets per request
const MAX_BUCKETS: usize = 1_000;

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMetric {
    pub timestamp: DateTime<Utc>,
    pub error_code: String,
    pub message: String,
    pub operation: String,
    pub correlation_id: String,
    pub severity: Severity,
    pub recoverable: bool,
    pub processing_time_ms: f64,
    /// Caller-supplied cost hint, typically the payload size in MB
    pub size_hint: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<serde_json::Value>,
}

/// One recorded success
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub processing_time_ms: f64,
    pub size_hint: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<serde_json::Value>,
}

/// Ring buffer element
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricEntry {
    Error(ErrorMetric),
    Success(SuccessRecord),
}

impl MetricEntry {
    pub fn processing_time_ms(&self) -> f64 {
        match self {
            Self::Error(e) => e.processing_time_ms,
            Self::Success(s) => s.processing_time_ms,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

struct Stored {
    recorded_at: Instant,
    entry: MetricEntry,
}

/// Time-window summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub avg_processing_time_ms: f64,
    pub errors_by_code: BTreeMap<String, u64>,
    pub errors_by_operation: BTreeMap<String, u64>,
    pub errors_by_severity: BTreeMap<String, u64>,
    /// `(message, count)`, most frequent first
    pub top_error_messages: Vec<(String, u64)>,
}

/// Direction of the error rate across a trend window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBucket {
    pub timestamp: DateTime<Utc>,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub errors_by_code: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAnalysis {
    pub trend: Trend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_avg_error_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_avg_error_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_requests_per_bucket: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorTrends {
    pub time_window_seconds: f64,
    pub bucket_size_seconds: f64,
    pub buckets: Vec<TrendBucket>,
    pub trends: TrendAnalysis,
}

/// Counts accumulated over one window
#[derive(Debug, Default, Clone, Copy)]
struct WindowStats {
    total: u64,
    errors: u64,
    processing_time_ms: f64,
}

impl WindowStats {
    fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64
        }
    }

    fn avg_processing_time_ms(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processing_time_ms / self.total as f64
        }
    }
}

struct Inner {
    buffer: VecDeque<Stored>,
    error_counts: HashMap<String, u64>,
    request_counts: HashMap<String, u64>,
    alerts: AlertEngine,
}

impl Inner {
    fn push(&mut self, capacity: usize, stored: Stored) {
        while self.buffer.len() >= capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(stored);
    }
}

fn within(
    buffer: &VecDeque<Stored>,
    now: Instant,
    window: Duration,
) -> impl Iterator<Item = &MetricEntry> {
    buffer
        .iter()
        .filter(move |s| now.saturating_duration_since(s.recorded_at) <= window)
        .map(|s| &s.entry)
}

fn measure(buffer: &VecDeque<Stored>, now: Instant, metric: MetricType, window: Duration) -> f64 {
    let stats = within(buffer, now, window).fold(WindowStats::default(), |mut acc, entry| {
        acc.total += 1;
        acc.errors += u64::from(entry.is_error());
        acc.processing_time_ms += entry.processing_time_ms();
        acc
    });

    match metric {
        MetricType::ErrorRate => stats.error_rate(),
        MetricType::ErrorCount => stats.errors as f64,
        MetricType::SuccessRate => 1.0 - stats.error_rate(),
        MetricType::Latency => stats.avg_processing_time_ms(),
        MetricType::Throughput => {
            let minutes = window.as_secs_f64() / 60.0;
            if minutes > 0.0 {
                stats.total as f64 / minutes
            } else {
                0.0
            }
        }
    }
}

/// `span` before `end`, saturating at the earliest representable time
fn before(end: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|d| end.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Bounded in-memory metrics store with embedded alerting
pub struct MetricsCollector {
    capacity: usize,
    inner: Mutex<Inner>,
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl MetricsCollector {
    /// Collector with the default alert thresholds
    pub fn new(capacity: usize) -> Self {
        Self::with_thresholds(capacity, default_thresholds())
    }

    pub fn with_thresholds(capacity: usize, thresholds: Vec<AlertThreshold>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                error_counts: HashMap::new(),
                request_counts: HashMap::new(),
                alerts: AlertEngine::new(thresholds),
            }),
            sinks: Vec::new(),
        }
    }

    /// Deliver fired alerts to `sink` in addition to the log
    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries currently buffered
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn thresholds(&self) -> Vec<AlertThreshold> {
        self.inner.lock().alerts.thresholds().to_vec()
    }

    /// Record a failure and run the alert check
    pub fn record_error(
        &self,
        error: &ToolgateError,
        operation: &str,
        processing_time_ms: f64,
        size_hint: f64,
        user_info: Option<&serde_json::Value>,
    ) {
        let context = match error {
            ToolgateError::Service(e) => serde_json::to_value(&e.context).ok(),
            _ => None,
        };
        let metric = ErrorMetric {
            timestamp: Utc::now(),
            error_code: error.code().to_string(),
            message: error.message(),
            operation: operation.to_string(),
            correlation_id: error.correlation_id().unwrap_or("unknown").to_string(),
            severity: error.severity(),
            recoverable: error.is_recoverable(),
            processing_time_ms,
            size_hint,
            context,
            user_info: user_info.cloned(),
        };

        let fired = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            *inner
                .error_counts
                .entry(metric.error_code.clone())
                .or_insert(0) += 1;
            inner.push(
                self.capacity,
                Stored {
                    recorded_at: now,
                    entry: MetricEntry::Error(metric),
                },
            );

            let Inner { buffer, alerts, .. } = &mut *inner;
            let buffer: &VecDeque<Stored> = buffer;
            alerts.evaluate(now, |metric, window| measure(buffer, now, metric, window))
        };

        self.emit(fired);
    }

    /// Record a success
    pub fn record_success(
        &self,
        operation: &str,
        processing_time_ms: f64,
        size_hint: f64,
        user_info: Option<&serde_json::Value>,
    ) {
        let record = SuccessRecord {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            processing_time_ms,
            size_hint,
            user_info: user_info.cloned(),
        };

        let mut inner = self.inner.lock();
        *inner
            .request_counts
            .entry(operation.to_string())
            .or_insert(0) += 1;
        inner.push(
            self.capacity,
            Stored {
                recorded_at: Instant::now(),
                entry: MetricEntry::Success(record),
            },
        );
    }

    fn emit(&self, alerts: Vec<Alert>) {
        for alert in alerts {
            tracing::error!(
                alert_level = %alert.alert_level,
                metric_type = %alert.metric_type,
                current_value = alert.current_value,
                threshold = alert.threshold_value,
                window_seconds = alert.window_seconds,
                "ALERT [{}]: {}",
                alert.alert_level.to_string().to_uppercase(),
                alert.description
            );
            for sink in &self.sinks {
                if let Err(e) = sink.deliver(&alert) {
                    tracing::warn!(error = %e, "Alert sink failed, alert dropped");
                }
            }
        }
    }

    /// Summary of the entries recorded within `window` of now
    pub fn get_metrics_summary(&self, window: Duration) -> MetricsSummary {
        let inner = self.inner.lock();
        summarize(&inner, Instant::now(), window)
    }

    /// Error rates per bucket across `window`.
    ///
    /// Buckets end at now; a remainder of the window shorter than one
    /// bucket is left out at the old end.
    pub fn get_error_trends(&self, window: Duration, bucket: Duration) -> Result<ErrorTrends> {
        if bucket.is_zero() {
            return Err(ToolgateError::InvalidArgument {
                reason: "bucket size must be greater than zero".to_string(),
            });
        }
        if window.as_nanos() / bucket.as_nanos() > MAX_BUCKETS as u128 {
            return Err(ToolgateError::InvalidArgument {
                reason: format!("window holds more than {MAX_BUCKETS} buckets"),
            });
        }

        let inner = self.inner.lock();
        Ok(trends(&inner, Instant::now(), window, bucket))
    }

    /// Health score over the last hour
    pub fn get_health_score(&self) -> HealthReport {
        HealthReport::from_summary(self.get_metrics_summary(Duration::from_secs(3600)))
    }

    /// Lifetime error counts per code
    pub fn error_counts(&self) -> BTreeMap<String, u64> {
        self.inner
            .lock()
            .error_counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Lifetime success counts per operation
    pub fn request_counts(&self) -> BTreeMap<String, u64> {
        self.inner
            .lock()
            .request_counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Newest `n` entries, oldest first
    pub fn recent_entries(&self, n: usize) -> Vec<MetricEntry> {
        let inner = self.inner.lock();
        let skip = inner.buffer.len().saturating_sub(n);
        inner
            .buffer
            .iter()
            .skip(skip)
            .map(|s| s.entry.clone())
            .collect()
    }

    /// Write summary, trends, thresholds and recent entries as JSON
    pub fn export_metrics(&self, path: &Path, window: Duration) -> Result<()> {
        let (summary, trends, thresholds, recent) = {
            let inner = self.inner.lock();
            let now = Instant::now();
            let skip = inner.buffer.len().saturating_sub(EXPORT_RECENT);
            (
                summarize(&inner, now, window),
                trends(&inner, now, window, Duration::from_secs(300)),
                inner.alerts.thresholds().to_vec(),
                inner
                    .buffer
                    .iter()
                    .skip(skip)
                    .map(|s| s.entry.clone())
                    .collect::<Vec<_>>(),
            )
        };

        let document = serde_json::json!({
            "export_timestamp": Utc::now(),
            "time_window_seconds": window.as_secs_f64(),
            "summary": summary,
            "trends": trends,
            "alert_thresholds": thresholds,
            "recent_metrics": recent,
        });

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
        tracing::info!(path = %path.display(), "Metrics exported");
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

fn summarize(inner: &Inner, now: Instant, window: Duration) -> MetricsSummary {
    let end_time = Utc::now();
    let start_time = before(end_time, window);

    let mut stats = WindowStats::default();
    let mut errors_by_code = BTreeMap::new();
    let mut errors_by_operation = BTreeMap::new();
    let mut errors_by_severity = BTreeMap::new();
    let mut messages: HashMap<&str, u64> = HashMap::new();

    for entry in within(&inner.buffer, now, window) {
        stats.total += 1;
        stats.processing_time_ms += entry.processing_time_ms();
        if let MetricEntry::Error(e) = entry {
            stats.errors += 1;
            *errors_by_code.entry(e.error_code.clone()).or_insert(0) += 1;
            *errors_by_operation.entry(e.operation.clone()).or_insert(0) += 1;
            *errors_by_severity
                .entry(e.severity.as_str().to_string())
                .or_insert(0) += 1;
            *messages.entry(e.message.as_str()).or_insert(0) += 1;
        }
    }

    let mut top_error_messages: Vec<(String, u64)> = messages
        .into_iter()
        .map(|(m, c)| (m.to_string(), c))
        .collect();
    top_error_messages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_error_messages.truncate(TOP_MESSAGES);

    let error_rate = stats.error_rate();
    MetricsSummary {
        start_time,
        end_time,
        total_requests: stats.total,
        total_errors: stats.errors,
        error_rate,
        success_rate: 1.0 - error_rate,
        avg_processing_time_ms: stats.avg_processing_time_ms(),
        errors_by_code,
        errors_by_operation,
        errors_by_severity,
        top_error_messages,
    }
}

fn trends(inner: &Inner, now: Instant, window: Duration, bucket: Duration) -> ErrorTrends {
    let bucket_ns = bucket.as_nanos().max(1);
    let count = ((window.as_nanos() / bucket_ns) as usize).min(MAX_BUCKETS);
    let end_time = Utc::now();

    let mut stats = vec![WindowStats::default(); count];
    let mut codes: Vec<BTreeMap<String, u64>> = vec![BTreeMap::new(); count];

    for stored in &inner.buffer {
        let age = now.saturating_duration_since(stored.recorded_at).as_nanos();
        // Bucket k (counted back from now) holds ages in (k*b, (k+1)*b]
        let back = if age == 0 { 0 } else { ((age - 1) / bucket_ns) as usize };
        if back >= count {
            continue;
        }
        let index = count - 1 - back;
        stats[index].total += 1;
        if let MetricEntry::Error(e) = &stored.entry {
            stats[index].errors += 1;
            *codes[index].entry(e.error_code.clone()).or_insert(0) += 1;
        }
    }

    let buckets: Vec<TrendBucket> = stats
        .iter()
        .zip(codes)
        .enumerate()
        .map(|(i, (s, errors_by_code))| TrendBucket {
            timestamp: before(end_time, bucket.saturating_mul((count - i) as u32)),
            total_requests: s.total,
            total_errors: s.errors,
            error_rate: s.error_rate(),
            errors_by_code,
        })
        .collect();

    ErrorTrends {
        time_window_seconds: window.as_secs_f64(),
        bucket_size_seconds: bucket.as_secs_f64(),
        trends: analyze(&buckets),
        buckets,
    }
}

fn analyze(buckets: &[TrendBucket]) -> TrendAnalysis {
    if buckets.len() < 2 {
        return TrendAnalysis {
            trend: Trend::InsufficientData,
            recent_avg_error_rate: None,
            early_avg_error_rate: None,
            avg_requests_per_bucket: None,
        };
    }

    let mean = |bs: &[TrendBucket]| bs.iter().map(|b| b.error_rate).sum::<f64>() / bs.len() as f64;
    let (early, recent) = buckets.split_at(buckets.len() / 2);
    let early_avg = mean(early);
    let recent_avg = mean(recent);

    let trend = if recent_avg > early_avg * 1.5 {
        Trend::Increasing
    } else if recent_avg < early_avg * 0.5 {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    let requests: u64 = buckets.iter().map(|b| b.total_requests).sum();
    TrendAnalysis {
        trend,
        recent_avg_error_rate: Some(recent_avg),
        early_avg_error_rate: Some(early_avg),
        avg_requests_per_bucket: Some(requests as f64 / buckets.len() as f64),
    }
}
