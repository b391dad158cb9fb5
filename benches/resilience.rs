//! Benchmarks for the resilience layer
//!
//! Run with: `cargo bench --bench resilience`

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use toolgate::resilience::{Invocation, MetricsCollector, ResilienceCoordinator};
use toolgate::{
    CircuitBreaker, CircuitBreakerConfig, ErrorCode, ErrorSanitizer, RetryConfig, RetryPolicy,
    RetryStrategy, SanitizationLevel, ServiceError, ToolgateError,
};

// =============================================================================
// Circuit Breaker
// =============================================================================

fn bench_breaker_call_closed(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreaker::with_defaults("bench");

    c.bench_function("circuit_breaker/call_closed", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(breaker.call(|| async { Ok::<_, ToolgateError>(42) }).await)
        });
    });
}

fn bench_breaker_rejects_open(c: &mut Criterion) {
    let breaker = CircuitBreaker::new(
        "bench",
        CircuitBreakerConfig::default().with_recovery_timeout(Duration::from_secs(3600)),
    );
    breaker.force_open();

    c.bench_function("circuit_breaker/call_sync_open", |b| {
        b.iter(|| black_box(breaker.call_sync(|| Ok::<_, ToolgateError>(42))));
    });
}

// =============================================================================
// Retry
// =============================================================================

fn bench_retry_delays(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry/calculate_delay");

    for strategy in [RetryStrategy::Exponential, RetryStrategy::Jitter] {
        let policy = RetryPolicy::new(RetryConfig::default().with_strategy(strategy));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{strategy:?}")),
            &policy,
            |b, policy| {
                b.iter(|| {
                    for attempt in 1..=5 {
                        black_box(policy.calculate_delay(attempt));
                    }
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Metrics
// =============================================================================

fn bench_record_error_with_alerts(c: &mut Criterion) {
    let metrics = MetricsCollector::default();
    let error: ToolgateError = ServiceError::new(ErrorCode::ApiTimeout, "slow").into();

    c.bench_function("metrics/record_error", |b| {
        b.iter(|| metrics.record_error(&error, "ocr_process", 120.0, 1.0, None));
    });
}

fn bench_summary_by_buffer_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics/summary");

    for size in [100usize, 1_000, 10_000] {
        let metrics = MetricsCollector::with_thresholds(size, Vec::new());
        let error: ToolgateError = ServiceError::new(ErrorCode::ApiTimeout, "slow").into();
        for i in 0..size {
            if i % 10 == 0 {
                metrics.record_error(&error, "ocr_process", 500.0, 1.0, None);
            } else {
                metrics.record_success("ocr_process", 100.0, 1.0, None);
            }
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), &metrics, |b, metrics| {
            b.iter(|| black_box(metrics.get_metrics_summary(Duration::from_secs(3600))));
        });
    }

    group.finish();
}

// =============================================================================
// Coordinator
// =============================================================================

fn bench_coordinator_success(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = ResilienceCoordinator::new(
        Arc::new(MetricsCollector::default()),
        RetryConfig::default(),
    );
    coordinator.register_breaker("mistral_api", CircuitBreakerConfig::default());

    c.bench_function("coordinator/execute_success", |b| {
        b.to_async(&rt).iter(|| async {
            let result = coordinator
                .execute(
                    Invocation::new("ocr_process").with_breaker("mistral_api"),
                    || async { Ok::<_, ToolgateError>(42) },
                )
                .await;
            black_box(result)
        });
    });
}

// =============================================================================
// Sanitizer
// =============================================================================

fn bench_sanitize(c: &mut Criterion) {
    let sanitizer = ErrorSanitizer::new(SanitizationLevel::Production);
    let raw = "upload of /home/user/report.pdf failed with sk-abcdefghijklmnop from 10.0.0.1";

    c.bench_function("sanitizer/safe_response", |b| {
        b.iter(|| black_box(sanitizer.safe_response(raw, None)));
    });
}

criterion_group!(
    breaker_benches,
    bench_breaker_call_closed,
    bench_breaker_rejects_open,
);

criterion_group!(retry_benches, bench_retry_delays);

criterion_group!(
    metrics_benches,
    bench_record_error_with_alerts,
    bench_summary_by_buffer_size,
);

criterion_group!(combined_benches, bench_coordinator_success, bench_sanitize);

criterion_main!(breaker_benches, retry_benches, metrics_benches, combined_benches);
