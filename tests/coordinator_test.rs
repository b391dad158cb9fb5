//! # Coordinator Tests
//!
//! Retry wrapped around breaker wrapped around the operation, driven through
//! a `ResilienceContext` built from TOML.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use toolgate::resilience::Invocation;
use toolgate::{CircuitState, ErrorCode, ResilienceContext, ToolgateConfig, ToolgateError};

use common::{fast_retry, quiet_coordinator, service_error, CollectingSink};

const CONFIG: &str = r#"
[retry]
max_attempts = 4
base_delay_seconds = 0.001
max_delay_seconds = 0.01

[metrics]
capacity = 500

[breakers.mistral_api]
failure_threshold = 2
success_threshold = 1
recovery_timeout_seconds = 30.0
timeout_seconds = 5.0

[[alerts]]
metric_type = "error_count"
threshold_value = 2.0
window_seconds = 60.0
alert_level = "error"
description = "Two failures in a minute"
"#;

fn context(sink: Arc<CollectingSink>) -> ResilienceContext {
    let config = ToolgateConfig::from_toml(CONFIG).unwrap();
    config.validate().unwrap();
    ResilienceContext::with_sinks(&config, vec![sink])
}

#[tokio::test]
async fn test_context_from_toml_wires_everything() {
    let sink = Arc::new(CollectingSink::default());
    let ctx = context(sink.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let result: toolgate::Result<String> = ctx
        .coordinator()
        .execute(
            Invocation::new("ocr_process").with_breaker("mistral_api"),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(service_error(ErrorCode::ApiServiceUnavailable, "503"))
                }
            },
        )
        .await;

    // Two failures open the breaker, the third attempt is rejected
    assert!(matches!(result, Err(ToolgateError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let status = ctx.circuit_status_json().unwrap();
    assert_eq!(status.as_object().unwrap().len(), 1);
    assert_eq!(status["mistral_api"]["state"], "open");

    let summary = ctx.metrics_summary_json(Duration::from_secs(60)).unwrap();
    assert_eq!(summary["total_errors"], 3);
    assert_eq!(summary["errors_by_code"]["SERVICE_UNAVAILABLE"], 1);
    assert_eq!(ctx.metrics().capacity(), 500);

    assert_eq!(sink.alerts().len(), 1);
}

#[tokio::test]
async fn test_fallback_rescues_open_breaker() {
    let coordinator = quiet_coordinator(fast_retry(1));
    let breaker = coordinator.register_breaker(
        "url_download",
        toolgate::CircuitBreakerConfig::default().with_failure_threshold(1),
    );
    breaker.force_open();
    coordinator.register_fallback("fetch_document", || async {
        Ok::<_, ToolgateError>(b"cached".to_vec())
    });

    let bytes = coordinator
        .execute(
            Invocation::new("fetch_document").with_breaker("url_download"),
            || async { Ok(b"fresh".to_vec()) },
        )
        .await
        .unwrap();

    assert_eq!(bytes, b"cached".to_vec());
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_invocation_retry_override() {
    let coordinator = quiet_coordinator(fast_retry(5));
    let calls = Arc::new(AtomicU32::new(0));

    let result: toolgate::Result<()> = coordinator
        .execute(
            Invocation::new("ocr_process").with_retry(fast_retry(2)),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(service_error(ErrorCode::ApiTimeout, "slow"))
                }
            },
        )
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(coordinator.attempt_history("ocr_process").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_backoff_and_skips_fallback() {
    let retry = fast_retry(5).with_base_delay(Duration::from_secs(30));
    let coordinator = quiet_coordinator(retry.with_max_delay(Duration::from_secs(60)));
    coordinator.register_fallback("ocr_process", || async { Ok::<_, ToolgateError>(0u8) });

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let result = coordinator
        .execute_with_cancel(Invocation::new("ocr_process"), &token, || async {
            Err::<u8, _>(service_error(ErrorCode::ApiTimeout, "slow"))
        })
        .await;

    assert!(matches!(result, Err(ToolgateError::Cancelled { .. })));
    assert_eq!(coordinator.attempt_history("ocr_process").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_invocations_share_metrics() {
    let coordinator = Arc::new(quiet_coordinator(fast_retry(1)));
    coordinator.register_breaker(
        "mistral_api",
        toolgate::CircuitBreakerConfig::default().with_failure_threshold(1_000),
    );

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .execute(
                    Invocation::new("ocr_process")
                        .with_breaker("mistral_api")
                        .with_user_info(serde_json::json!({ "request": i })),
                    move || async move {
                        if i % 4 == 0 {
                            Err(service_error(ErrorCode::FileCorrupted, "bad xref"))
                        } else {
                            Ok(i)
                        }
                    },
                )
                .await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }

    let summary = coordinator
        .metrics()
        .get_metrics_summary(Duration::from_secs(60));
    assert_eq!(ok, 30);
    assert_eq!(summary.total_requests, 40);
    assert_eq!(summary.total_errors, 10);
    assert_eq!(
        coordinator.get_circuit_status()["mistral_api"].request_count,
        40
    );
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_counts_against_breaker_and_metrics() {
    let retry = fast_retry(3).with_timeout_per_attempt(Duration::from_millis(100));
    let coordinator = quiet_coordinator(retry);
    let breaker = coordinator.register_breaker(
        "mistral_api",
        toolgate::CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_secs(30)),
    );

    let result: toolgate::Result<()> = coordinator
        .execute(Invocation::new("ocr_process").with_breaker("mistral_api"), || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(ToolgateError::Timeout { .. })));
    assert_eq!(coordinator.attempt_history("ocr_process").len(), 3);
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.get_status().request_count, 3);

    let summary = coordinator
        .metrics()
        .get_metrics_summary(Duration::from_secs(60));
    assert_eq!(summary.total_errors, 3);
    assert_eq!(summary.errors_by_code.get("TIMEOUT_ERROR"), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn test_half_open_attempt_timeout_reopens_breaker() {
    let retry = fast_retry(1).with_timeout_per_attempt(Duration::from_millis(100));
    let coordinator = quiet_coordinator(retry);
    let breaker = coordinator.register_breaker(
        "url_download",
        toolgate::CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_recovery_timeout(Duration::from_secs(1)),
    );
    let hang = || async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, ToolgateError>(())
    };

    let first = coordinator
        .execute(Invocation::new("download").with_breaker("url_download"), hang)
        .await;
    assert!(matches!(first, Err(ToolgateError::Timeout { .. })));
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(2)).await;
    let retried = coordinator
        .execute(Invocation::new("download").with_breaker("url_download"), hang)
        .await;
    assert!(matches!(retried, Err(ToolgateError::Timeout { .. })));
    assert_eq!(breaker.state(), CircuitState::Open);
}
