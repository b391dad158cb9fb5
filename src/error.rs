// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Toolgate Error Types
//!
//! Two layers live here:
//!
//! - The **service taxonomy** ([`ErrorCode`], [`ServiceError`]): what upstream
//!   providers (Mistral, Qdrant, S3, URL downloads) failed with, each error
//!   carrying a code, a `recoverable` flag and a correlation context.
//! - The **crate error** ([`ToolgateError`]): everything a resilient call can
//!   end with, including the breaker's own "circuit open" rejection and
//!   unknown external errors that still need classifying.
//!
//! Crate-level codes:
//! - TG-010-019: Resilience errors (circuit open, timeout, cancelled)
//! - TG-020-029: Unclassified external errors
//! - TG-030-039: Registry/argument errors
//! - TG-040-049: Config errors
//! - TG-050-059: IO/serialization errors

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolgateError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

// ═══════════════════════════════════════════
// SERVICE TAXONOMY
// ═══════════════════════════════════════════

/// Standardized upstream error codes.
///
/// Serialized as SCREAMING_SNAKE_CASE (`"API_TIMEOUT"`), which is also the
/// key used in metrics breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // File validation
    InvalidFileFormat,
    FileTooLarge,
    FileCorrupted,
    FileEmpty,
    FileUnreadable,
    // Network and URL
    UrlUnreachable,
    UrlInvalid,
    DownloadFailed,
    DownloadTimeout,
    // Provider API
    ApiAuthenticationFailed,
    ApiRateLimitExceeded,
    ApiQuotaExceeded,
    ApiServiceUnavailable,
    ApiTimeout,
    ApiInvalidResponse,
    // Processing
    ProcessingFailed,
    ParsingFailed,
    ExtractionFailed,
    ImageProcessingFailed,
    // System
    StorageError,
    MemoryError,
    TimeoutError,
    InternalError,
    // Configuration
    InvalidConfiguration,
    MissingCredentials,
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFileFormat => "INVALID_FILE_FORMAT",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::FileCorrupted => "FILE_CORRUPTED",
            Self::FileEmpty => "FILE_EMPTY",
            Self::FileUnreadable => "FILE_UNREADABLE",
            Self::UrlUnreachable => "URL_UNREACHABLE",
            Self::UrlInvalid => "URL_INVALID",
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::DownloadTimeout => "DOWNLOAD_TIMEOUT",
            Self::ApiAuthenticationFailed => "API_AUTHENTICATION_FAILED",
            Self::ApiRateLimitExceeded => "API_RATE_LIMIT_EXCEEDED",
            Self::ApiQuotaExceeded => "API_QUOTA_EXCEEDED",
            Self::ApiServiceUnavailable => "API_SERVICE_UNAVAILABLE",
            Self::ApiTimeout => "API_TIMEOUT",
            Self::ApiInvalidResponse => "API_INVALID_RESPONSE",
            Self::ProcessingFailed => "PROCESSING_FAILED",
            Self::ParsingFailed => "PARSING_FAILED",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
            Self::ImageProcessingFailed => "IMAGE_PROCESSING_FAILED",
            Self::StorageError => "STORAGE_ERROR",
            Self::MemoryError => "MEMORY_ERROR",
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    /// Severity this code is reported with in metrics and sanitized payloads.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ApiAuthenticationFailed
            | Self::MissingCredentials
            | Self::InvalidConfiguration
            | Self::MemoryError
            | Self::InternalError => Severity::Critical,
            Self::ApiServiceUnavailable
            | Self::ServiceUnavailable
            | Self::ApiTimeout
            | Self::TimeoutError
            | Self::DownloadTimeout
            | Self::StorageError
            | Self::ProcessingFailed
            | Self::ApiInvalidResponse
            | Self::UrlUnreachable
            | Self::DownloadFailed => Severity::High,
            Self::ApiRateLimitExceeded
            | Self::ApiQuotaExceeded
            | Self::ParsingFailed
            | Self::ExtractionFailed
            | Self::ImageProcessingFailed
            | Self::FileCorrupted
            | Self::FileUnreadable => Severity::Medium,
            Self::InvalidFileFormat | Self::FileTooLarge | Self::FileEmpty | Self::UrlInvalid => {
                Severity::Low
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry/severity classification attached to every error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub retryable: bool,
    pub severity: Severity,
}

/// Correlation context carried by service errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ErrorContext {
    /// Create a context with a fresh correlation id
    pub fn new() -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An upstream failure expressed in the service taxonomy
#[derive(Debug, Clone, Serialize)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
    pub context: ErrorContext,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ServiceError {
    /// Non-recoverable error with a fresh context
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable: false,
            context: ErrorContext::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
        self
    }

    /// Map a provider HTTP status to the taxonomy.
    ///
    /// 401 is an auth failure, 429 a (recoverable) rate limit, 5xx a
    /// (recoverable) outage. Anything else is an unrecoverable API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let err = match status {
            401 => Self::new(ErrorCode::ApiAuthenticationFailed, message)
                .with_suggestion("Verify the provider API key is valid and active"),
            429 => Self::new(ErrorCode::ApiRateLimitExceeded, message)
                .recoverable(true)
                .with_suggestion("Wait before making another request"),
            s if s >= 500 => Self::new(ErrorCode::ApiServiceUnavailable, message)
                .recoverable(true)
                .with_suggestion("Try again in a few minutes"),
            _ => Self::new(ErrorCode::ApiServiceUnavailable, message),
        };
        let context = err.context.clone().with_detail("api_response_code", status);
        err.with_context(context)
    }

    /// Operation exceeded its time budget
    pub fn timeout(operation: impl Into<String>, duration_secs: f64) -> Self {
        let operation = operation.into();
        Self::new(
            ErrorCode::TimeoutError,
            format!("Operation '{operation}' timed out after {duration_secs:.1} seconds"),
        )
        .recoverable(true)
        .with_context(
            ErrorContext::new()
                .with_operation(operation)
                .with_detail("timeout_duration_seconds", duration_secs),
        )
        .with_suggestion("Retry the operation as it may succeed")
    }

    /// File exceeds the upload limit (recoverable by the caller, never retried)
    pub fn file_too_large(size_bytes: u64, max_bytes: u64) -> Self {
        Self::new(
            ErrorCode::FileTooLarge,
            format!("File size {size_bytes} bytes exceeds limit of {max_bytes} bytes"),
        )
        .recoverable(true)
        .with_context(
            ErrorContext::new()
                .with_detail("file_size_bytes", size_bytes)
                .with_detail("max_size_bytes", max_bytes),
        )
        .with_suggestion("Split large documents into smaller files")
    }

    /// Wrap an error nothing else could classify
    pub fn unknown(message: impl fmt::Display, operation: Option<&str>) -> Self {
        let mut context = ErrorContext::new();
        if let Some(op) = operation {
            context = context.with_operation(op);
        }
        Self::new(
            ErrorCode::InternalError,
            format!("Unexpected error during processing: {message}"),
        )
        .with_context(context)
        .with_suggestion("Try the operation again")
        .with_suggestion("Contact support if the issue persists")
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

/// What an unclassified external error looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalKind {
    Network,
    Timeout,
    InvalidInput,
    Unknown,
}

impl ExternalKind {
    /// Network and timeout failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }

    /// Classify a std error by type first, message second
    pub fn classify(err: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            return match io.kind() {
                ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::AddrNotAvailable => Self::Network,
                ErrorKind::InvalidInput | ErrorKind::InvalidData => Self::InvalidInput,
                _ => Self::from_message(&io.to_string()),
            };
        }
        if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return Self::Timeout;
        }
        if err.downcast_ref::<std::num::ParseIntError>().is_some()
            || err.downcast_ref::<std::num::ParseFloatError>().is_some()
            || err.downcast_ref::<serde_json::Error>().is_some()
        {
            return Self::InvalidInput;
        }
        Self::from_message(&err.to_string())
    }

    /// Fallback classification on the message text
    pub fn from_message(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("timeout") || msg.contains("timed out") {
            Self::Timeout
        } else if msg.contains("connection")
            || msg.contains("network")
            || msg.contains("rate limit")
            || msg.contains("temporar")
            || msg.contains("unavailable")
            || msg.contains("503")
            || msg.contains("429")
            || msg.contains("502")
            || msg.contains("504")
        {
            Self::Network
        } else if msg.contains("invalid") || msg.contains("parse") || msg.contains("type") {
            Self::InvalidInput
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid_input",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// ═══════════════════════════════════════════
// CRATE ERROR
// ═══════════════════════════════════════════

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum ToolgateError {
    #[error("{0}")]
    #[diagnostic(code(toolgate::service_error))]
    Service(ServiceError),

    // ═══════════════════════════════════════════
    // RESILIENCE ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[TG-010] Circuit breaker '{breaker}' is open - service unavailable (half-open in {retry_after_ms}ms)")]
    #[diagnostic(
        code(toolgate::circuit_open),
        help("Wait for the recovery timeout or check the upstream service health")
    )]
    CircuitOpen { breaker: String, retry_after_ms: u64 },

    #[error("[TG-011] Operation '{operation}' timed out after {duration_ms}ms")]
    #[diagnostic(code(toolgate::timeout))]
    Timeout { operation: String, duration_ms: u64 },

    #[error("[TG-012] Operation '{operation}' was cancelled")]
    #[diagnostic(code(toolgate::cancelled))]
    Cancelled { operation: String },

    // ═══════════════════════════════════════════
    // EXTERNAL ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[TG-020] External {kind} error: {message}")]
    #[diagnostic(code(toolgate::external))]
    External { kind: ExternalKind, message: String },

    // ═══════════════════════════════════════════
    // REGISTRY/ARGUMENT ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[TG-030] Circuit breaker '{name}' is not registered")]
    #[diagnostic(code(toolgate::breaker_not_registered))]
    BreakerNotRegistered { name: String },

    #[error("[TG-031] Invalid argument: {reason}")]
    #[diagnostic(code(toolgate::invalid_argument))]
    InvalidArgument { reason: String },

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[TG-040] Config error: {reason}")]
    #[diagnostic(code(toolgate::config_error))]
    ConfigError { reason: String },

    // ═══════════════════════════════════════════
    // IO ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[TG-050] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[TG-051] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<ServiceError> for ToolgateError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl ToolgateError {
    /// Wrap an arbitrary external error, classifying it by type and message
    pub fn external<E>(err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::External {
            kind: ExternalKind::classify(&err),
            message: err.to_string(),
        }
    }

    /// Wrap an external failure known only by its message
    pub fn external_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::External {
            kind: ExternalKind::from_message(&message),
            message,
        }
    }

    /// Taxonomy code, when the error maps onto one
    pub fn taxonomy_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Service(e) => Some(e.code),
            Self::CircuitOpen { .. } => Some(ErrorCode::ServiceUnavailable),
            Self::Timeout { .. } => Some(ErrorCode::TimeoutError),
            _ => None,
        }
    }

    /// Get the error code (e.g., "API_TIMEOUT" or "TG-040")
    pub fn code(&self) -> &'static str {
        if let Some(code) = self.taxonomy_code() {
            return code.as_str();
        }
        match self {
            Self::Cancelled { .. } => "TG-012",
            Self::External { .. } => "TG-020",
            Self::BreakerNotRegistered { .. } => "TG-030",
            Self::InvalidArgument { .. } => "TG-031",
            Self::ConfigError { .. } => "TG-040",
            Self::IoError(_) => "TG-050",
            Self::JsonError(_) => "TG-051",
            Self::Service(_) | Self::CircuitOpen { .. } | Self::Timeout { .. } => "TG-000",
        }
    }

    /// Check if error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Service(e) => e.recoverable,
            Self::Timeout { .. } => true,
            Self::External { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    /// Whether this error came from outside the taxonomy
    pub fn is_unclassified(&self) -> bool {
        matches!(self, Self::External { .. })
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Service(e) => e.code.severity(),
            Self::CircuitOpen { .. } | Self::Timeout { .. } => Severity::High,
            Self::External { kind, .. } => match kind {
                ExternalKind::Network | ExternalKind::Timeout => Severity::High,
                ExternalKind::InvalidInput => Severity::Medium,
                ExternalKind::Unknown => Severity::Critical,
            },
            Self::Cancelled { .. } => Severity::Low,
            Self::BreakerNotRegistered { .. } | Self::InvalidArgument { .. } => Severity::Medium,
            Self::ConfigError { .. } | Self::IoError(_) | Self::JsonError(_) => Severity::High,
        }
    }

    pub fn classification(&self) -> Classification {
        Classification {
            retryable: self.is_recoverable(),
            severity: self.severity(),
        }
    }

    /// Correlation id, for errors that carry a context
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Service(e) => Some(e.context.correlation_id.as_str()),
            _ => None,
        }
    }

    /// Human message without the code prefix
    pub fn message(&self) -> String {
        match self {
            Self::Service(e) => e.message.clone(),
            other => other.to_string(),
        }
    }

    /// Convert an unclassified error into the generic taxonomy error.
    /// Everything else is returned unchanged.
    pub fn into_classified(self, operation: &str) -> Self {
        match self {
            Self::External { kind, message } => {
                let err = ServiceError::unknown(&message, Some(operation));
                let context = err.context.clone().with_detail("external_kind", kind.to_string());
                Self::Service(err.with_context(context))
            }
            other => other,
        }
    }
}

impl FixSuggestion for ToolgateError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ToolgateError::Service(e) => e
                .suggestions
                .first()
                .map(String::as_str)
                .or(match e.code {
                    ErrorCode::ApiAuthenticationFailed | ErrorCode::MissingCredentials => {
                        Some("Verify API key configuration")
                    }
                    ErrorCode::FileTooLarge => Some("Reduce the file size before uploading"),
                    _ => None,
                }),
            ToolgateError::CircuitOpen { .. } => {
                Some("Wait for the recovery timeout or check upstream health")
            }
            ToolgateError::Timeout { .. } => Some("Increase timeout or check for slow operations"),
            ToolgateError::Cancelled { .. } => None,
            ToolgateError::External { .. } => Some("Check upstream connectivity and logs"),
            ToolgateError::BreakerNotRegistered { .. } => {
                Some("Add the breaker under [breakers.<name>] in the config file")
            }
            ToolgateError::InvalidArgument { .. } => Some("Check the argument value"),
            ToolgateError::ConfigError { .. } => {
                Some("Check ~/.config/toolgate/config.toml for syntax errors")
            }
            ToolgateError::IoError(_) => Some("Check file path and permissions"),
            ToolgateError::JsonError(_) => Some("Check JSON syntax"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ApiAuthenticationFailed).unwrap();
        assert_eq!(json, "\"API_AUTHENTICATION_FAILED\"");
        assert_eq!(
            ErrorCode::ApiAuthenticationFailed.as_str(),
            "API_AUTHENTICATION_FAILED"
        );
    }

    #[test]
    fn test_service_error_display_contains_code() {
        let err = ServiceError::new(ErrorCode::ApiTimeout, "mistral did not answer");
        assert_eq!(err.to_string(), "[API_TIMEOUT] mistral did not answer");
        assert!(!err.recoverable);
    }

    #[test]
    fn test_api_status_mapping() {
        let auth = ServiceError::api(401, "unauthorized");
        assert_eq!(auth.code, ErrorCode::ApiAuthenticationFailed);
        assert!(!auth.recoverable);

        let limited = ServiceError::api(429, "slow down");
        assert_eq!(limited.code, ErrorCode::ApiRateLimitExceeded);
        assert!(limited.recoverable);

        let down = ServiceError::api(503, "bad gateway");
        assert_eq!(down.code, ErrorCode::ApiServiceUnavailable);
        assert!(down.recoverable);
        assert_eq!(
            down.context.details.get("api_response_code"),
            Some(&serde_json::json!(503))
        );

        let other = ServiceError::api(418, "teapot");
        assert!(!other.recoverable);
    }

    #[test]
    fn test_with_suggestion_deduplicates() {
        let err = ServiceError::new(ErrorCode::ProcessingFailed, "x")
            .with_suggestion("retry")
            .with_suggestion("retry");
        assert_eq!(err.suggestions.len(), 1);
    }

    #[test]
    fn test_circuit_open_code_and_classification() {
        let err = ToolgateError::CircuitOpen {
            breaker: "mistral_api".to_string(),
            retry_after_ms: 1000,
        };
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("[TG-010]"));
        assert!(err.to_string().contains("mistral_api"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = ToolgateError::Timeout {
            operation: "ocr".to_string(),
            duration_ms: 5000,
        };
        let class = err.classification();
        assert!(class.retryable);
        assert_eq!(class.severity, Severity::High);
        assert_eq!(err.code(), "TIMEOUT_ERROR");
    }

    #[test]
    fn test_external_io_error_classification() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ToolgateError::external(refused);
        assert!(matches!(
            err,
            ToolgateError::External {
                kind: ExternalKind::Network,
                ..
            }
        ));
        assert!(err.is_recoverable());

        let bad = std::io::Error::new(std::io::ErrorKind::InvalidData, "garbage");
        assert!(!ToolgateError::external(bad).is_recoverable());
    }

    #[test]
    fn test_external_parse_error_not_retryable() {
        let parse = "abc".parse::<u32>().unwrap_err();
        let err = ToolgateError::external(parse);
        assert!(!err.is_recoverable());
        assert_eq!(err.severity(), Severity::Medium);
    }

    #[test]
    fn test_external_message_patterns() {
        for msg in ["connection reset by peer", "503 Service Unavailable", "request timed out"] {
            assert!(
                ToolgateError::external_message(msg).is_recoverable(),
                "expected '{}' to be retryable",
                msg
            );
        }
        let unknown = ToolgateError::external_message("segfault in plugin");
        assert!(!unknown.is_recoverable());
        assert_eq!(unknown.severity(), Severity::Critical);
    }

    #[test]
    fn test_into_classified_wraps_external_only() {
        let wrapped = ToolgateError::external_message("boom").into_classified("split_pdf");
        match wrapped {
            ToolgateError::Service(e) => {
                assert_eq!(e.code, ErrorCode::InternalError);
                assert_eq!(e.context.operation.as_deref(), Some("split_pdf"));
                assert!(e.message.contains("boom"));
            }
            other => panic!("expected service error, got {other:?}"),
        }

        let service: ToolgateError = ServiceError::new(ErrorCode::ApiTimeout, "slow").into();
        assert_eq!(service.into_classified("op").code(), "API_TIMEOUT");
    }

    #[test]
    fn test_correlation_id_only_for_service_errors() {
        let ctx = ErrorContext::new().with_correlation_id("req-42");
        let err: ToolgateError = ServiceError::new(ErrorCode::StorageError, "s3 down")
            .with_context(ctx)
            .into();
        assert_eq!(err.correlation_id(), Some("req-42"));

        let cfg = ToolgateError::ConfigError {
            reason: "bad".to_string(),
        };
        assert_eq!(cfg.correlation_id(), None);
    }

    #[test]
    fn test_fix_suggestion_prefers_error_suggestions() {
        let err: ToolgateError = ServiceError::file_too_large(100, 10).into();
        assert_eq!(
            err.fix_suggestion(),
            Some("Split large documents into smaller files")
        );
        let cfg = ToolgateError::BreakerNotRegistered {
            name: "x".to_string(),
        };
        assert!(cfg.fix_suggestion().unwrap().contains("[breakers."));
    }
}
