//! Error message sanitization for user-facing payloads
//!
//! Redacts credentials, paths and identifiers from raw error text and maps
//! technical failures to friendly wording. The HTTP layer calls this; the
//! resilience core only supplies codes and severities.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Severity, ToolgateError};

/// How much detail survives sanitization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizationLevel {
    /// Raw messages pass through
    Development,
    /// Redacted messages, technical details included
    Staging,
    /// Friendly messages only
    #[default]
    Production,
}

impl FromStr for SanitizationLevel {
    type Err = ToolgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ToolgateError::InvalidArgument {
                reason: format!("unknown sanitization level '{other}'"),
            }),
        }
    }
}

impl fmt::Display for SanitizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        };
        f.write_str(s)
    }
}

fn rule(pattern: &str, replacement: &'static str) -> Option<(Regex, &'static str)> {
    match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::error!(pattern, error = %e, "Invalid redaction pattern");
            None
        }
    }
}

/// Applied in order; earlier rules see the untouched text
static REDACTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)[a-z][a-z0-9+.\-]*://[^\s/@]+:[^\s/@]+@[^\s]+", "[CREDENTIALS_URL]"),
        (r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b", "[EMAIL]"),
        (r"sk-[a-zA-Z0-9\-_]{10,}", "[API_KEY]"),
        (r"(?i)api[-_]?key[-_:=]?\s*[a-z0-9\-_]{20,}", "[API_KEY]"),
        (r"(?i)bearer\s+[a-z0-9\-_.]{20,}", "[BEARER_TOKEN]"),
        (r"(?i)token[-_:=]?\s*[a-z0-9\-_]{20,}", "[TOKEN]"),
        (r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}", "[UUID]"),
        (r"(?i)/tmp/[a-z0-9_\-./]+", "[TEMP_PATH]"),
        (r"(?i)/var/[a-z0-9_\-./]+", "[VAR_PATH]"),
        (r"(?i)/[a-z0-9_\-./]+\.(pdf|png|jpg|jpeg|tiff)", "[FILE_PATH]"),
        (r"(?i)\b[c-z]:\\[a-z0-9_\-.\\]+", "[FILE_PATH]"),
        (r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b", "[IP_ADDRESS]"),
        (r"(?i)0x[a-f0-9]{8,16}", "[MEMORY_ADDRESS]"),
        (r"(?i)password[-_:=]?\s*[a-z0-9]+", "[PASSWORD]"),
        (r"(?i)secret[-_:=]?\s*[a-z0-9]+", "[SECRET]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| rule(pattern, replacement))
    .collect()
});

/// Lines that belong to a stack trace
static STACK_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*(traceback \(most recent call last\)|file "[^"]+", line \d+|raise [a-z]+|during handling of|the above exception|stack backtrace:|at [a-z_][a-z0-9_.:<>]*\(.*\)|\d+: [a-z_][a-z0-9_:<>]*::)"#,
    )
    .ok()
});

/// Substring (lowercase) → friendly message, first match wins
const FRIENDLY_MESSAGES: &[(&str, &str)] = &[
    ("out of memory", "The file is too large to process"),
    ("not found", "The requested file could not be found"),
    ("connection", "Unable to connect to the processing service"),
    ("timed out", "The request took too long to process"),
    ("timeout", "The request took too long to process"),
    ("ssl", "Secure connection error"),
    ("tls", "Secure connection error"),
    ("proxy", "Network proxy error"),
    ("unavailable", "Service temporarily unavailable"),
    ("pdf", "PDF document processing failed"),
    ("ocr", "Text extraction processing failed"),
    ("mistral", "AI processing service error"),
    ("validation", "Document validation failed"),
    ("unauthorized", "Authentication required"),
    ("forbidden", "Operation not permitted"),
    ("denied", "Access was denied"),
    ("corrupt", "Document appears to be damaged"),
    ("exceeded", "Limit was exceeded"),
    ("invalid", "Invalid input provided"),
    ("failed to", "Operation was unsuccessful"),
    ("unable to", "Operation could not be completed"),
    ("cannot", "Operation is not possible"),
];

const DEFAULT_FRIENDLY_MESSAGE: &str =
    "An error occurred while processing your request. Please try again or contact support if the issue persists.";

const CRITICAL_INDICATORS: &[&str] = &[
    "memory",
    "system",
    "database",
    "connection",
    "network",
    "authentication",
    "authorization",
    "security",
    "crash",
];
const HIGH_INDICATORS: &[&str] = &[
    "timeout",
    "unavailable",
    "failed",
    "error",
    "exception",
    "invalid",
    "corrupt",
    "denied",
];
const MEDIUM_INDICATORS: &[&str] = &["warning", "limit", "exceeded", "retry", "temporary"];

const MAX_SUGGESTIONS: usize = 3;

/// Payload safe to return to API clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafeErrorResponse {
    pub status: &'static str,
    pub error_code: String,
    pub message: String,
    pub severity: Severity,
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_details: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorSanitizer {
    level: SanitizationLevel,
}

impl ErrorSanitizer {
    pub fn new(level: SanitizationLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> SanitizationLevel {
        self.level
    }

    /// Redact sensitive fragments and strip stack traces
    pub fn sanitize_message(&self, raw: &str) -> String {
        if self.level == SanitizationLevel::Development {
            return raw.to_string();
        }

        let mut text = raw.to_string();
        for (re, replacement) in REDACTIONS.iter() {
            text = re.replace_all(&text, *replacement).into_owned();
        }

        let lines: Vec<&str> = text
            .lines()
            .filter(|line| {
                STACK_LINE
                    .as_ref()
                    .map_or(true, |re| !re.is_match(line))
            })
            .filter(|line| !line.trim().is_empty())
            .collect();
        lines.join("\n").trim().to_string()
    }

    /// Friendly wording for a technical message
    pub fn user_friendly_message(&self, raw: &str) -> String {
        if self.level == SanitizationLevel::Development {
            return raw.to_string();
        }

        let lower = raw.to_lowercase();
        FRIENDLY_MESSAGES
            .iter()
            .find(|(pattern, _)| lower.contains(pattern))
            .map(|(_, friendly)| friendly.to_string())
            .unwrap_or_else(|| DEFAULT_FRIENDLY_MESSAGE.to_string())
    }

    /// Taxonomy severity when the code is known, keyword guess otherwise
    pub fn categorize_severity(&self, raw: &str, code: Option<ErrorCode>) -> Severity {
        if let Some(code) = code {
            return code.severity();
        }

        let lower = raw.to_lowercase();
        let hit = |indicators: &[&str]| indicators.iter().any(|i| lower.contains(i));
        if hit(CRITICAL_INDICATORS) {
            Severity::Critical
        } else if hit(HIGH_INDICATORS) {
            Severity::High
        } else if hit(MEDIUM_INDICATORS) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Up to three hints matching the message content
    pub fn suggestions(&self, raw: &str) -> Vec<String> {
        let lower = raw.to_lowercase();
        let has = |word: &str| lower.contains(word);
        let mut out: Vec<&str> = Vec::new();

        if has("file") {
            if has("size") || has("large") {
                out.extend([
                    "Try reducing the file size",
                    "Compress the document before uploading",
                    "Split large documents into smaller files",
                ]);
            } else if has("format") || has("invalid") {
                out.extend([
                    "Ensure the file is a valid PDF, PNG, JPG, JPEG, or TIFF",
                    "Check that the file is not corrupted",
                    "Try saving the file in a different format",
                ]);
            }
        }
        if has("network") || has("connection") {
            out.extend([
                "Check your internet connection",
                "Try again in a few moments",
                "Verify the URL is accessible",
            ]);
        }
        if has("timeout") {
            out.extend([
                "Try processing a smaller document",
                "Retry the operation",
                "Break large documents into smaller chunks",
            ]);
        }
        if has("authentication") || has("api") {
            out.extend([
                "Verify your API key is valid and active",
                "Check that your API key has the required permissions",
                "Ensure your API key is not expired",
            ]);
        }
        if has("rate") && has("limit") {
            out.extend([
                "Wait a moment before trying again",
                "Reduce the frequency of requests",
                "Consider upgrading your API plan",
            ]);
        }
        if out.is_empty() {
            out.extend([
                "Try the operation again",
                "Contact support if the issue persists",
                "Check the service status page",
            ]);
        }

        out.into_iter()
            .take(MAX_SUGGESTIONS)
            .map(String::from)
            .collect()
    }

    /// Build the client payload for a raw message
    pub fn safe_response(&self, raw: &str, code: Option<ErrorCode>) -> SafeErrorResponse {
        let sanitized = self.sanitize_message(raw);
        let message = match self.level {
            SanitizationLevel::Production => self.user_friendly_message(raw),
            _ => sanitized.clone(),
        };

        SafeErrorResponse {
            status: "error",
            error_code: code
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
            message,
            severity: self.categorize_severity(raw, code),
            suggestions: self.suggestions(raw),
            timestamp: Utc::now(),
            technical_details: (self.level != SanitizationLevel::Production).then_some(sanitized),
        }
    }

    /// Payload for a crate error, keeping its code and severity
    pub fn response_for(&self, error: &ToolgateError) -> SafeErrorResponse {
        let mut response = self.safe_response(&error.message(), error.taxonomy_code());
        response.error_code = error.code().to_string();
        response.severity = error.severity();
        response
    }
}
