//! # Structured Logging
//!
//! One global `tracing` subscriber, human-readable or JSON lines. `RUST_LOG`
//! wins over the configured level when set.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Result, ToolgateError};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Filter from `RUST_LOG`, else from the configured directive
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| ToolgateError::ConfigError {
        reason: format!("Invalid log level '{}': {}", config.level, e),
    })
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    LOGGER_INITIALIZED.get_or_init(|| {
        let builder = fmt().with_env_filter(filter).with_target(true);
        let installed = if config.json {
            builder.json().with_current_span(false).try_init()
        } else {
            builder.try_init()
        };

        // A subscriber set elsewhere (tests, embedding app) stays in place
        if installed.is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    });

    Ok(())
}
