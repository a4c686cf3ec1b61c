//! # Structured Logging Module
//!
//! Console logging for the sync engine. Output is either human readable
//! (`pretty`) or one JSON object per line (`json`) for log shippers. `RUST_LOG`
//! overrides the configured level when it is set.

use crate::config::{LogFormat, LoggingConfig};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process; later calls are no-ops
pub fn init_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(&config.level);

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .boxed(),
        };

        // A subscriber installed by an embedding process or a test harness wins
        if tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            level = %config.level,
            format = ?config.format,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// `RUST_LOG` when set and parseable, else the configured level
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(crate::constants::defaults::LOG_LEVEL))
}

/// Log structured data for job lifecycle events
pub fn log_job_operation(
    job: &str,
    operation: &str,
    status: &str,
    records: Option<usize>,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        job = %job,
        operation = %operation,
        status = %status,
        records = records,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 JOB_OPERATION"
    );
}

/// Log structured data for source operations
pub fn log_source_operation(
    source: &str,
    operation: &str,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        source = %source,
        operation = %operation,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🛰️ SOURCE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        // Must not panic on a directive EnvFilter rejects
        let _ = build_filter("info,[=");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&LoggingConfig {
            format: LogFormat::Json,
            ..config
        });
        log_job_operation("totals", "refresh", "succeeded", Some(3), Some(12), None);
        log_source_operation("primary", "ping", "ok", Some(4), None);
        log_error("engine", "refresh", "boom", Some("test"));
    }
}
