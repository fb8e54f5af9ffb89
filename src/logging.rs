//! # Structured Logging Module
//!
//! Environment-aware `tracing` setup plus the structured event helpers the
//! store client emits for every call.

use crate::config::Environment;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call repeatedly. If the host already installed a global
/// subscriber, that subscriber is kept.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = Environment::detect();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(environment)));

        let result = if environment == Environment::Production {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(filter),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_ansi(true)
                        .with_filter(filter),
                )
                .try_init()
        };

        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = environment.as_str(),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get log level based on environment
fn log_level(environment: Environment) -> &'static str {
    match environment {
        Environment::Production => "info",
        Environment::Development | Environment::Test => "debug",
    }
}

/// Telemetry record for one store call. Failures log at warn.
pub fn log_store_operation(operation: &str, category: &str, status: &str, duration_ms: u64) {
    if status == "success" {
        tracing::debug!(
            operation = %operation,
            category = %category,
            status = %status,
            durationMs = duration_ms,
            "💾 STORE_OPERATION"
        );
    } else {
        tracing::warn!(
            operation = %operation,
            category = %category,
            status = %status,
            durationMs = duration_ms,
            timestamp = %Utc::now().to_rfc3339(),
            "💾 STORE_OPERATION"
        );
    }
}

/// Logs a store failure that an operation's availability policy absorbed.
pub fn log_degraded_operation(operation: &str, policy: &str, error: &str) {
    tracing::warn!(
        operation = %operation,
        policy = %policy,
        error = %error,
        timestamp = %Utc::now().to_rfc3339(),
        "⚠️ DEGRADED_OPERATION"
    );
}
