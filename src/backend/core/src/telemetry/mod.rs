//! Telemetry: structured logging and authorization metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use saas_core::telemetry::{init_telemetry, LoggingConfig};
//!
//! init_telemetry(&LoggingConfig::default(), "production").expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEventConfig};
pub use metrics::AuthzMetrics;

/// Initialize logging and register metric descriptions.
///
/// Call once at startup. Metric descriptions only take effect if a recorder
/// was installed beforehand.
pub fn init_telemetry(logging: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    AuthzMetrics::describe();
    init_logging(logging, environment)?;
    ::tracing::info!(environment, "Telemetry initialized");
    Ok(())
}
