//! Telemetry failures.

use prometheus::Error as PrometheusError;
use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while installing logging or handling metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("logging subscriber install failed")]
    SubscriberInstall {
        /// Underlying subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A collector could not be built or registered.
    #[error("metrics collector setup failed")]
    MetricsCollector {
        /// Metric name.
        name: &'static str,
        /// `build` or `register`.
        operation: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// The registry could not be rendered as text.
    #[error("metrics render failed")]
    MetricsRender {
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// Rendered metrics were not UTF-8.
    #[error("metrics render produced invalid utf-8")]
    MetricsUtf8 {
        /// Underlying conversion error.
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn collector(
        name: &'static str,
        operation: &'static str,
        source: PrometheusError,
    ) -> Self {
        Self::MetricsCollector {
            name,
            operation,
            source,
        }
    }
}
