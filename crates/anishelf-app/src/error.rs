//! # Design
//!
//! - Centralize application-level errors for bootstrap and the pipeline run.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Map failures onto process exit codes in one place.

use anishelf_protocol::LookupError;
use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Result alias for a pipeline run.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures that abort a whole pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The rename template did not compile.
    #[error("rename template is invalid")]
    Template {
        /// Source template error.
        source: anishelf_fsops::FsOpsError,
    },
    /// The remote session failed; the run was cancelled.
    #[error("lookup session failed")]
    Session {
        /// Session call that failed.
        operation: &'static str,
        /// Source session error.
        source: LookupError,
    },
    /// The server refused the credentials.
    #[error("authentication rejected")]
    AuthenticationRejected {
        /// Account name used.
        username: String,
    },
    /// A stage task terminated abnormally.
    #[error("pipeline stage task failed")]
    Stage {
        /// Stage name.
        stage: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl PipelineError {
    /// Whether the failure came from the remote session.
    #[must_use]
    pub const fn is_session_failure(&self) -> bool {
        matches!(
            self,
            Self::Session { .. } | Self::AuthenticationRejected { .. }
        )
    }
}

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: anishelf_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: anishelf_telemetry::TelemetryError,
    },
    /// Session construction failed.
    #[error("session setup failed")]
    Session {
        /// Operation identifier.
        operation: &'static str,
        /// Source session error.
        source: LookupError,
    },
    /// Local store operations failed.
    #[error("local store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: anyhow::Error,
    },
    /// The pipeline run failed.
    #[error("pipeline run failed")]
    Pipeline {
        /// Source pipeline error.
        #[from]
        source: PipelineError,
    },
    /// Required dependency was missing.
    #[error("missing dependency")]
    MissingDependency {
        /// Name of the missing dependency.
        name: &'static str,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: anishelf_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: anishelf_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn session(operation: &'static str, source: LookupError) -> Self {
        Self::Session { operation, source }
    }

    pub(crate) const fn store(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Store { operation, source }
    }

    /// Process exit code: 2 for session failures, 1 for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Pipeline { source } if source.is_session_failure() => 2,
            Self::Session { .. } => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "load",
            anishelf_config::ConfigError::InvalidField {
                section: "rename",
                field: "mode",
                value: None,
                reason: "unknown_mode",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert!(config.source().is_some());
        assert_eq!(config.exit_code(), 1);

        let store = AppError::store("open", anyhow::anyhow!("disk full"));
        assert_eq!(store.to_string(), "local store operation failed");
    }

    #[test]
    fn session_failures_exit_with_two() {
        let session = AppError::session(
            "replay.load",
            LookupError::session("replay.read", io::Error::other("missing")),
        );
        assert_eq!(session.exit_code(), 2);

        let rejected = AppError::from(PipelineError::AuthenticationRejected {
            username: "user".into(),
        });
        assert_eq!(rejected.exit_code(), 2);

        let missing = AppError::MissingDependency { name: "session" };
        assert_eq!(missing.exit_code(), 1);
    }
}
