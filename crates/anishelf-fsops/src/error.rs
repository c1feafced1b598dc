//! # Design
//!
//! - Provide structured, constant-message errors for hashing, templating and renames.
//! - Capture operation context (paths, fields, inputs) to make failures reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by filesystem work.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A blocking worker panicked or was aborted.
    #[error("fsops worker failure")]
    Worker {
        /// Operation the worker was performing.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
    /// The operation observed cancellation before completing.
    #[error("fsops operation cancelled")]
    Cancelled {
        /// Operation that was cancelled.
        operation: &'static str,
    },
    /// Template text could not be compiled.
    #[error("fsops invalid template")]
    InvalidTemplate {
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending fragment when available.
        value: Option<String>,
    },
    /// Input validation failures.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Destination already holds a different file.
    #[error("fsops destination exists")]
    DestinationExists {
        /// Occupied destination.
        path: PathBuf,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable label used as a failure reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Io { operation, .. } => operation,
            Self::Worker { .. } => "worker_failed",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidTemplate { reason, .. } | Self::InvalidInput { reason, .. } => reason,
            Self::DestinationExists { .. } => "destination_exists",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn fsops_error_helpers_build_variants() {
        let io_err = FsOpsError::io("read", "path", io::Error::other("io"));
        assert!(matches!(io_err, FsOpsError::Io { .. }));
        assert!(io_err.source().is_some());
        assert_eq!(io_err.reason(), "read");
        assert_eq!(io_err.to_string(), "fsops io failure");

        let exists = FsOpsError::DestinationExists {
            path: PathBuf::from("a"),
        };
        assert_eq!(exists.reason(), "destination_exists");
        assert_eq!(
            FsOpsError::Cancelled { operation: "hash" }.reason(),
            "cancelled"
        );
    }
}
