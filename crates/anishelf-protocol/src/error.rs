//! # Design
//!
//! - Structured, constant-message errors for the mask codec, reply parser and lookup seam.
//! - Carry the offending input as context fields rather than formatting it into messages.
//! - Session-level failures are distinguished from per-request failures so callers can
//!   decide between aborting a run and failing a single item.

use std::error::Error;

use thiserror::Error;

/// Result alias for mask codec operations.
pub type MaskResult<T> = Result<T, MaskError>;

/// Result alias for reply parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors produced while decoding mask hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    /// Input was not an even-length hexadecimal string.
    #[error("mask hex is malformed")]
    Format {
        /// Offending input.
        value: String,
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// Decoded byte count was zero or exceeded the layout's segment count.
    #[error("mask segment count is invalid")]
    InvalidMask {
        /// Layout the mask was decoded for.
        layout: &'static str,
        /// Number of bytes supplied.
        segments: usize,
        /// Maximum number of segments the layout accepts.
        max: usize,
    },
}

/// Errors produced while turning a raw reply into records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The reply violated the wire contract (bad id, missing tokens).
    #[error("malformed lookup response")]
    MalformedResponse {
        /// Machine-readable reason.
        reason: &'static str,
        /// Zero-based token index where the violation was detected.
        index: usize,
        /// Offending token when available.
        token: Option<String>,
    },
    /// A set mask bit has no field mapping in the layout table.
    #[error("mask flag has no field mapping")]
    UnmappedFlag {
        /// Layout that owns the bit.
        layout: &'static str,
        /// Zero-based segment index.
        segment: usize,
        /// Bit value within the segment.
        bit: u8,
    },
}

/// Errors produced when merging partial records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The records describe different remote entities.
    #[error("record identities differ")]
    IdentityMismatch {
        /// Record kind being merged.
        record: &'static str,
        /// Identity of the receiver.
        left: Option<i64>,
        /// Identity of the argument.
        right: Option<i64>,
    },
}

/// Errors surfaced by a lookup session.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The session itself is unusable (refused connection, rejected login, lost link).
    #[error("lookup session failure")]
    Session {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A single request failed while the session stays usable.
    #[error("lookup request failure")]
    Request {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl LookupError {
    /// Build a session-level failure.
    pub fn session(operation: &'static str, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Session {
            operation,
            source: source.into(),
        }
    }

    /// Build a request-level failure.
    pub fn request(operation: &'static str, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Request {
            operation,
            source: source.into(),
        }
    }

    /// Whether the failure invalidates the whole session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Session { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_error_classifies_fatality() {
        let session = LookupError::session("connect", "refused");
        let request = LookupError::request("lookup_by_hash", "timeout");
        assert!(session.is_fatal());
        assert!(!request.is_fatal());
        assert!(session.source().is_some());
        assert_eq!(request.to_string(), "lookup request failure");
    }

    #[test]
    fn mask_error_messages_are_constant() {
        let err = MaskError::Format {
            value: "abc".into(),
            reason: "odd_length",
        };
        assert_eq!(err.to_string(), "mask hex is malformed");
    }
}
