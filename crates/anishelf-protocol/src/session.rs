//! Lookup session interface implemented by transports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::mask::{AnimeMask, FileMask};
use crate::record::Ed2kHash;

/// Result alias for session calls.
pub type LookupResult<T> = Result<T, LookupError>;

/// Login credentials for the remote database.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOutcome {
    /// Whether the server accepted the login.
    pub success: bool,
    /// Whether the server advertises a newer client version.
    pub has_new_version: bool,
}

/// A single by-hash lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// File size in bytes.
    pub size: u64,
    /// Local ed2k fingerprint.
    pub ed2k: Ed2kHash,
    /// Per-file fields to return.
    pub file_mask: FileMask,
    /// Per-title fields to return.
    pub anime_mask: AnimeMask,
}

/// Server answer to a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupReply {
    /// Raw pipe-delimited record line.
    Found(String),
    /// The server has no file with that fingerprint.
    NotFound,
}

/// Serialized session to the remote database.
///
/// Implementations own connection setup, keep-alive and rate limiting. The pipeline
/// never issues more concurrent lookups than [`LookupSession::max_in_flight`].
#[async_trait]
pub trait LookupSession: Send + Sync {
    /// Establish the underlying connection.
    async fn connect(&self) -> LookupResult<()> {
        Ok(())
    }

    /// Log in with the supplied credentials.
    async fn authenticate(&self, credentials: &Credentials) -> LookupResult<AuthOutcome>;

    /// Look up a file by size and fingerprint.
    async fn lookup_by_hash(&self, request: &LookupRequest) -> LookupResult<LookupReply>;

    /// Number of lookups the session accepts concurrently.
    fn max_in_flight(&self) -> usize {
        1
    }
}
