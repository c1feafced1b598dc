//! Default values for configuration fields.
//!
//! # Design
//! - Keep every default in one place so documentation and serde defaults agree.

/// Bounded queue size between pipeline stages.
pub const QUEUE_CAPACITY: usize = 64;
/// Concurrent stat/store reads in the fetch stage.
pub const FETCH_WORKERS: usize = 4;
/// Files hashed concurrently.
pub const HASH_WORKERS: usize = 2;
/// Chunk digests computed concurrently per file.
pub const HASH_CHUNK_WORKERS: usize = 4;
/// Concurrent lookups requested from the session.
pub const SEARCH_WORKERS: usize = 1;
/// Concurrent resolution enrichment tasks.
pub const RESOLUTION_WORKERS: usize = 2;
/// Concurrent renames.
pub const RENAME_WORKERS: usize = 2;
/// Minimum time between remote lookups of the same file.
pub const COOLDOWN_SECS: u64 = 24 * 60 * 60;
/// Default rename template.
pub const RENAME_TEMPLATE: &str =
    "{romaji_name}/{romaji_name} - {episode_number} [{group_short_name}].{extension}";
/// Default library root for renamed files.
pub const TARGET_ROOT: &str = "library";
/// Video extensions picked up when scanning directories.
pub const SCAN_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "ogm", "webm", "m4v"];
/// Default log level.
pub const LOG_LEVEL: &str = "info";
