//! Typed configuration document.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::ConfigError;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Remote session settings.
    pub session: SessionConfig,
    /// Stage sizing and cooldown.
    pub pipeline: PipelineConfig,
    /// Rename template and mode.
    pub rename: RenameConfig,
    /// Source discovery.
    pub scan: ScanConfig,
    /// Local file record persistence.
    pub store: StoreConfig,
    /// Logging output.
    pub logging: LoggingSettings,
}

/// Remote session settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Recorded replies answering lookups offline.
    pub replay_path: Option<PathBuf>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("replay_path", &self.replay_path)
            .finish()
    }
}

/// Stage sizing and cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Bounded queue size between stages.
    pub queue_capacity: usize,
    /// Fetch stage workers.
    pub fetch_workers: usize,
    /// Hash stage workers.
    pub hash_workers: usize,
    /// Chunk digest workers per hashed file.
    pub hash_chunk_workers: usize,
    /// Search stage workers, further capped by the session.
    pub search_workers: usize,
    /// Resolution stage workers.
    pub resolution_workers: usize,
    /// Rename stage workers.
    pub rename_workers: usize,
    /// Minimum seconds between lookups of the same file.
    pub cooldown_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::QUEUE_CAPACITY,
            fetch_workers: defaults::FETCH_WORKERS,
            hash_workers: defaults::HASH_WORKERS,
            hash_chunk_workers: defaults::HASH_CHUNK_WORKERS,
            search_workers: defaults::SEARCH_WORKERS,
            resolution_workers: defaults::RESOLUTION_WORKERS,
            rename_workers: defaults::RENAME_WORKERS,
            cooldown_secs: defaults::COOLDOWN_SECS,
        }
    }
}

impl PipelineConfig {
    /// Cooldown window as a duration.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// How a renamed file reaches its destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameMode {
    /// Relocate the source.
    #[default]
    Move,
    /// Leave the source and write a copy.
    Copy,
    /// Leave the source and create a hard link.
    Hardlink,
}

impl RenameMode {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Copy => "copy",
            Self::Hardlink => "hardlink",
        }
    }
}

impl FromStr for RenameMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "move" => Ok(Self::Move),
            "copy" => Ok(Self::Copy),
            "hardlink" => Ok(Self::Hardlink),
            other => Err(ConfigError::invalid(
                "rename",
                "mode",
                Some(other.to_string()),
                "unknown_mode",
            )),
        }
    }
}

/// Rename template and mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenameConfig {
    /// Destination template relative to `target_root`.
    pub template: String,
    /// Library root.
    pub target_root: PathBuf,
    /// Move, copy or hardlink.
    pub mode: RenameMode,
    /// Plan renames without touching the filesystem.
    pub dry_run: bool,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            template: defaults::RENAME_TEMPLATE.to_string(),
            target_root: PathBuf::from(defaults::TARGET_ROOT),
            mode: RenameMode::default(),
            dry_run: false,
        }
    }
}

/// Source discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Files or directories to process.
    pub sources: Vec<PathBuf>,
    /// Lowercase extensions, without a leading dot, picked up in directories.
    pub extensions: Vec<String>,
    /// Descend into subdirectories.
    pub recursive: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            extensions: defaults::SCAN_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            recursive: true,
        }
    }
}

/// Local file record persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// JSON document path; records stay in memory when unset.
    pub path: Option<PathBuf>,
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Level or filter directive.
    pub level: String,
    /// `json` or `pretty`; inferred from the build when unset.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}
