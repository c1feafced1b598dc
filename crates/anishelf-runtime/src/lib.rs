#![forbid(unsafe_code)]
#![deny(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Persistence of per-file fingerprints and lookup times between runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anishelf_protocol::{Ed2kHash, Resolution};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

const DOCUMENT_VERSION: u32 = 1;

/// What the pipeline remembers about a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileRecord {
    /// Location the record was written for.
    pub path: PathBuf,
    /// Size in bytes when fingerprinted.
    pub size: u64,
    /// Cached fingerprint.
    pub ed2k: Option<Ed2kHash>,
    /// Remote file id from the last successful lookup.
    pub file_id: Option<i64>,
    /// Frame size from the last successful lookup.
    pub resolution: Option<Resolution>,
    /// When the file was last looked up remotely.
    pub last_lookup_at: Option<DateTime<Utc>>,
}

impl LocalFileRecord {
    /// Fresh record with nothing cached.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            ed2k: None,
            file_id: None,
            resolution: None,
            last_lookup_at: None,
        }
    }
}

/// Storage seam for [`LocalFileRecord`]s keyed by path.
#[async_trait]
pub trait LocalFileStore: Send + Sync {
    /// Record stored for `path`.
    async fn find(&self, path: &Path) -> Result<Option<LocalFileRecord>>;

    /// Insert or replace the record for `record.path`.
    async fn upsert(&self, record: LocalFileRecord) -> Result<()>;

    /// Drop the record for `path`, returning whether one existed.
    async fn remove(&self, path: &Path) -> Result<bool>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<PathBuf, LocalFileRecord>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl LocalFileStore for MemoryStore {
    async fn find(&self, path: &Path) -> Result<Option<LocalFileRecord>> {
        Ok(self.records.read().await.get(path).cloned())
    }

    async fn upsert(&self, record: LocalFileRecord) -> Result<()> {
        self.records.write().await.insert(record.path.clone(), record);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        Ok(self.records.write().await.remove(path).is_some())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    records: Vec<LocalFileRecord>,
}

/// Store persisted as a single JSON document, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<HashMap<PathBuf, LocalFileRecord>>,
}

impl JsonFileStore {
    /// Open the document at `path`, starting empty when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or decoded.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let document: StoreDocument = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to decode store document {}", path.display()))?;
                anyhow::ensure!(
                    document.version == DOCUMENT_VERSION,
                    "unsupported store document version {}",
                    document.version
                );
                document
                    .records
                    .into_iter()
                    .map(|record| (record.path.clone(), record))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read store document {}", path.display()));
            }
        };
        debug!(path = %path.display(), records = records.len(), "opened local file store");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &HashMap<PathBuf, LocalFileRecord>) -> Result<()> {
        let mut ordered: Vec<LocalFileRecord> = records.values().cloned().collect();
        ordered.sort_by(|left, right| left.path.cmp(&right.path));
        let document = StoreDocument {
            version: DOCUMENT_VERSION,
            records: ordered,
        };
        let body = serde_json::to_vec_pretty(&document).context("failed to encode store document")?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .with_context(|| format!("failed to write store staging file {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("failed to replace store document {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl LocalFileStore for JsonFileStore {
    async fn find(&self, path: &Path) -> Result<Option<LocalFileRecord>> {
        Ok(self.records.lock().await.get(path).cloned())
    }

    async fn upsert(&self, record: LocalFileRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        records.insert(record.path.clone(), record);
        self.persist(&records).await
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        let mut records = self.records.lock().await;
        let removed = records.remove(path).is_some();
        if removed {
            self.persist(&records).await?;
        }
        Ok(removed)
    }
}
