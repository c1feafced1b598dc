//! All-or-nothing placement of a file at its rendered destination.
//!
//! A rename either leaves the destination fully written (and, for moves, the source
//! gone) or leaves the filesystem as it was. Every commit goes through `link(2)`, which
//! refuses an existing destination atomically, so concurrent placements onto one path
//! cannot replace each other. Copies land in a hidden partial file next to the
//! destination and are linked into place once complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anishelf_config::RenameMode;
use tracing::{debug, info, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::template::{PathTemplate, RenderContext};

const PARTIAL_SUFFIX: &str = "anishelf-partial";

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Result of a single rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The file now lives at `destination`.
    Completed {
        /// Final location.
        destination: PathBuf,
        /// Mode used to get it there.
        mode: RenameMode,
    },
    /// Source and destination were already the same path.
    Unchanged {
        /// Shared location.
        destination: PathBuf,
    },
    /// Dry run; nothing was touched.
    Planned {
        /// Location the file would occupy.
        destination: PathBuf,
    },
}

impl RenameOutcome {
    /// Destination regardless of outcome.
    #[must_use]
    pub fn destination(&self) -> &Path {
        match self {
            Self::Completed { destination, .. }
            | Self::Unchanged { destination }
            | Self::Planned { destination } => destination,
        }
    }
}

/// Places files under a library root according to a template.
#[derive(Debug, Clone)]
pub struct FsRenamer {
    target_root: PathBuf,
    mode: RenameMode,
    dry_run: bool,
}

impl FsRenamer {
    /// Renamer writing beneath `target_root`.
    #[must_use]
    pub fn new(target_root: impl Into<PathBuf>, mode: RenameMode) -> Self {
        Self {
            target_root: target_root.into(),
            mode,
            dry_run: false,
        }
    }

    /// Plan without touching the filesystem.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Configured mode.
    #[must_use]
    pub const fn mode(&self) -> RenameMode {
        self.mode
    }

    /// Absolute destination for an item.
    ///
    /// # Errors
    ///
    /// Propagates template rendering failures.
    pub fn plan(&self, template: &PathTemplate, ctx: &RenderContext<'_>) -> FsOpsResult<PathBuf> {
        Ok(self.target_root.join(template.render(ctx)?))
    }

    /// Place `source` at `destination` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::DestinationExists`] when another file already occupies the
    /// destination, IO errors from the underlying operations, and a worker error if the
    /// blocking task fails.
    pub async fn rename(&self, source: &Path, destination: &Path) -> FsOpsResult<RenameOutcome> {
        if self.dry_run {
            info!(
                source = %source.display(),
                destination = %destination.display(),
                mode = self.mode.as_str(),
                "dry run rename"
            );
            return Ok(RenameOutcome::Planned {
                destination: destination.to_path_buf(),
            });
        }

        let mode = self.mode;
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || place(&source, &destination, mode))
            .await
            .map_err(|source| FsOpsError::Worker {
                operation: "rename",
                source,
            })?
    }
}

fn place(source: &Path, destination: &Path, mode: RenameMode) -> FsOpsResult<RenameOutcome> {
    if same_file(source, destination) {
        debug!(path = %source.display(), "source already at destination");
        return Ok(RenameOutcome::Unchanged {
            destination: destination.to_path_buf(),
        });
    }
    if destination.symlink_metadata().is_ok() {
        return Err(FsOpsError::DestinationExists {
            path: destination.to_path_buf(),
        });
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|source_err| FsOpsError::io("rename.create_parent", parent, source_err))?;
    }

    match mode {
        RenameMode::Move => move_file(source, destination)?,
        RenameMode::Copy => copy_file(source, destination)?,
        RenameMode::Hardlink => link_new(source, destination, "rename.hard_link")?,
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        mode = mode.as_str(),
        "file placed"
    );
    Ok(RenameOutcome::Completed {
        destination: destination.to_path_buf(),
        mode,
    })
}

fn move_file(source: &Path, destination: &Path) -> FsOpsResult<()> {
    match fs::hard_link(source, destination) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(FsOpsError::DestinationExists {
                path: destination.to_path_buf(),
            });
        }
        Err(link_err) => {
            debug!(
                source = %source.display(),
                error = %link_err,
                "link failed, falling back to copy"
            );
            copy_file(source, destination)?;
        }
    }
    if let Err(remove_err) = fs::remove_file(source) {
        if let Err(rollback_err) = fs::remove_file(destination) {
            warn!(
                path = %destination.display(),
                error = %rollback_err,
                "failed to roll back placed file"
            );
        }
        return Err(FsOpsError::io("rename.remove_source", source, remove_err));
    }
    Ok(())
}

fn copy_file(source: &Path, destination: &Path) -> FsOpsResult<()> {
    let partial = partial_path(destination);
    if let Err(copy_err) = fs::copy(source, &partial) {
        discard(&partial);
        return Err(FsOpsError::io("rename.copy", source, copy_err));
    }
    let committed = link_new(&partial, destination, "rename.commit");
    discard(&partial);
    committed
}

/// Link `source` at `destination`, failing if anything already lives there.
fn link_new(source: &Path, destination: &Path, operation: &'static str) -> FsOpsResult<()> {
    fs::hard_link(source, destination).map_err(|err| {
        if err.kind() == io::ErrorKind::AlreadyExists {
            FsOpsError::DestinationExists {
                path: destination.to_path_buf(),
            }
        } else {
            FsOpsError::io(operation, destination, err)
        }
    })
}

fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
    destination.with_file_name(format!(".{name}.{}.{seq}.{PARTIAL_SUFFIX}", std::process::id()))
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %err, "failed to remove partial file");
    }
}

fn same_file(source: &Path, destination: &Path) -> bool {
    if source == destination {
        return true;
    }
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
