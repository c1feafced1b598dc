//! Source discovery.

use std::path::{Path, PathBuf};

use anishelf_config::ScanConfig;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Expand the configured sources into the files to process.
///
/// Sources that are not directories are kept verbatim, so missing files still show
/// up as failed items. Directories contribute files whose extension is in
/// `config.extensions`, compared case-insensitively. The result is sorted and free of
/// duplicates.
#[must_use]
pub fn discover(config: &ScanConfig) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for source in &config.sources {
        if source.is_dir() {
            walk(source, config, &mut found);
        } else {
            found.push(source.clone());
        }
    }
    found.sort();
    found.dedup();
    debug!(files = found.len(), "discovered source files");
    found
}

fn walk(root: &Path, config: &ScanConfig, found: &mut Vec<PathBuf>) {
    let depth = if config.recursive { usize::MAX } else { 1 };
    for entry in WalkDir::new(root).min_depth(1).max_depth(depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && has_media_extension(entry.path(), &config.extensions) {
            found.push(entry.into_path());
        }
    }
}

fn has_media_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}
