#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Filesystem work for the anishelf pipeline.
//!
//! Layout: `hasher.rs` (chunked ed2k fingerprint), `template.rs` (destination path
//! templates), `rename.rs` (all-or-nothing move/copy/hardlink), `error.rs`.

pub mod error;
pub mod hasher;
pub mod rename;
pub mod template;

pub use error::{FsOpsError, FsOpsResult};
pub use hasher::{ContentHasher, ED2K_CHUNK_SIZE, HashProgress};
pub use rename::{FsRenamer, RenameOutcome};
pub use template::{PathTemplate, Placeholder, RenderContext};
