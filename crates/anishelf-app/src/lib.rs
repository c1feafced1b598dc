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

//! Anishelf application wiring.
//!
//! Layout: `bootstrap.rs` (service wiring), `pipeline/` (stage graph and run
//! lifecycle), `scan.rs` (source discovery), `error.rs` (application errors).

/// Application bootstrap.
pub mod bootstrap;
/// Application and run errors.
pub mod error;
/// Staged file processing.
pub mod pipeline;
/// Source discovery.
pub mod scan;

pub use bootstrap::{RunOptions, run_app};
pub use error::{AppError, AppResult, PipelineError, PipelineResult};
pub use pipeline::{ItemState, Pipeline, PipelineDeps, RunSummary};
