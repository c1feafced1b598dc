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

//! File-backed configuration for the anishelf pipeline.
//!
//! Layout: `model.rs` (typed config document), `defaults.rs` (default values),
//! `loader.rs` (JSON file and environment overrides), `validate.rs` (field checks).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_PREFIX, apply_env_overrides, load, load_with_env};
pub use model::{
    AppConfig, LoggingSettings, PipelineConfig, RenameConfig, RenameMode, ScanConfig,
    SessionConfig, StoreConfig,
};
pub use validate::validate;
