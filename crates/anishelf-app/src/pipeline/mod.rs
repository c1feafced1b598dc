//! Staged processing of local files: fetch, hash, cooldown, search, resolution and
//! rename, with a discard sink for everything that leaves the healthy path.

pub mod graph;
pub mod item;
pub mod orchestrator;
mod stages;
pub mod state;
pub mod summary;

pub use graph::{EDGES, StageId, route};
pub use item::PipelineItem;
pub use orchestrator::{Pipeline, PipelineDeps};
pub use state::ItemState;
pub use summary::{ItemReport, RunSummary};
