//! Stage registry and routing.

use std::fmt;

use super::item::PipelineItem;
use super::state::ItemState;

/// A node in the stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    /// Stat the file and load its local record.
    Fetch,
    /// Compute the ed2k fingerprint.
    Hash,
    /// Drop items looked up too recently.
    Cooldown,
    /// Remote lookup.
    Search,
    /// Parse the frame size.
    Resolution,
    /// Place the file at its destination.
    Rename,
    /// Finalise unhealthy items as failed.
    Discard,
    /// Run collector; every item ends here exactly once.
    Complete,
}

impl StageId {
    /// Stages that own a task, in topological order.
    pub const TASKS: [Self; 7] = [
        Self::Fetch,
        Self::Hash,
        Self::Cooldown,
        Self::Search,
        Self::Resolution,
        Self::Rename,
        Self::Discard,
    ];

    /// Lowercase label used in logs, events and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Hash => "hash",
            Self::Cooldown => "cooldown",
            Self::Search => "search",
            Self::Resolution => "resolution",
            Self::Rename => "rename",
            Self::Discard => "discard",
            Self::Complete => "complete",
        }
    }

    /// Stages this stage may hand items to.
    #[must_use]
    pub fn successors(self) -> &'static [Self] {
        for (stage, targets) in EDGES {
            if *stage == self {
                return targets;
            }
        }
        &[]
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every edge of the stage graph.
pub const EDGES: &[(StageId, &[StageId])] = &[
    (StageId::Fetch, &[StageId::Hash, StageId::Cooldown, StageId::Discard]),
    (StageId::Hash, &[StageId::Cooldown, StageId::Discard]),
    (StageId::Cooldown, &[StageId::Search, StageId::Discard]),
    (
        StageId::Search,
        &[StageId::Resolution, StageId::Rename, StageId::Discard],
    ),
    (StageId::Resolution, &[StageId::Rename, StageId::Discard]),
    (StageId::Rename, &[StageId::Complete, StageId::Discard]),
    (StageId::Discard, &[StageId::Complete]),
];

/// Destination of `item` after `stage` processed it.
#[must_use]
pub const fn route(stage: StageId, item: &PipelineItem) -> StageId {
    let state = item.state();
    if state.is_terminal() {
        return StageId::Complete;
    }
    if !state.is_healthy() {
        return StageId::Discard;
    }
    match stage {
        StageId::Fetch => match state {
            ItemState::NeedsHash => StageId::Hash,
            _ => StageId::Cooldown,
        },
        StageId::Hash => StageId::Cooldown,
        StageId::Cooldown => StageId::Search,
        StageId::Search => match state {
            ItemState::Ready => StageId::Rename,
            _ => StageId::Resolution,
        },
        StageId::Resolution => StageId::Rename,
        StageId::Rename | StageId::Discard | StageId::Complete => StageId::Complete,
    }
}
