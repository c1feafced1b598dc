//! Item state machine.

use std::fmt;

/// Where an item stands in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Freshly enqueued, or carried through a stage that found nothing wrong.
    Nominal,
    /// No usable cached fingerprint.
    NeedsHash,
    /// Fingerprint computed in this run.
    Hashed,
    /// Looked up too recently.
    CoolingDown,
    /// The remote database does not know the file.
    NotFoundRemotely,
    /// The lookup failed for this item.
    SearchError,
    /// Metadata present, frame size still to be resolved.
    ResolutionPending,
    /// Ready to rename.
    Ready,
    /// Dropped before completion.
    Discarded,
    /// Placed at its destination.
    Renamed,
    /// Finished without being placed.
    Failed,
}

impl ItemState {
    /// Lowercase label used in logs, events and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::NeedsHash => "needs_hash",
            Self::Hashed => "hashed",
            Self::CoolingDown => "cooling_down",
            Self::NotFoundRemotely => "not_found_remotely",
            Self::SearchError => "search_error",
            Self::ResolutionPending => "resolution_pending",
            Self::Ready => "ready",
            Self::Discarded => "discarded",
            Self::Renamed => "renamed",
            Self::Failed => "failed",
        }
    }

    /// States in which an item keeps moving forward.
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(
            self,
            Self::Nominal | Self::NeedsHash | Self::Hashed | Self::ResolutionPending | Self::Ready
        )
    }

    /// States with no outgoing transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Renamed | Self::Failed)
    }

    /// Whether the machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        match (self, next) {
            (Self::Nominal, Self::NeedsHash)
            | (Self::NeedsHash, Self::Hashed)
            | (
                Self::Nominal | Self::Hashed,
                Self::CoolingDown
                | Self::NotFoundRemotely
                | Self::SearchError
                | Self::ResolutionPending
                | Self::Ready,
            )
            | (Self::ResolutionPending, Self::Ready)
            | (Self::Ready, Self::Renamed) => true,
            (current, Self::Discarded) => current.is_healthy(),
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
