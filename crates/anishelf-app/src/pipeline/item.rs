//! The unit of work flowing between stages.

use std::path::PathBuf;

use anishelf_protocol::{AnimeInfo, Ed2kHash, FileInfo, Resolution};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use super::state::ItemState;

/// One local file and everything learned about it so far.
///
/// Exactly one stage owns an item at a time; it moves through channels by value.
#[derive(Debug, Clone)]
pub struct PipelineItem {
    /// Run-unique identifier.
    pub id: Uuid,
    /// Current location.
    pub path: PathBuf,
    /// Size in bytes, known after fetch.
    pub size: u64,
    /// Local fingerprint.
    pub ed2k: Option<Ed2kHash>,
    /// Last remote lookup, from the local store.
    pub last_lookup_at: Option<DateTime<Utc>>,
    /// Merged file record.
    pub file: FileInfo,
    /// Merged title/episode record.
    pub anime: AnimeInfo,
    /// Resolved frame size.
    pub resolution: Option<Resolution>,
    /// Final location once renamed or planned.
    pub destination: Option<PathBuf>,
    reason: Option<String>,
    state: ItemState,
    trail: Vec<ItemState>,
}

impl PipelineItem {
    /// New item in the `Nominal` state.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            size: 0,
            ed2k: None,
            last_lookup_at: None,
            file: FileInfo::default(),
            anime: AnimeInfo::default(),
            resolution: None,
            destination: None,
            reason: None,
            state: ItemState::Nominal,
            trail: vec![ItemState::Nominal],
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ItemState {
        self.state
    }

    /// Every state the item has been in, oldest first.
    #[must_use]
    pub fn trail(&self) -> &[ItemState] {
        &self.trail
    }

    /// Why the item left the healthy path, if it did.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Move to `next`, recording it in the trail.
    pub fn advance(&mut self, next: ItemState) {
        if !self.state.can_transition(next) {
            warn!(
                item_id = %self.id,
                from = %self.state,
                to = %next,
                "unexpected state transition"
            );
        }
        self.state = next;
        self.trail.push(next);
    }

    /// Move to an unhealthy `next` and remember why.
    pub fn advance_with_reason(&mut self, next: ItemState, reason: impl Into<String>) {
        self.reason = Some(reason.into());
        self.advance(next);
    }

    /// Drop the item with `reason`.
    pub fn discard(&mut self, reason: impl Into<String>) {
        self.advance_with_reason(ItemState::Discarded, reason);
    }

    /// Finalise as `Failed`, keeping the earliest recorded reason.
    pub fn fail(&mut self) {
        if self.reason.is_none() {
            self.reason = Some(self.state.as_str().to_string());
        }
        self.advance(ItemState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_records_every_state() {
        let mut item = PipelineItem::new("/a.mkv");
        item.advance(ItemState::NeedsHash);
        item.advance(ItemState::Hashed);
        item.advance(ItemState::Ready);
        item.advance(ItemState::Renamed);
        assert_eq!(
            item.trail(),
            &[
                ItemState::Nominal,
                ItemState::NeedsHash,
                ItemState::Hashed,
                ItemState::Ready,
                ItemState::Renamed
            ]
        );
        assert_eq!(item.reason(), None);
    }

    #[test]
    fn fail_defaults_reason_to_last_state() {
        let mut item = PipelineItem::new("/a.mkv");
        item.advance(ItemState::CoolingDown);
        item.fail();
        assert_eq!(item.state(), ItemState::Failed);
        assert_eq!(item.reason(), Some("cooling_down"));

        let mut cancelled = PipelineItem::new("/b.mkv");
        cancelled.discard("cancelled");
        cancelled.fail();
        assert_eq!(cancelled.reason(), Some("cancelled"));
    }
}
