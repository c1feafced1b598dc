//! Run totals.

use std::path::PathBuf;

use uuid::Uuid;

use super::item::PipelineItem;
use super::state::ItemState;

/// Final view of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Item identifier.
    pub id: Uuid,
    /// Path the item entered with.
    pub source: PathBuf,
    /// Destination when renamed or planned.
    pub destination: Option<PathBuf>,
    /// Every state visited.
    pub trail: Vec<ItemState>,
    /// Failure reason.
    pub reason: Option<String>,
}

impl ItemReport {
    /// Terminal state of the item.
    #[must_use]
    pub fn outcome(&self) -> Option<ItemState> {
        self.trail.last().copied()
    }
}

/// Totals for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items that reached a terminal state.
    pub processed: u64,
    /// Items renamed.
    pub renamed: u64,
    /// Items failed, including skipped ones.
    pub failed: u64,
    /// Items dropped by the cooldown filter.
    pub skipped: u64,
    /// Per-item reports in completion order.
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    pub(crate) fn record(&mut self, item: &PipelineItem) {
        self.processed += 1;
        match item.state() {
            ItemState::Renamed => self.renamed += 1,
            _ => self.failed += 1,
        }
        if item.trail().contains(&ItemState::CoolingDown) {
            self.skipped += 1;
        }
        self.items.push(ItemReport {
            id: item.id,
            source: item.path.clone(),
            destination: item.destination.clone(),
            trail: item.trail().to_vec(),
            reason: item.reason().map(str::to_string),
        });
    }

    /// Report for the item that entered with `source`.
    #[must_use]
    pub fn item(&self, source: &std::path::Path) -> Option<&ItemReport> {
        self.items.iter().find(|report| report.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_items_count_as_failed() {
        let mut summary = RunSummary::default();

        let mut cooled = PipelineItem::new("/a.mkv");
        cooled.advance(ItemState::CoolingDown);
        cooled.fail();
        summary.record(&cooled);

        let mut renamed = PipelineItem::new("/b.mkv");
        renamed.advance(ItemState::Ready);
        renamed.advance(ItemState::Renamed);
        summary.record(&renamed);

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.renamed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        let report = summary.item(std::path::Path::new("/a.mkv"));
        assert_eq!(report.and_then(ItemReport::outcome), Some(ItemState::Failed));
        assert_eq!(report.and_then(|r| r.reason.as_deref()), Some("cooling_down"));
    }
}
