//! Event payloads published by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to each published event.
pub type EventId = u64;

/// Default size of the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Domain events surfaced while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A path entered the pipeline.
    ItemQueued {
        /// Pipeline item identifier.
        item_id: Uuid,
        /// Source path.
        path: String,
    },
    /// An item was handed to a stage.
    StageEntered {
        /// Pipeline item identifier.
        item_id: Uuid,
        /// Stage name.
        stage: String,
    },
    /// Bytes of an item whose chunk digests completed.
    HashProgress {
        /// Pipeline item identifier.
        item_id: Uuid,
        /// Cumulative hashed bytes.
        bytes_hashed: u64,
        /// File size.
        bytes_total: u64,
    },
    /// An item reached `Renamed`.
    ItemRenamed {
        /// Pipeline item identifier.
        item_id: Uuid,
        /// Original path.
        source: String,
        /// Final path.
        destination: String,
    },
    /// An item reached `Failed`.
    ItemFailed {
        /// Pipeline item identifier.
        item_id: Uuid,
        /// Source path.
        path: String,
        /// Last non-terminal state.
        state: String,
        /// Failure reason.
        reason: String,
    },
    /// The run drained.
    RunCompleted {
        /// Items that reached a terminal state.
        processed: u64,
        /// Items renamed.
        renamed: u64,
        /// Items failed, including skipped ones.
        failed: u64,
        /// Items skipped by the cooldown filter.
        skipped: u64,
    },
    /// Set of degraded components changed.
    HealthChanged {
        /// Components currently degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ItemQueued { .. } => "item_queued",
            Self::StageEntered { .. } => "stage_entered",
            Self::HashProgress { .. } => "hash_progress",
            Self::ItemRenamed { .. } => "item_renamed",
            Self::ItemFailed { .. } => "item_failed",
            Self::RunCompleted { .. } => "run_completed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Event plus its identifier and emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: Event,
}
