//! What each stage does to an item.
//!
//! Stages never return errors: every failure becomes a state on the item, and the
//! router sends unhealthy items to the discard sink. The only run-level failure is a
//! lost session, which is parked here and surfaced once the run drains.

use std::sync::{Arc, Mutex, PoisonError};

use anishelf_events::{Event, EventBus};
use anishelf_fsops::{ContentHasher, FsRenamer, HashProgress, PathTemplate, RenameOutcome, RenderContext};
use anishelf_protocol::{
    AnimeMask, FileMask, LookupError, LookupReply, LookupRequest, LookupSession, ParseError, Resolution,
    ResponseParser,
};
use anishelf_runtime::{LocalFileRecord, LocalFileStore};
use anishelf_telemetry::Metrics;
use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::graph::StageId;
use super::item::PipelineItem;
use super::state::ItemState;

/// Shared, read-mostly state every stage worker sees.
pub(crate) struct StageContext {
    pub(crate) session: Arc<dyn LookupSession>,
    pub(crate) store: Arc<dyn LocalFileStore>,
    pub(crate) events: EventBus,
    pub(crate) metrics: Metrics,
    pub(crate) hasher: ContentHasher,
    pub(crate) renamer: FsRenamer,
    pub(crate) template: PathTemplate,
    pub(crate) lookup_plan: Vec<(FileMask, AnimeMask)>,
    pub(crate) cooldown: TimeDelta,
    pub(crate) cancel: CancellationToken,
    pub(crate) fatal: Mutex<Option<LookupError>>,
}

impl StageContext {
    pub(crate) fn publish(&self, event: Event) {
        publish(&self.events, &self.metrics, event);
    }

    pub(crate) fn take_fatal(&self) -> Option<LookupError> {
        self.fatal.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub(crate) async fn process(&self, stage: StageId, mut item: PipelineItem) -> PipelineItem {
        self.publish(Event::StageEntered {
            item_id: item.id,
            stage: stage.as_str().to_string(),
        });
        match stage {
            StageId::Fetch => self.fetch(&mut item).await,
            StageId::Hash => self.hash(&mut item).await,
            StageId::Cooldown => self.cooldown(&mut item),
            StageId::Search => self.search(&mut item).await,
            StageId::Resolution => self.resolve(&mut item).await,
            StageId::Rename => self.rename(&mut item).await,
            StageId::Discard => self.discard(&mut item),
            StageId::Complete => {}
        }
        self.metrics
            .inc_pipeline_item(stage.as_str(), item.state().as_str());
        item
    }

    async fn fetch(&self, item: &mut PipelineItem) {
        let metadata = match tokio::fs::metadata(&item.path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(item_id = %item.id, path = %item.path.display(), error = %err, "stat failed");
                item.discard("stat_failed");
                return;
            }
        };
        if !metadata.is_file() {
            item.discard("not_a_file");
            return;
        }
        item.size = metadata.len();

        match self.store.find(&item.path).await {
            Ok(Some(record)) if record.size == item.size && record.ed2k.is_some() => {
                item.ed2k = record.ed2k;
                item.last_lookup_at = record.last_lookup_at;
                item.resolution = record.resolution;
                debug!(item_id = %item.id, "using cached fingerprint");
            }
            Ok(_) => item.advance(ItemState::NeedsHash),
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "local store lookup failed");
                item.discard("store_unavailable");
            }
        }
    }

    async fn hash(&self, item: &mut PipelineItem) {
        let events = self.events.clone();
        let metrics = self.metrics.clone();
        let item_id = item.id;
        let bytes_total = item.size;
        let progress = HashProgress::new().with_listener(move |bytes_hashed| {
            publish(
                &events,
                &metrics,
                Event::HashProgress {
                    item_id,
                    bytes_hashed,
                    bytes_total,
                },
            );
        });

        match self.hasher.hash_file(&item.path, &self.cancel, &progress).await {
            Ok(Some(hash)) => {
                self.metrics.add_bytes_hashed(progress.bytes());
                item.ed2k = Some(hash);
                item.advance(ItemState::Hashed);
                self.persist(item).await;
            }
            Ok(None) => item.discard("empty_file"),
            Err(err) => {
                warn!(item_id = %item.id, path = %item.path.display(), error = %err, "hashing failed");
                item.discard(err.reason());
            }
        }
    }

    fn cooldown(&self, item: &mut PipelineItem) {
        if let Some(last) = item.last_lookup_at
            && Utc::now().signed_duration_since(last) < self.cooldown
        {
            debug!(item_id = %item.id, last_lookup_at = %last, "within cooldown window");
            item.advance_with_reason(ItemState::CoolingDown, "cooling_down");
        }
    }

    async fn search(&self, item: &mut PipelineItem) {
        let Some(ed2k) = item.ed2k else {
            item.discard("missing_fingerprint");
            return;
        };

        for (file_mask, anime_mask) in &self.lookup_plan {
            let request = LookupRequest {
                size: item.size,
                ed2k,
                file_mask: *file_mask,
                anime_mask: *anime_mask,
            };
            let reply = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    item.discard("cancelled");
                    return;
                }
                reply = self.session.lookup_by_hash(&request) => reply,
            };

            let raw = match reply {
                Ok(LookupReply::Found(raw)) => {
                    self.metrics.inc_lookup("found");
                    raw
                }
                Ok(LookupReply::NotFound) => {
                    self.metrics.inc_lookup("not_found");
                    item.last_lookup_at = Some(Utc::now());
                    self.persist(item).await;
                    item.advance_with_reason(ItemState::NotFoundRemotely, "not_found_remotely");
                    return;
                }
                Err(err) => {
                    self.metrics.inc_lookup("error");
                    if err.is_fatal() {
                        self.park_fatal(err);
                        item.advance_with_reason(ItemState::SearchError, "session_lost");
                    } else {
                        warn!(item_id = %item.id, error = %err, "lookup failed");
                        item.advance_with_reason(ItemState::SearchError, "request_failed");
                    }
                    return;
                }
            };

            let parsed = match ResponseParser::parse(&raw, file_mask, anime_mask) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(item_id = %item.id, error = %err, "lookup reply rejected");
                    item.advance_with_reason(ItemState::SearchError, parse_reason(&err));
                    return;
                }
            };
            for failure in &parsed.coercion_failures {
                self.metrics.inc_coercion_failure(failure.field);
            }
            match (item.file.merge(&parsed.file), item.anime.merge(&parsed.anime)) {
                (Ok(file), Ok(anime)) => {
                    item.file = file;
                    item.anime = anime;
                }
                (Err(err), _) | (_, Err(err)) => {
                    warn!(item_id = %item.id, error = %err, "lookup passes disagree");
                    item.advance_with_reason(ItemState::SearchError, "identity_mismatch");
                    return;
                }
            }
        }

        item.last_lookup_at = Some(Utc::now());
        self.persist(item).await;
        if item.resolution.is_some() {
            item.advance(ItemState::Ready);
        } else {
            item.advance(ItemState::ResolutionPending);
        }
    }

    async fn resolve(&self, item: &mut PipelineItem) {
        match item.file.video_resolution.as_deref().map(str::parse::<Resolution>) {
            Some(Ok(resolution)) => {
                item.resolution = Some(resolution);
                self.persist(item).await;
            }
            Some(Err(err)) => {
                debug!(item_id = %item.id, value = %err.value, "unparseable resolution left unset");
            }
            None => debug!(item_id = %item.id, "record carries no resolution"),
        }
        item.advance(ItemState::Ready);
    }

    async fn rename(&self, item: &mut PipelineItem) {
        let ctx = RenderContext {
            file: &item.file,
            anime: &item.anime,
            source: &item.path,
            resolution: item.resolution,
            ed2k: item.ed2k,
        };
        let destination = match self.renamer.plan(&self.template, &ctx) {
            Ok(destination) => destination,
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "destination could not be rendered");
                item.advance_with_reason(ItemState::Failed, err.reason());
                return;
            }
        };

        match self.renamer.rename(&item.path, &destination).await {
            Ok(outcome) => {
                item.destination = Some(outcome.destination().to_path_buf());
                if let RenameOutcome::Completed { destination, mode } = &outcome {
                    self.relocate_record(item, destination, *mode).await;
                }
                item.advance(ItemState::Renamed);
                self.publish(Event::ItemRenamed {
                    item_id: item.id,
                    source: item.path.display().to_string(),
                    destination: outcome.destination().display().to_string(),
                });
            }
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "rename failed");
                item.advance_with_reason(ItemState::Failed, err.reason());
            }
        }
    }

    fn discard(&self, item: &mut PipelineItem) {
        let last = item.state();
        item.fail();
        let reason = item.reason().unwrap_or(last.as_str()).to_string();
        info!(item_id = %item.id, path = %item.path.display(), state = %last, %reason, "item failed");
        self.publish(Event::ItemFailed {
            item_id: item.id,
            path: item.path.display().to_string(),
            state: last.as_str().to_string(),
            reason,
        });
    }

    fn park_fatal(&self, err: LookupError) {
        warn!(error = %err, "lookup session lost; cancelling run");
        {
            let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
            if fatal.is_none() {
                *fatal = Some(err);
            }
        }
        if !self.cancel.is_cancelled() {
            self.publish(Event::HealthChanged {
                degraded: vec!["session".to_string()],
            });
        }
        self.cancel.cancel();
    }

    fn record_for(item: &PipelineItem) -> LocalFileRecord {
        LocalFileRecord {
            path: item.path.clone(),
            size: item.size,
            ed2k: item.ed2k,
            file_id: item.file.file_id,
            resolution: item.resolution,
            last_lookup_at: item.last_lookup_at,
        }
    }

    async fn persist(&self, item: &PipelineItem) {
        if let Err(err) = self.store.upsert(Self::record_for(item)).await {
            warn!(item_id = %item.id, error = %err, "failed to persist local record");
        }
    }

    async fn relocate_record(
        &self,
        item: &PipelineItem,
        destination: &std::path::Path,
        mode: anishelf_config::RenameMode,
    ) {
        let mut record = Self::record_for(item);
        record.path = destination.to_path_buf();
        if let Err(err) = self.store.upsert(record).await {
            warn!(item_id = %item.id, error = %err, "failed to record destination");
        }
        if mode == anishelf_config::RenameMode::Move
            && let Err(err) = self.store.remove(&item.path).await
        {
            warn!(item_id = %item.id, error = %err, "failed to drop moved source record");
        }
    }
}

pub(crate) fn publish(events: &EventBus, metrics: &Metrics, event: Event) {
    metrics.inc_event(event.kind());
    events.publish(event);
}

const fn parse_reason(err: &ParseError) -> &'static str {
    match err {
        ParseError::MalformedResponse { .. } => "malformed_response",
        ParseError::UnmappedFlag { .. } => "unmapped_flag",
    }
}
