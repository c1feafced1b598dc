//! Stage tasks, channels and the run lifecycle.
//!
//! # Design
//! - One task per [`StageId`], fed by a bounded channel and fanning out to a
//!   bounded `JoinSet` of workers.
//! - A stage closes its outputs only after every in-flight item has been forwarded,
//!   so completion propagates down the graph in order.
//! - The collector drains [`StageId::Complete`] on the caller's task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anishelf_config::{AppConfig, PipelineConfig};
use anishelf_events::{Event, EventBus};
use anishelf_fsops::{ContentHasher, FsRenamer, PathTemplate};
use anishelf_protocol::{AnimeMask, Credentials, FileField, FileMask, LookupSession};
use anishelf_runtime::LocalFileStore;
use anishelf_telemetry::Metrics;
use chrono::TimeDelta;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::graph::{StageId, route};
use super::item::PipelineItem;
use super::stages::{StageContext, publish};
use super::state::ItemState;
use super::summary::RunSummary;
use crate::error::{PipelineError, PipelineResult};

/// File fields every lookup requests regardless of the template.
const BASE_FILE_FIELDS: [FileField; 5] = [
    FileField::AnimeId,
    FileField::EpisodeId,
    FileField::GroupId,
    FileField::State,
    FileField::VideoResolution,
];

/// Collaborators injected into a [`Pipeline`].
pub struct PipelineDeps {
    /// Remote lookup session.
    pub session: Arc<dyn LookupSession>,
    /// Local file records.
    pub store: Arc<dyn LocalFileStore>,
    /// Progress event bus.
    pub events: EventBus,
    /// Metrics registry.
    pub metrics: Metrics,
}

/// A configured, not yet started pipeline run.
pub struct Pipeline {
    ctx: StageContext,
    credentials: Credentials,
    sizing: PipelineConfig,
    template_masks: (FileMask, AnimeMask),
}

impl Pipeline {
    /// Compile the rename template and derive the lookup plan from it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Template`] when the rename template is invalid.
    pub fn new(config: &AppConfig, deps: PipelineDeps) -> PipelineResult<Self> {
        let template = PathTemplate::compile(&config.rename.template)
            .map_err(|source| PipelineError::Template { source })?;
        let (file_mask, anime_mask) = template.required_masks();
        let template_masks = (base_file_mask().union(file_mask), anime_mask);
        let renamer = FsRenamer::new(config.rename.target_root.clone(), config.rename.mode)
            .with_dry_run(config.rename.dry_run);
        let cooldown = TimeDelta::from_std(config.pipeline.cooldown()).unwrap_or(TimeDelta::MAX);

        let ctx = StageContext {
            session: deps.session,
            store: deps.store,
            events: deps.events,
            metrics: deps.metrics,
            hasher: ContentHasher::new(config.pipeline.hash_chunk_workers),
            renamer,
            template,
            lookup_plan: vec![template_masks],
            cooldown,
            cancel: CancellationToken::new(),
            fatal: Mutex::new(None),
        };

        Ok(Self {
            ctx,
            credentials: Credentials {
                username: config.session.username.clone(),
                password: config.session.password.clone(),
            },
            sizing: config.pipeline.clone(),
            template_masks,
        })
    }

    /// Split each lookup into explicit mask passes whose records are merged.
    ///
    /// The first pass is widened with the identity and template fields. An empty
    /// list keeps the single derived pass.
    #[must_use]
    pub fn with_lookup_passes(mut self, passes: impl IntoIterator<Item = (FileMask, AnimeMask)>) -> Self {
        let mut plan: Vec<_> = passes.into_iter().collect();
        if let Some((file, anime)) = plan.first_mut() {
            let (base_file, base_anime) = self.template_masks;
            *file = file.union(base_file);
            *anime = anime.union(base_anime);
            self.ctx.lookup_plan = plan;
        }
        self
    }

    /// Use a custom chunk size for the hasher.
    #[must_use]
    pub fn with_hash_chunk_size(mut self, chunk_size: usize) -> Self {
        self.ctx.hasher = self.ctx.hasher.with_chunk_size(chunk_size);
        self
    }

    /// Token that cancels the run when triggered.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Mask passes issued per lookup.
    #[must_use]
    pub fn lookup_plan(&self) -> &[(FileMask, AnimeMask)] {
        &self.ctx.lookup_plan
    }

    /// Worker bound for `stage`.
    #[must_use]
    pub fn stage_limit(&self, stage: StageId) -> usize {
        let limit = match stage {
            StageId::Fetch | StageId::Cooldown => self.sizing.fetch_workers,
            StageId::Hash => self.sizing.hash_workers,
            StageId::Search => self
                .sizing
                .search_workers
                .min(self.ctx.session.max_in_flight()),
            StageId::Resolution => self.sizing.resolution_workers,
            StageId::Rename => self.sizing.rename_workers,
            StageId::Discard | StageId::Complete => 1,
        };
        limit.max(1)
    }

    /// Log in, push every path through the stage graph and wait for it to drain.
    ///
    /// Every path becomes exactly one item in the returned summary.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Session`] or [`PipelineError::AuthenticationRejected`]
    /// when the session cannot be established or is lost mid-run, and
    /// [`PipelineError::Stage`] when a stage task aborts.
    pub async fn run(self, paths: Vec<PathBuf>) -> PipelineResult<RunSummary> {
        self.ctx
            .session
            .connect()
            .await
            .map_err(|source| PipelineError::Session {
                operation: "connect",
                source,
            })?;
        let auth = self
            .ctx
            .session
            .authenticate(&self.credentials)
            .await
            .map_err(|source| PipelineError::Session {
                operation: "authenticate",
                source,
            })?;
        if !auth.success {
            return Err(PipelineError::AuthenticationRejected {
                username: self.credentials.username.clone(),
            });
        }
        if auth.has_new_version {
            info!("server advertises a newer client version");
        }

        let limits: HashMap<StageId, usize> = StageId::TASKS
            .into_iter()
            .map(|stage| (stage, self.stage_limit(stage)))
            .collect();
        let capacity = self.sizing.queue_capacity.max(1);
        let ctx = Arc::new(self.ctx);

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for stage in StageId::TASKS.into_iter().chain([StageId::Complete]) {
            let (tx, rx) = mpsc::channel::<PipelineItem>(capacity);
            senders.insert(stage, tx);
            receivers.insert(stage, rx);
        }

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        for stage in StageId::TASKS {
            let Some(input) = receivers.remove(&stage) else {
                continue;
            };
            let outputs: HashMap<StageId, mpsc::Sender<PipelineItem>> = stage
                .successors()
                .iter()
                .chain([&StageId::Complete])
                .filter_map(|target| senders.get(target).map(|tx| (*target, tx.clone())))
                .collect();
            let limit = limits.get(&stage).copied().unwrap_or(1);
            tasks.push((
                stage.as_str(),
                tokio::spawn(run_stage(stage, Arc::clone(&ctx), input, outputs, limit)),
            ));
        }

        let entry = senders.remove(&StageId::Fetch);
        let collector = receivers.remove(&StageId::Complete);
        drop(senders);
        let (Some(entry), Some(mut collector)) = (entry, collector) else {
            return Ok(RunSummary::default());
        };

        let enqueued = u64::try_from(paths.len()).unwrap_or(u64::MAX);
        info!(items = enqueued, "pipeline run starting");
        let producer = {
            let events = ctx.events.clone();
            let metrics = ctx.metrics.clone();
            tokio::spawn(async move {
                for path in paths {
                    let item = PipelineItem::new(path);
                    publish(
                        &events,
                        &metrics,
                        Event::ItemQueued {
                            item_id: item.id,
                            path: item.path.display().to_string(),
                        },
                    );
                    metrics.add_queue_depth(1);
                    if entry.send(item).await.is_err() {
                        error!("fetch stage stopped accepting items");
                        break;
                    }
                }
            })
        };
        tasks.insert(0, ("producer", producer));

        let mut summary = RunSummary::default();
        while let Some(item) = collector.recv().await {
            ctx.metrics.add_queue_depth(-1);
            debug!(item_id = %item.id, state = %item.state(), "item completed");
            summary.record(&item);
        }

        for (stage, task) in tasks {
            task.await
                .map_err(|source| PipelineError::Stage { stage, source })?;
        }

        ctx.publish(Event::RunCompleted {
            processed: summary.processed,
            renamed: summary.renamed,
            failed: summary.failed,
            skipped: summary.skipped,
        });
        info!(
            processed = summary.processed,
            renamed = summary.renamed,
            failed = summary.failed,
            skipped = summary.skipped,
            "pipeline run finished"
        );
        if summary.processed != enqueued {
            warn!(enqueued, processed = summary.processed, "items lost in flight");
        }

        if let Some(source) = ctx.take_fatal() {
            return Err(PipelineError::Session {
                operation: "lookup_by_hash",
                source,
            });
        }
        Ok(summary)
    }
}

fn base_file_mask() -> FileMask {
    FileMask::from_fields(BASE_FILE_FIELDS)
}

async fn run_stage(
    stage: StageId,
    ctx: Arc<StageContext>,
    mut input: mpsc::Receiver<PipelineItem>,
    outputs: HashMap<StageId, mpsc::Sender<PipelineItem>>,
    limit: usize,
) {
    let mut workers: JoinSet<PipelineItem> = JoinSet::new();
    let mut pending: HashMap<tokio::task::Id, PipelineItem> = HashMap::new();
    let mut open = true;
    debug!(%stage, limit, "stage started");

    while open || !workers.is_empty() {
        tokio::select! {
            Some(joined) = workers.join_next_with_id(), if !workers.is_empty() => {
                let item = match joined {
                    Ok((id, item)) => {
                        pending.remove(&id);
                        item
                    }
                    Err(err) => {
                        let Some(mut item) = pending.remove(&err.id()) else {
                            error!(%stage, error = %err, "lost track of a failed worker");
                            continue;
                        };
                        error!(%stage, item_id = %item.id, error = %err, "stage worker failed");
                        if stage == StageId::Discard {
                            item.advance_with_reason(ItemState::Failed, "worker_failed");
                        } else {
                            item.discard("worker_failed");
                        }
                        item
                    }
                };
                forward(stage, &outputs, item).await;
            }
            received = input.recv(), if open && workers.len() < limit => {
                match received {
                    Some(mut item) if stage != StageId::Discard && ctx.cancel.is_cancelled() => {
                        item.discard("cancelled");
                        forward(stage, &outputs, item).await;
                    }
                    Some(item) => {
                        let snapshot = item.clone();
                        let worker_ctx = Arc::clone(&ctx);
                        let handle = workers.spawn(async move { worker_ctx.process(stage, item).await });
                        pending.insert(handle.id(), snapshot);
                    }
                    None => open = false,
                }
            }
            else => break,
        }
    }
    debug!(%stage, "stage drained");
}

async fn forward(
    stage: StageId,
    outputs: &HashMap<StageId, mpsc::Sender<PipelineItem>>,
    mut item: PipelineItem,
) {
    let mut target = route(stage, &item);
    if !outputs.contains_key(&target) || !stage.successors().contains(&target) {
        error!(%stage, %target, item_id = %item.id, "no edge for routed item");
        item.advance_with_reason(ItemState::Failed, "unroutable");
        target = StageId::Complete;
    }
    let Some(tx) = outputs.get(&target) else {
        error!(%stage, item_id = %item.id, "completion channel missing");
        return;
    };
    if tx.send(item).await.is_err() {
        error!(%stage, %target, "downstream stage closed early");
    }
}
