use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anishelf_app::pipeline::{ItemReport, ItemState};
use anishelf_app::{Pipeline, PipelineDeps, PipelineError, RunSummary};
use anishelf_config::AppConfig;
use anishelf_events::{Event, EventBus};
use anishelf_fsops::{ContentHasher, HashProgress};
use anishelf_protocol::{AnimeField, AnimeInfo, AnimeMask, Ed2kHash, FileField, FileInfo, FileMask};
use anishelf_runtime::{LocalFileRecord, LocalFileStore, MemoryStore};
use anishelf_telemetry::Metrics;
use anishelf_test_support::fixtures::write_media;
use anishelf_test_support::mocks::{Script, ScriptedSession};
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TEMPLATE: &str = "{romaji_name}/{romaji_name} - {episode_number}.{extension}";

struct Library {
    _dir: TempDir,
    inbox: PathBuf,
    root: PathBuf,
}

impl Library {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let inbox = dir.path().join("inbox");
        let root = dir.path().join("library");
        std::fs::create_dir_all(&inbox)?;
        Ok(Self {
            _dir: dir,
            inbox,
            root,
        })
    }

    fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.rename.template = TEMPLATE.to_string();
        config.rename.target_root.clone_from(&self.root);
        config
    }

    fn media(&self, name: &str, seed: u8) -> Result<PathBuf> {
        write_media(&self.inbox, name, 4_096 + usize::from(seed), seed)
    }
}

async fn fingerprint(path: &Path) -> Result<Ed2kHash> {
    ContentHasher::new(1)
        .hash_file(path, &CancellationToken::new(), &HashProgress::new())
        .await?
        .ok_or_else(|| anyhow!("no fingerprint for {}", path.display()))
}

fn episode(file_id: i64, title: &str, number: &str) -> Script {
    let mut file = FileInfo::with_id(file_id);
    file.anime_id = Some(1);
    file.video_resolution = Some("1920x1080".into());
    let anime = AnimeInfo {
        romaji_name: Some(title.into()),
        episode_number: Some(number.into()),
        english_name: Some(format!("{title} (en)")),
        ..AnimeInfo::default()
    };
    Script::found(file, anime)
}

fn deps(session: &Arc<ScriptedSession>, store: &Arc<MemoryStore>, events: &EventBus) -> Result<PipelineDeps> {
    Ok(PipelineDeps {
        session: session.clone(),
        store: store.clone(),
        events: events.clone(),
        metrics: Metrics::new()?,
    })
}

fn report<'a>(summary: &'a RunSummary, path: &Path) -> Result<&'a ItemReport> {
    summary
        .item(path)
        .with_context(|| format!("no report for {}", path.display()))
}

fn assert_valid_trails(summary: &RunSummary) {
    for report in &summary.items {
        let trail = &report.trail;
        assert_eq!(trail.first(), Some(&ItemState::Nominal), "{trail:?}");
        for pair in trail.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{trail:?}");
        }
        for (index, state) in trail.iter().enumerate() {
            assert!(!trail[index + 1..].contains(state), "{state} revisited in {trail:?}");
        }
        let terminals = trail.iter().filter(|state| state.is_terminal()).count();
        assert_eq!(terminals, 1, "{trail:?}");
        assert!(report.outcome().is_some_and(ItemState::is_terminal));
    }
    assert_eq!(summary.processed, summary.renamed + summary.failed);
    assert_eq!(summary.processed, summary.items.len() as u64);
}

#[tokio::test]
async fn identified_files_are_moved_into_the_library() -> Result<()> {
    let library = Library::new()?;
    let first = library.media("first.mkv", 1)?;
    let second = library.media("second.MKV", 2)?;
    let session = Arc::new(
        ScriptedSession::new()
            .with_script(fingerprint(&first).await?, episode(10, "Show", "01"))
            .with_script(fingerprint(&second).await?, episode(11, "Show", "02")),
    );
    let store = Arc::new(MemoryStore::new());
    let events = EventBus::new();

    let summary = Pipeline::new(&library.config(), deps(&session, &store, &events)?)?
        .run(vec![first.clone(), second.clone()])
        .await?;

    assert_valid_trails(&summary);
    assert_eq!(summary.renamed, 2);
    assert_eq!(summary.failed, 0);
    let destination = library.root.join("Show/Show - 01.mkv");
    assert!(destination.is_file());
    assert!(library.root.join("Show/Show - 02.mkv").is_file());
    assert!(!first.exists());

    let first_report = report(&summary, &first)?;
    assert_eq!(first_report.destination.as_deref(), Some(destination.as_path()));
    assert_eq!(
        first_report.trail,
        vec![
            ItemState::Nominal,
            ItemState::NeedsHash,
            ItemState::Hashed,
            ItemState::ResolutionPending,
            ItemState::Ready,
            ItemState::Renamed,
        ]
    );

    let record = store.find(&destination).await?.context("destination record")?;
    assert_eq!(record.file_id, Some(10));
    assert!(record.ed2k.is_some());
    assert!(record.last_lookup_at.is_some());
    assert_eq!(record.resolution.map(|r| r.to_string()).as_deref(), Some("1920x1080"));
    assert!(store.find(&first).await?.is_none());

    let kinds: Vec<&str> = events
        .backlog_since(0)
        .iter()
        .map(|envelope| envelope.event.kind())
        .collect();
    assert_eq!(kinds.iter().filter(|kind| **kind == "item_renamed").count(), 2);
    assert!(matches!(
        events.backlog_since(0).last().map(|envelope| &envelope.event),
        Some(Event::RunCompleted { processed: 2, renamed: 2, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn failed_items_carry_their_reason() -> Result<()> {
    let library = Library::new()?;
    let unknown = library.media("unknown.mkv", 3)?;
    let flaky = library.media("flaky.mkv", 4)?;
    let empty = library.inbox.join("empty.mkv");
    std::fs::write(&empty, b"")?;
    let missing = library.inbox.join("missing.mkv");
    let session = Arc::new(
        ScriptedSession::new()
            .with_script(fingerprint(&unknown).await?, Script::NotFound)
            .with_script(fingerprint(&flaky).await?, Script::RequestError),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = Pipeline::new(&library.config(), deps(&session, &store, &EventBus::new())?)?
        .run(vec![unknown.clone(), flaky.clone(), empty.clone(), missing.clone()])
        .await?;

    assert_valid_trails(&summary);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.failed, 4);
    assert_eq!(summary.skipped, 0);
    for (path, reason) in [
        (&unknown, "not_found_remotely"),
        (&flaky, "request_failed"),
        (&empty, "empty_file"),
        (&missing, "stat_failed"),
    ] {
        assert_eq!(report(&summary, path)?.reason.as_deref(), Some(reason), "{}", path.display());
    }
    assert!(unknown.exists());
    assert!(flaky.exists());
    assert_eq!(session.lookups(), 2);

    let record = store.find(&unknown).await?.context("not found lookups are recorded")?;
    assert!(record.last_lookup_at.is_some());
    Ok(())
}

#[tokio::test]
async fn recently_looked_up_files_are_never_searched() -> Result<()> {
    let library = Library::new()?;
    let path = library.media("recent.mkv", 5)?;
    let hash = fingerprint(&path).await?;
    let session = Arc::new(ScriptedSession::new().with_script(hash, episode(12, "Show", "03")));
    let store = Arc::new(MemoryStore::new());
    let mut record = LocalFileRecord::new(&path, std::fs::metadata(&path)?.len());
    record.ed2k = Some(hash);
    record.last_lookup_at = Some(Utc::now());
    store.upsert(record).await?;

    let summary = Pipeline::new(&library.config(), deps(&session, &store, &EventBus::new())?)?
        .run(vec![path.clone()])
        .await?;

    assert_valid_trails(&summary);
    assert_eq!(session.lookups(), 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    let report = report(&summary, &path)?;
    assert_eq!(
        report.trail,
        vec![ItemState::Nominal, ItemState::CoolingDown, ItemState::Failed]
    );
    assert_eq!(report.reason.as_deref(), Some("cooling_down"));
    assert!(path.exists());
    Ok(())
}

#[tokio::test]
async fn stale_cached_fingerprints_are_rehashed() -> Result<()> {
    let library = Library::new()?;
    let path = library.media("resized.mkv", 6)?;
    let session = Arc::new(
        ScriptedSession::new().with_script(fingerprint(&path).await?, episode(13, "Show", "04")),
    );
    let store = Arc::new(MemoryStore::new());
    let mut record = LocalFileRecord::new(&path, 1);
    record.ed2k = Some(Ed2kHash([0; 16]));
    store.upsert(record).await?;

    let summary = Pipeline::new(&library.config(), deps(&session, &store, &EventBus::new())?)?
        .run(vec![path.clone()])
        .await?;

    assert_eq!(summary.renamed, 1);
    assert!(report(&summary, &path)?.trail.contains(&ItemState::Hashed));
    Ok(())
}

#[tokio::test]
async fn lost_session_fails_the_run() -> Result<()> {
    let library = Library::new()?;
    let path = library.media("doomed.mkv", 7)?;
    let session = Arc::new(ScriptedSession::new().with_script(fingerprint(&path).await?, Script::SessionError));
    let store = Arc::new(MemoryStore::new());
    let events = EventBus::new();

    let result = Pipeline::new(&library.config(), deps(&session, &store, &events)?)?
        .run(vec![path.clone()])
        .await;

    let err = result.err().context("run should fail")?;
    assert!(err.is_session_failure());
    assert!(matches!(err, PipelineError::Session { operation: "lookup_by_hash", .. }));
    assert!(path.exists());
    assert!(events.backlog_since(0).iter().any(|envelope| matches!(
        &envelope.event,
        Event::HealthChanged { degraded } if degraded == &["session".to_string()]
    )));
    Ok(())
}

#[tokio::test]
async fn rejected_login_stops_before_any_work() -> Result<()> {
    let library = Library::new()?;
    let path = library.media("untouched.mkv", 8)?;
    let session = Arc::new(ScriptedSession::new().rejecting_login());
    let store = Arc::new(MemoryStore::new());

    let result = Pipeline::new(&library.config(), deps(&session, &store, &EventBus::new())?)?
        .run(vec![path.clone()])
        .await;

    assert!(matches!(result, Err(PipelineError::AuthenticationRejected { .. })));
    assert_eq!(session.lookups(), 0);
    assert!(store.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn cancelled_runs_drain_to_the_discard_sink() -> Result<()> {
    let library = Library::new()?;
    let mut paths = Vec::new();
    let mut session = ScriptedSession::new();
    for seed in 0..4 {
        let path = library.media(&format!("episode-{seed}.mkv"), seed)?;
        session = session.with_script(fingerprint(&path).await?, episode(20 + i64::from(seed), "Show", "05"));
        paths.push(path);
    }
    let session = Arc::new(session);
    let store = Arc::new(MemoryStore::new());

    let pipeline = Pipeline::new(&library.config(), deps(&session, &store, &EventBus::new())?)?;
    pipeline.cancellation_token().cancel();
    let summary = pipeline.run(paths.clone()).await?;

    assert_valid_trails(&summary);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.failed, 4);
    assert_eq!(session.lookups(), 0);
    for path in &paths {
        assert_eq!(report(&summary, path)?.reason.as_deref(), Some("cancelled"));
        assert!(path.exists());
    }
    Ok(())
}

#[tokio::test]
async fn lookup_passes_are_merged_into_one_record() -> Result<()> {
    let library = Library::new()?;
    let path = library.media("split.mkv", 9)?;
    let session = Arc::new(
        ScriptedSession::new().with_script(fingerprint(&path).await?, episode(30, "Split", "06")),
    );
    let store = Arc::new(MemoryStore::new());
    let mut config = library.config();
    config.rename.template = "{romaji_name}/{english_name} - {episode_number}.{extension}".into();

    let second_pass = (FileMask::empty(), AnimeMask::from_fields([AnimeField::EnglishName]));
    let pipeline = Pipeline::new(&config, deps(&session, &store, &EventBus::new())?)?.with_lookup_passes([
        (FileMask::from_fields([FileField::Crc32Hash]), AnimeMask::from_fields([AnimeField::RomajiName])),
        second_pass,
    ]);
    assert_eq!(pipeline.lookup_plan().len(), 2);
    let summary = pipeline.run(vec![path.clone()]).await?;

    assert_eq!(summary.renamed, 1);
    let requests = session.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].file_mask.contains(FileField::Crc32Hash));
    assert!(requests[0].file_mask.contains(FileField::AnimeId));
    assert_eq!(requests[1].anime_mask, second_pass.1);
    assert!(library.root.join("Split/Split (en) - 06.mkv").is_file());
    Ok(())
}

#[tokio::test]
async fn search_never_exceeds_session_capacity() -> Result<()> {
    let library = Library::new()?;
    let mut paths = Vec::new();
    let mut session = ScriptedSession::new()
        .with_max_in_flight(2)
        .with_delay(Duration::from_millis(20));
    for seed in 10..16 {
        let path = library.media(&format!("batch-{seed}.mkv"), seed)?;
        session = session.with_script(
            fingerprint(&path).await?,
            episode(40 + i64::from(seed), "Batch", &seed.to_string()),
        );
        paths.push(path);
    }
    let session = Arc::new(session);
    let store = Arc::new(MemoryStore::new());
    let mut config = library.config();
    config.pipeline.search_workers = 8;
    config.pipeline.hash_workers = 4;

    let pipeline = Pipeline::new(&config, deps(&session, &store, &EventBus::new())?)?;
    assert_eq!(pipeline.stage_limit(anishelf_app::pipeline::StageId::Search), 2);
    let summary = pipeline.run(paths).await?;

    assert_valid_trails(&summary);
    assert_eq!(summary.renamed, 6);
    assert_eq!(session.lookups(), 6);
    assert!(session.peak_in_flight() <= 2);
    Ok(())
}

#[tokio::test]
async fn dry_runs_plan_without_touching_files() -> Result<()> {
    let library = Library::new()?;
    let path = library.media("planned.mkv", 17)?;
    let session = Arc::new(
        ScriptedSession::new().with_script(fingerprint(&path).await?, episode(50, "Plan", "07")),
    );
    let store = Arc::new(MemoryStore::new());
    let mut config = library.config();
    config.rename.dry_run = true;

    let summary = Pipeline::new(&config, deps(&session, &store, &EventBus::new())?)?
        .run(vec![path.clone()])
        .await?;

    let planned = library.root.join("Plan/Plan - 07.mkv");
    assert_eq!(summary.renamed, 1);
    assert_eq!(report(&summary, &path)?.destination.as_deref(), Some(planned.as_path()));
    assert!(path.exists());
    assert!(!planned.exists());
    Ok(())
}

#[tokio::test]
async fn occupied_destinations_are_not_overwritten() -> Result<()> {
    let library = Library::new()?;
    let path = library.media("clash.mkv", 18)?;
    let occupied = library.root.join("Clash/Clash - 08.mkv");
    std::fs::create_dir_all(library.root.join("Clash"))?;
    std::fs::write(&occupied, b"already here")?;
    let session = Arc::new(
        ScriptedSession::new().with_script(fingerprint(&path).await?, episode(60, "Clash", "08")),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = Pipeline::new(&library.config(), deps(&session, &store, &EventBus::new())?)?
        .run(vec![path.clone()])
        .await?;

    assert_valid_trails(&summary);
    assert_eq!(report(&summary, &path)?.reason.as_deref(), Some("destination_exists"));
    assert_eq!(std::fs::read(&occupied)?, b"already here");
    assert!(path.exists());
    Ok(())
}

#[tokio::test]
async fn invalid_templates_are_rejected_up_front() -> Result<()> {
    let library = Library::new()?;
    let mut config = library.config();
    config.rename.template = "{no_such_field}.{extension}".into();
    let session = Arc::new(ScriptedSession::new());
    let store = Arc::new(MemoryStore::new());

    let result = Pipeline::new(&config, deps(&session, &store, &EventBus::new())?);
    assert!(matches!(result, Err(PipelineError::Template { .. })));
    Ok(())
}
