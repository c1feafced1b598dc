//! Application boot sequence for the `anishelf` binary.

use std::path::PathBuf;
use std::sync::Arc;

use anishelf_config::AppConfig;
use anishelf_events::{Event, EventBus, EventStream};
use anishelf_protocol::{LookupSession, ReplaySession};
use anishelf_runtime::{JsonFileStore, LocalFileStore, MemoryStore};
use anishelf_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics, build_sha};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::pipeline::{Pipeline, PipelineDeps, RunSummary};
use crate::scan;

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Configuration document; defaults apply when unset.
    pub config_path: Option<PathBuf>,
    /// Force a dry run.
    pub dry_run: bool,
    /// Sources replacing `scan.sources` when non-empty.
    pub paths: Vec<PathBuf>,
}

impl RunOptions {
    fn apply(&self, config: &mut AppConfig) {
        if self.dry_run {
            config.rename.dry_run = true;
        }
        if !self.paths.is_empty() {
            config.scan.sources.clone_from(&self.paths);
        }
    }
}

/// Load configuration, wire collaborators and run the pipeline once.
///
/// # Errors
///
/// Returns an error if configuration, logging, session or store setup fails, or if
/// the pipeline run itself fails.
pub async fn run_app(options: RunOptions) -> AppResult<RunSummary> {
    let mut config = anishelf_config::load(options.config_path.as_deref())
        .map_err(|err| AppError::config("config.load", err))?;
    options.apply(&mut config);

    anishelf_telemetry::init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_name(config.logging.format.as_deref()),
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("run");

    info!(
        dry_run = config.rename.dry_run,
        mode = config.rename.mode.as_str(),
        target_root = %config.rename.target_root.display(),
        "anishelf starting"
    );

    let session = open_session(&config).await?;
    let store = open_store(&config).await?;
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let events = EventBus::new();
    let logger = spawn_event_logger(events.subscribe(None));

    let paths = scan::discover(&config.scan);
    let pipeline = Pipeline::new(
        &config,
        PipelineDeps {
            session,
            store,
            events,
            metrics: metrics.clone(),
        },
    )?;

    let cancel = pipeline.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; draining pipeline");
            cancel.cancel();
        }
    });

    let result = pipeline.run(paths).await;
    interrupt.abort();
    if let Err(err) = logger.await {
        debug!(error = %err, "event logger ended abnormally");
    }

    let summary = result?;
    for report in &summary.items {
        if let Some(reason) = &report.reason {
            info!(path = %report.source.display(), %reason, "not renamed");
        }
    }
    match metrics.render() {
        Ok(rendered) => debug!(metrics = %rendered, "final metrics"),
        Err(err) => debug!(error = %err, "metrics unavailable"),
    }
    Ok(summary)
}

async fn open_session(config: &AppConfig) -> AppResult<Arc<dyn LookupSession>> {
    let Some(path) = config.session.replay_path.as_deref() else {
        return Err(AppError::MissingDependency {
            name: "session.replay_path",
        });
    };
    let session = ReplaySession::load(path)
        .await
        .map_err(|err| AppError::session("replay.load", err))?;
    Ok(Arc::new(session))
}

async fn open_store(config: &AppConfig) -> AppResult<Arc<dyn LocalFileStore>> {
    match config.store.path.as_deref() {
        Some(path) => {
            let store = JsonFileStore::open(path)
                .await
                .map_err(|err| AppError::store("store.open", err))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

fn spawn_event_logger(mut stream: EventStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            match &envelope.event {
                Event::ItemRenamed {
                    source,
                    destination,
                    ..
                } => info!(event_id = envelope.id, %source, %destination, "renamed"),
                Event::ItemFailed {
                    path, state, reason, ..
                } => info!(event_id = envelope.id, %path, %state, %reason, "failed"),
                Event::HealthChanged { degraded } => {
                    warn!(event_id = envelope.id, ?degraded, "health changed");
                }
                other => debug!(event_id = envelope.id, kind = other.kind(), "pipeline event"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_paths_replace_configured_sources() {
        let mut config = AppConfig::default();
        config.scan.sources = vec![PathBuf::from("/configured")];
        RunOptions {
            config_path: None,
            dry_run: true,
            paths: vec![PathBuf::from("/cli")],
        }
        .apply(&mut config);
        assert!(config.rename.dry_run);
        assert_eq!(config.scan.sources, vec![PathBuf::from("/cli")]);

        RunOptions::default().apply(&mut config);
        assert!(config.rename.dry_run);
        assert_eq!(config.scan.sources, vec![PathBuf::from("/cli")]);
    }

    #[tokio::test]
    async fn missing_replay_path_is_reported() {
        let config = AppConfig::default();
        let result = open_session(&config).await;
        assert!(matches!(
            result,
            Err(AppError::MissingDependency {
                name: "session.replay_path"
            })
        ));
    }

    #[tokio::test]
    async fn store_defaults_to_memory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = AppConfig::default();
        let memory = open_store(&config).await?;
        assert!(memory.find(dir.path()).await?.is_none());

        config.store.path = Some(dir.path().join("records.json"));
        let json = open_store(&config).await?;
        assert!(json.find(dir.path()).await?.is_none());
        Ok(())
    }
}
