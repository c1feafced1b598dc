//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges a pipeline run reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the pipeline.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    pipeline_items_total: IntCounterVec,
    bytes_hashed_total: IntCounter,
    lookups_total: IntCounterVec,
    field_coercion_failures_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    queue_depth: IntGauge,
    coercion_failures: AtomicU64,
}

/// Lookup outcome labels.
pub const LOOKUP_OUTCOMES: [&str; 3] = ["found", "not_found", "error"];

/// Point-in-time view of the headline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Items currently queued across all stages.
    pub queue_depth: i64,
    /// Bytes whose chunk digest completed.
    pub bytes_hashed_total: u64,
    /// Lookups issued, all outcomes.
    pub lookups_total: u64,
    /// Reply tokens left unset after failed coercion.
    pub field_coercion_failures_total: u64,
}

impl Metrics {
    /// Construct a registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pipeline_items_total = counter_vec(
            "pipeline_items_total",
            "Items leaving a pipeline stage by outcome",
            &["stage", "outcome"],
        )?;
        let bytes_hashed_total = IntCounter::with_opts(Opts::new(
            "bytes_hashed_total",
            "Bytes whose chunk digest completed",
        ))
        .map_err(|source| TelemetryError::collector("bytes_hashed_total", "build", source))?;
        let lookups_total = counter_vec(
            "lookups_total",
            "Remote lookups by outcome",
            &["outcome"],
        )?;
        let field_coercion_failures_total = counter_vec(
            "field_coercion_failures_total",
            "Reply tokens that failed type coercion",
            &["field"],
        )?;
        let events_emitted_total = counter_vec(
            "events_emitted_total",
            "Domain events emitted by type",
            &["type"],
        )?;
        let queue_depth = IntGauge::with_opts(Opts::new("queue_depth", "Items queued across stages"))
            .map_err(|source| TelemetryError::collector("queue_depth", "build", source))?;

        register(&registry, "pipeline_items_total", &pipeline_items_total)?;
        register(&registry, "bytes_hashed_total", &bytes_hashed_total)?;
        register(&registry, "lookups_total", &lookups_total)?;
        register(
            &registry,
            "field_coercion_failures_total",
            &field_coercion_failures_total,
        )?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "queue_depth", &queue_depth)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                pipeline_items_total,
                bytes_hashed_total,
                lookups_total,
                field_coercion_failures_total,
                events_emitted_total,
                queue_depth,
                coercion_failures: AtomicU64::new(0),
            }),
        })
    }

    /// Count an item leaving `stage` with `outcome`.
    pub fn inc_pipeline_item(&self, stage: &str, outcome: &str) {
        self.inner
            .pipeline_items_total
            .with_label_values(&[stage, outcome])
            .inc();
    }

    /// Add hashed bytes.
    pub fn add_bytes_hashed(&self, bytes: u64) {
        self.inner.bytes_hashed_total.inc_by(bytes);
    }

    /// Count a lookup by outcome, one of [`LOOKUP_OUTCOMES`].
    pub fn inc_lookup(&self, outcome: &str) {
        self.inner.lookups_total.with_label_values(&[outcome]).inc();
    }

    /// Count a reply token that failed coercion.
    pub fn inc_coercion_failure(&self, field: &str) {
        self.inner
            .field_coercion_failures_total
            .with_label_values(&[field])
            .inc();
        self.inner.coercion_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Adjust the queue depth gauge.
    pub fn add_queue_depth(&self, delta: i64) {
        self.inner.queue_depth.add(delta);
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsRender { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the headline counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.inner.queue_depth.get(),
            bytes_hashed_total: self.inner.bytes_hashed_total.get(),
            lookups_total: LOOKUP_OUTCOMES
                .iter()
                .map(|outcome| self.inner.lookups_total.with_label_values(&[*outcome]).get())
                .sum(),
            field_coercion_failures_total: self.inner.coercion_failures.load(Ordering::Relaxed),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::collector(name, "build", source))
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::collector(name, "register", source))
}
