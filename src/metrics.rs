//! Prometheus Metrics Definitions
//!
//! Two kinds of metrics are exposed on the telemetry path.
//!
//! ## Exporter Self-Metrics
//! Long-lived, registered once in [`MetricsCollector`]:
//! - `vsphere_up` - whether the last scrape obtained a vCenter session
//! - `vsphere_scrape_duration_seconds` - wall time of the last scrape
//! - `vsphere_discovery_duration_seconds` - wall time of the last discovery
//! - `vsphere_discovered_objects{kind}` - objects published per resource kind
//! - `vsphere_sampling_chunk_errors_total{kind}` - failed sampling chunks
//!
//! ## Performance Counters
//! Rebuilt on every scrape from the sampled values. Each distinct metric name
//! becomes one gauge family with a single `name` label carrying the object's
//! display name. These live in a throwaway registry so objects that vanish
//! from the inventory also vanish from the output.

use crate::collectors::{MetricSample, NAME_LABEL};
use crate::vsphere::discovery::DiscoverySummary;
use crate::vsphere::inventory::ResourceKindId;
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

const NAMESPACE: &str = "vsphere";

/// Exporter self-metrics
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    pub up: Arc<Gauge>,
    pub scrape_duration_seconds: Arc<Gauge>,
    pub discovery_duration_seconds: Arc<Gauge>,
    pub discovered_objects: Arc<IntGaugeVec>,
    pub sampling_chunk_errors_total: Arc<IntCounterVec>,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let up = Gauge::with_opts(
            Opts::new(
                "up",
                "Whether the last scrape reached vCenter (1=reachable, 0=unreachable)",
            )
            .namespace(NAMESPACE),
        )?;

        let scrape_duration_seconds = Gauge::with_opts(
            Opts::new(
                "scrape_duration_seconds",
                "Duration of the last metrics scrape in seconds",
            )
            .namespace(NAMESPACE),
        )?;

        let discovery_duration_seconds = Gauge::with_opts(
            Opts::new(
                "discovery_duration_seconds",
                "Duration of the last successful inventory discovery in seconds",
            )
            .namespace(NAMESPACE),
        )?;

        let discovered_objects = IntGaugeVec::new(
            Opts::new(
                "discovered_objects",
                "Number of objects in the published inventory per resource kind",
            )
            .namespace(NAMESPACE),
            &["kind"],
        )?;

        let sampling_chunk_errors_total = IntCounterVec::new(
            Opts::new(
                "sampling_chunk_errors_total",
                "Number of sampling chunks that failed per resource kind",
            )
            .namespace(NAMESPACE),
            &["kind"],
        )?;

        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(discovery_duration_seconds.clone()))?;
        registry.register(Box::new(discovered_objects.clone()))?;
        registry.register(Box::new(sampling_chunk_errors_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            up: Arc::new(up),
            scrape_duration_seconds: Arc::new(scrape_duration_seconds),
            discovery_duration_seconds: Arc::new(discovery_duration_seconds),
            discovered_objects: Arc::new(discovered_objects),
            sampling_chunk_errors_total: Arc::new(sampling_chunk_errors_total),
        })
    }

    /// Record a finished discovery cycle.
    pub fn record_discovery(&self, summary: &DiscoverySummary, seconds: f64) {
        self.discovery_duration_seconds.set(seconds);
        for (kind, count) in &summary.objects {
            self.discovered_objects
                .with_label_values(&[kind.as_str()])
                .set(*count as i64);
        }
    }

    /// Count failed chunks of one scrape.
    pub fn record_chunk_errors(&self, failed: &[(ResourceKindId, usize)]) {
        for (kind, count) in failed {
            self.sampling_chunk_errors_total
                .with_label_values(&[kind.as_str()])
                .inc_by(*count as u64);
        }
    }

    /// Render the self-metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        self.render_with(&[])
    }

    /// Render the self-metrics followed by one scrape's performance samples.
    pub fn render_with(&self, samples: &[MetricSample]) -> anyhow::Result<String> {
        let mut families = self.registry.gather();
        families.extend(ScrapeRegistry::from_samples(samples).gather());

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Accepts emitted `(name, labels, value)` samples.
pub trait MetricSink {
    fn emit(&mut self, sample: &MetricSample);
}

/// Per-scrape registry of performance-counter gauges.
pub struct ScrapeRegistry {
    registry: Registry,
    gauges: HashMap<String, GaugeVec>,
    rejected: HashSet<String>,
}

impl ScrapeRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: HashMap::new(),
            rejected: HashSet::new(),
        }
    }

    pub fn from_samples(samples: &[MetricSample]) -> Self {
        let mut registry = Self::new();
        for sample in samples {
            registry.emit(sample);
        }
        registry
    }

    /// Set one sample's gauge. A name Prometheus rejects is warned about
    /// once and its later samples are dropped.
    pub fn observe(&mut self, sample: &MetricSample) {
        if self.rejected.contains(&sample.name) {
            return;
        }
        if !self.gauges.contains_key(&sample.name) {
            match self.register(sample) {
                Ok(gauge) => {
                    self.gauges.insert(sample.name.clone(), gauge);
                }
                Err(e) => {
                    warn!("Skipping metric {}: {}", sample.name, e);
                    self.rejected.insert(sample.name.clone());
                    return;
                }
            }
        }

        if let Some(gauge) = self.gauges.get(&sample.name) {
            let labels = sample.labels();
            let values: Vec<&str> = labels.iter().map(|(_, value)| *value).collect();
            gauge.with_label_values(&values).set(sample.value);
        }
    }

    fn register(&self, sample: &MetricSample) -> prometheus::Result<GaugeVec> {
        let gauge = GaugeVec::new(Opts::new(&sample.name, &sample.help), &[NAME_LABEL])?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

impl MetricSink for ScrapeRegistry {
    fn emit(&mut self, sample: &MetricSample) {
        self.observe(sample);
    }
}

impl Default for ScrapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
