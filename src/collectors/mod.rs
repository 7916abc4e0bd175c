//! Metrics Collectors
//!
//! Per-scrape sampling of performance counters.
//!
//! # Architecture
//!
//! - [`gate`] decides whether a kind is due and which window to request
//! - [`sampling`] fans out one task per enabled kind and one task per chunk,
//!   bounded by a global limiter, and joins everything back into a
//!   [`ScrapeOutcome`]
//!
//! # Error Handling
//!
//! Chunk failures are non-fatal - they are logged and counted, and the chunk
//! contributes no samples. A scrape always returns whatever was collected.

use crate::vsphere::inventory::ResourceKindId;

pub mod gate;
pub mod sampling;

pub use sampling::SamplingScheduler;

/// Placeholder used when a series carries no instance id.
pub const NO_INSTANCE: &str = "-";

/// Label key carrying the object's display name.
pub const NAME_LABEL: &str = "name";

/// Status of a metrics collection operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// A session was obtained and sampling ran
    Success,
    /// The back end could not be reached (already logged as warning)
    Failed,
}

/// One emitted value: `name{name="<label>"} value`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub label: String,
    /// Normalized instance id. Not rendered as a label, so samples that
    /// differ only here collapse onto one series.
    pub instance: String,
    pub value: f64,
}

impl MetricSample {
    pub fn labels(&self) -> [(&str, &str); 1] {
        [(NAME_LABEL, self.label.as_str())]
    }
}

/// Everything one scrape produced.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub status: CollectionStatus,
    pub samples: Vec<MetricSample>,
    /// Kinds whose gate passed in this scrape
    pub sampled_kinds: Vec<ResourceKindId>,
    /// Failed chunks per kind
    pub failed_chunks: Vec<(ResourceKindId, usize)>,
}

impl ScrapeOutcome {
    pub fn failed() -> Self {
        Self {
            status: CollectionStatus::Failed,
            samples: Vec::new(),
            sampled_kinds: Vec::new(),
            failed_chunks: Vec::new(),
        }
    }
}

/// `<prefix>_<object type>_<counter name with dots as underscores>`.
pub fn metric_name(prefix: &str, object_type: &str, counter_name: &str) -> String {
    format!("{}_{}_{}", prefix, object_type, counter_name.replace('.', "_"))
}

/// Empty instance ids become [`NO_INSTANCE`].
pub fn normalize_instance(instance: &str) -> String {
    if instance.is_empty() {
        NO_INSTANCE.to_string()
    } else {
        instance.to_string()
    }
}
