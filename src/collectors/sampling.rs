//! Sampling Scheduler
//!
//! Collects the latest performance counter values for every enabled kind.
//!
//! # Flow
//!
//! 1. Obtain the session and snapshot the counter catalog and inventory
//! 2. Gate each enabled kind (historical kinds wait out their interval)
//! 3. Split the kind's references into chunks of `chunk_size`
//! 4. Query every chunk in its own task, at most `concurrency` at a time
//!    across all kinds
//! 5. Convert returned series into [`MetricSample`]s
//!
//! Chunk tasks are joined before their kind task finishes, and kind tasks
//! before the scrape returns.

use super::gate::{plan_window, SampleWindow};
use super::{metric_name, normalize_instance, CollectionStatus, MetricSample, ScrapeOutcome};
use crate::config::{SampleValuePolicy, SamplingConfig};
use crate::context::CallContext;
use crate::error::{ExporterError, Result};
use crate::vsphere::catalog::CounterTable;
use crate::vsphere::endpoint::Endpoint;
use crate::vsphere::inventory::{KindInventory, ObjectMap, ResourceKind, ResourceKindId};
use crate::vsphere::session::ClientSession;
use crate::vsphere::types::{EntityMetricSeries, ManagedObjectReference, PerfQuery};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct SamplingScheduler {
    endpoint: Arc<Endpoint>,
    limiter: Arc<Semaphore>,
    chunk_size: usize,
    lookback_multiplier: u32,
    value_policy: SampleValuePolicy,
    prefix: Arc<str>,
    last_samples: Mutex<HashMap<ResourceKindId, DateTime<Utc>>>,
}

/// State shared by every chunk task of one scrape.
struct ChunkShared {
    ctx: CallContext,
    session: Arc<ClientSession>,
    counters: Arc<CounterTable>,
    limiter: Arc<Semaphore>,
    value_policy: SampleValuePolicy,
    prefix: Arc<str>,
}

/// A kind whose gate passed, with the generation it samples.
struct KindJob {
    id: ResourceKindId,
    generation: KindInventory,
    window: SampleWindow,
    interval_id: i32,
    chunk_size: usize,
    previous: Option<DateTime<Utc>>,
}

struct KindReport {
    id: ResourceKindId,
    previous: Option<DateTime<Utc>>,
    samples: Vec<MetricSample>,
    completed_chunks: usize,
    failed_chunks: usize,
}

impl KindReport {
    /// Every chunk was cancelled before it finished.
    fn cancelled(&self) -> bool {
        self.completed_chunks == 0 && self.failed_chunks == 0
    }
}

impl SamplingScheduler {
    pub fn new(endpoint: Arc<Endpoint>, config: &SamplingConfig, prefix: &str) -> Self {
        Self {
            endpoint,
            limiter: Arc::new(Semaphore::new(config.concurrency.max(1))),
            chunk_size: config.chunk_size.max(1),
            lookback_multiplier: config.lookback_multiplier,
            value_policy: config.value_policy,
            prefix: Arc::from(prefix),
            last_samples: Mutex::new(HashMap::new()),
        }
    }

    pub async fn last_sample(&self, id: ResourceKindId) -> Option<DateTime<Utc>> {
        self.last_samples.lock().await.get(&id).copied()
    }

    /// Sample every enabled kind as of now.
    pub async fn collect(&self, ctx: &CallContext) -> ScrapeOutcome {
        self.collect_at(ctx, Utc::now()).await
    }

    /// Sample every enabled kind as of `now`.
    pub async fn collect_at(&self, ctx: &CallContext, now: DateTime<Utc>) -> ScrapeOutcome {
        let session = match self.endpoint.sessions().get_client(ctx).await {
            Ok(session) => session,
            Err(e) if e.is_cancellation() => {
                debug!("Scrape of {} cancelled before sampling", self.endpoint.url());
                return ScrapeOutcome::failed();
            }
            Err(e) => {
                warn!("Failed to obtain session for {}: {}", self.endpoint.url(), e);
                return ScrapeOutcome::failed();
            }
        };

        let shared = Arc::new(ChunkShared {
            ctx: ctx.clone(),
            session,
            counters: self.endpoint.catalog().snapshot().await,
            limiter: self.limiter.clone(),
            value_policy: self.value_policy,
            prefix: self.prefix.clone(),
        });
        let inventory = self.endpoint.inventory_snapshot().await;
        let jobs = self.plan(now, &inventory).await;

        let mut outcome = ScrapeOutcome {
            status: CollectionStatus::Success,
            samples: Vec::new(),
            sampled_kinds: jobs.iter().map(|j| j.id).collect(),
            failed_chunks: Vec::new(),
        };

        let mut kinds = JoinSet::new();
        for job in jobs {
            kinds.spawn(sample_kind(job, shared.clone()));
        }
        while let Some(joined) = kinds.join_next().await {
            match joined {
                Ok(report) => {
                    if report.cancelled() {
                        self.rewind(report.id, now, report.previous).await;
                    }
                    if report.failed_chunks > 0 {
                        outcome.failed_chunks.push((report.id, report.failed_chunks));
                    }
                    outcome.samples.extend(report.samples);
                }
                Err(e) => warn!("Sampling task failed: {}", e),
            }
        }

        info!(
            "Collected {} samples from {}",
            outcome.samples.len(),
            self.endpoint.url()
        );
        outcome
    }

    /// Undo the clock advance of a kind whose chunks were all cancelled,
    /// unless a later scrape has already moved it.
    async fn rewind(
        &self,
        id: ResourceKindId,
        now: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) {
        let mut last_samples = self.last_samples.lock().await;
        if last_samples.get(&id) != Some(&now) {
            return;
        }
        debug!("Sampling {} cancelled, keeping its previous sample time", id);
        match previous {
            Some(previous) => last_samples.insert(id, previous),
            None => last_samples.remove(&id),
        };
    }

    /// Gate every enabled kind and advance the clocks of those that have
    /// something to sample.
    async fn plan(
        &self,
        now: DateTime<Utc>,
        inventory: &BTreeMap<ResourceKindId, KindInventory>,
    ) -> Vec<KindJob> {
        let mut last_samples = self.last_samples.lock().await;
        let mut jobs = Vec::new();

        for kind in self.endpoint.kinds().filter(|k| k.enabled) {
            let Some(window) = plan_window(
                now,
                last_samples.get(&kind.id).copied(),
                kind.sampling,
                kind.realtime(),
                self.lookback_multiplier,
            ) else {
                debug!("Skipping {}: sampling interval not reached", kind.id);
                continue;
            };

            let generation = inventory.get(&kind.id).cloned().unwrap_or_default();
            if generation.objects.is_empty() || generation.metrics.is_empty() {
                debug!("Nothing to sample for {}", kind.id);
                continue;
            }
            let previous = last_samples.insert(kind.id, now);
            jobs.push(KindJob {
                id: kind.id,
                generation,
                window,
                interval_id: interval_id(kind),
                chunk_size: self.chunk_size,
                previous,
            });
        }
        jobs
    }
}

fn interval_id(kind: &ResourceKind) -> i32 {
    i32::try_from(kind.sampling.as_secs()).unwrap_or(i32::MAX)
}

/// Sorted references of a generation.
pub fn references(objects: &ObjectMap) -> Vec<ManagedObjectReference> {
    let mut references: Vec<ManagedObjectReference> =
        objects.values().map(|o| o.reference.clone()).collect();
    references.sort();
    references
}

async fn sample_kind(job: KindJob, shared: Arc<ChunkShared>) -> KindReport {
    let refs = references(&job.generation.objects);
    let mut chunks = JoinSet::new();

    for chunk in refs.chunks(job.chunk_size) {
        let query = PerfQuery {
            entities: chunk.to_vec(),
            metrics: job.generation.metrics.as_ref().clone(),
            start: job.window.start,
            end: job.window.end,
            interval_id: job.interval_id,
        };
        chunks.spawn(sample_chunk(
            query,
            job.generation.objects.clone(),
            shared.clone(),
        ));
    }

    let mut report = KindReport {
        id: job.id,
        previous: job.previous,
        samples: Vec::new(),
        completed_chunks: 0,
        failed_chunks: 0,
    };
    while let Some(joined) = chunks.join_next().await {
        match joined {
            Ok(Ok(samples)) => {
                report.completed_chunks += 1;
                report.samples.extend(samples);
            }
            Ok(Err(e)) if e.is_cancellation() => {
                debug!("Sampling {} chunk cancelled", job.id);
            }
            Ok(Err(e)) => {
                warn!("Failed to sample {} chunk: {}", job.id, e);
                report.failed_chunks += 1;
            }
            Err(e) => {
                warn!("Sampling {} chunk task failed: {}", job.id, e);
                report.failed_chunks += 1;
            }
        }
    }
    report
}

async fn sample_chunk(
    query: PerfQuery,
    objects: Arc<ObjectMap>,
    shared: Arc<ChunkShared>,
) -> Result<Vec<MetricSample>> {
    let permit = tokio::select! {
        permit = shared.limiter.clone().acquire_owned() => permit
            .map_err(|_| ExporterError::Sampling("concurrency limiter closed".to_string()))?,
        _ = shared.ctx.done() => return Err(ExporterError::Cancelled),
    };

    let series = shared
        .session
        .query_samples(&shared.ctx, &query)
        .await
        .map_err(|e| match e {
            ExporterError::Cancelled => e,
            other => ExporterError::Sampling(format!(
                "query for {} objects failed: {}",
                query.entities.len(),
                other
            )),
        });
    drop(permit);

    convert_series(
        series?,
        &objects,
        &shared.counters,
        shared.value_policy,
        &shared.prefix,
    )
}

/// Turn returned series into samples. Series without values are skipped;
/// an unknown counter id fails the whole chunk.
pub fn convert_series(
    series: Vec<EntityMetricSeries>,
    objects: &ObjectMap,
    counters: &CounterTable,
    value_policy: SampleValuePolicy,
    prefix: &str,
) -> Result<Vec<MetricSample>> {
    let mut samples = Vec::new();

    for entity in series {
        let label = objects
            .get(&entity.entity.value)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| entity.entity.value.clone());

        for s in entity.values {
            let Some(value) = value_policy.pick(&s.values) else {
                continue;
            };
            let counter = counters.by_key(s.counter_id).ok_or_else(|| {
                ExporterError::Sampling(format!(
                    "unknown counter id {} in result for {}",
                    s.counter_id, entity.entity
                ))
            })?;
            let counter_name = counter.full_name();

            samples.push(MetricSample {
                name: metric_name(prefix, &entity.entity.kind, &counter_name),
                help: format!("metric: {} units: {}", counter_name, counter.unit),
                label: label.clone(),
                instance: normalize_instance(&s.instance),
                value: value as f64,
            });
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::inventory::ObjectRef;
    use crate::vsphere::types::{MetricSeries, PerfCounterInfo};

    fn counters() -> CounterTable {
        let cpu = PerfCounterInfo {
            key: 1,
            group: "cpu".to_string(),
            name: "usage".to_string(),
            rollup: "average".to_string(),
            unit: "percent".to_string(),
        };
        CounterTable::from_maps(
            HashMap::from([(1, cpu.clone())]),
            HashMap::from([(cpu.full_name(), cpu)]),
        )
    }

    fn objects() -> ObjectMap {
        let reference = ManagedObjectReference::new("VirtualMachine", "vm-1");
        ObjectMap::from([("vm-1".to_string(), ObjectRef::new("web-01", reference))])
    }

    fn series(counter_id: i32, instance: &str, values: Vec<i64>) -> Vec<EntityMetricSeries> {
        vec![EntityMetricSeries {
            entity: ManagedObjectReference::new("VirtualMachine", "vm-1"),
            values: vec![MetricSeries {
                counter_id,
                instance: instance.to_string(),
                values,
            }],
        }]
    }

    #[test]
    fn first_policy_emits_first_element() {
        let samples = convert_series(
            series(1, "", vec![42, 7]),
            &objects(),
            &counters(),
            SampleValuePolicy::First,
            "vsphere",
        )
        .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "vsphere_VirtualMachine_cpu_usage_average");
        assert_eq!(samples[0].label, "web-01");
        assert_eq!(samples[0].instance, "-");
        assert_eq!(samples[0].value, 42.0);
        assert_eq!(samples[0].help, "metric: cpu.usage.average units: percent");
    }

    #[test]
    fn latest_policy_emits_last_element() {
        let samples = convert_series(
            series(1, "0", vec![42, 7]),
            &objects(),
            &counters(),
            SampleValuePolicy::Latest,
            "vsphere",
        )
        .unwrap();
        assert_eq!(samples[0].value, 7.0);
        assert_eq!(samples[0].instance, "0");
    }

    #[test]
    fn empty_series_is_skipped() {
        let samples = convert_series(
            series(1, "", vec![]),
            &objects(),
            &counters(),
            SampleValuePolicy::First,
            "vsphere",
        )
        .unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn unknown_counter_fails_conversion() {
        let err = convert_series(
            series(99, "", vec![1]),
            &objects(),
            &counters(),
            SampleValuePolicy::First,
            "vsphere",
        )
        .unwrap_err();
        assert!(matches!(err, ExporterError::Sampling(_)));
    }

    #[test]
    fn unknown_entity_falls_back_to_reference_value() {
        let samples = convert_series(
            series(1, "", vec![3]),
            &ObjectMap::new(),
            &counters(),
            SampleValuePolicy::First,
            "vsphere",
        )
        .unwrap();
        assert_eq!(samples[0].label, "vm-1");
    }
}
