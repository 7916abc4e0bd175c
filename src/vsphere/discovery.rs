//! Inventory Discovery
//!
//! One discovery cycle:
//! 1. refresh the counter catalog
//! 2. obtain a session
//! 3. enumerate every kind that is enabled or is an ancestor of another kind
//! 4. resolve each non-root object's owning datacenter
//! 5. build the requested-counter list of every enabled kind
//!
//! Results are staged and published in one step only when every kind
//! succeeded; any failure leaves the previous generation in place.

use crate::context::CallContext;
use crate::error::{ExporterError, Result};
use crate::vsphere::ancestry::{resolve_ancestor_name, AncestorCache};
use crate::vsphere::catalog::CounterTable;
use crate::vsphere::endpoint::Endpoint;
use crate::vsphere::enumerate::EnumerationOptions;
use crate::vsphere::inventory::{KindInventory, ResourceKind, ResourceKindId};
use crate::vsphere::types::PerfMetricId;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const DATACENTER_TYPE: &str = "Datacenter";

/// Per-cycle counts, for logging and self-metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub objects: Vec<(ResourceKindId, usize)>,
}

impl DiscoverySummary {
    pub fn total(&self) -> usize {
        self.objects.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Clone)]
pub struct InventoryDiscoverer {
    endpoint: Arc<Endpoint>,
}

impl InventoryDiscoverer {
    pub fn new(endpoint: Arc<Endpoint>) -> Self {
        Self { endpoint }
    }

    /// Run one discovery cycle. Concurrent callers queue behind each other.
    pub async fn discover(&self, ctx: &CallContext) -> Result<DiscoverySummary> {
        let _busy = self.endpoint.lock_discovery().await;
        ctx.check()?;

        let started = Instant::now();
        let endpoint = &self.endpoint;

        let catalog_session = endpoint.sessions().get_client(ctx).await?;
        endpoint
            .catalog()
            .refresh(ctx, &catalog_session)
            .await
            .map_err(|e| discovery_error("refreshing counter catalog", e))?;
        let counters = endpoint.catalog().snapshot().await;

        let session = endpoint.sessions().get_client(ctx).await?;
        debug!("Discovering new objects on {}", endpoint.url());

        let ancestors = AncestorCache::new();
        let options = EnumerationOptions {
            ip_families: endpoint.ip_families(),
        };

        let mut staged = Vec::new();
        let mut summary = DiscoverySummary::default();

        for kind in endpoint.kinds().filter(|k| k.needs_discovery()) {
            ctx.check()?;
            let spec = kind.spec();
            debug!("Discovering {} resources", spec.name);

            let mut objects = spec
                .enumeration
                .enumerate(ctx, &session, spec, &options)
                .await
                .map_err(|e| discovery_error(&format!("enumerating {}", spec.name), e))?;

            // Datacenters carry their own name already
            if kind.id != ResourceKindId::Datacenter {
                for obj in objects.values_mut() {
                    if let Some(parent) = &obj.parent_ref {
                        obj.dc_name =
                            resolve_ancestor_name(ctx, &session, &ancestors, DATACENTER_TYPE, parent)
                                .await
                                .unwrap_or_default();
                    }
                }
                ctx.check()?;
            }

            let metrics = if kind.enabled {
                requested_counters(kind, &counters)
            } else {
                Vec::new()
            };

            summary.objects.push((kind.id, objects.len()));
            staged.push((
                kind.id,
                KindInventory {
                    objects: Arc::new(objects),
                    metrics: Arc::new(metrics),
                },
            ));
        }

        endpoint.publish(staged).await;
        info!(
            "Discovered {} objects on {} in {:?}",
            summary.total(),
            endpoint.url(),
            started.elapsed()
        );
        Ok(summary)
    }
}

/// Every cataloged counter, per-instance when the kind asks for it.
pub fn requested_counters(kind: &ResourceKind, counters: &CounterTable) -> Vec<PerfMetricId> {
    let instance = kind.instance_selector();
    counters
        .keys()
        .into_iter()
        .map(|counter_id| PerfMetricId {
            counter_id,
            instance: instance.to_string(),
        })
        .collect()
}

fn discovery_error(step: &str, e: ExporterError) -> ExporterError {
    match e {
        ExporterError::Cancelled
        | ExporterError::Connection(_)
        | ExporterError::Discovery(_) => e,
        other => ExporterError::Discovery(format!("{}: {}", step, other)),
    }
}
