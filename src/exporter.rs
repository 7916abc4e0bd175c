//! Exporter Entry Points
//!
//! [`VSphereExporter`] wires an [`Endpoint`] to its discoverer and scheduler
//! and exposes the two calls the outside world makes:
//!
//! - [`VSphereExporter::ensure_inventory`] - run one discovery cycle
//! - [`VSphereExporter::collect`] - produce the current metric set, running
//!   discovery inline first when the discovery interval is zero
//!
//! With a non-zero interval, [`VSphereExporter::spawn_discovery`] keeps the
//! inventory fresh from a background task instead.

use crate::collectors::{SamplingScheduler, ScrapeOutcome};
use crate::config::Config;
use crate::context::CallContext;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::vsphere::discovery::DiscoverySummary;
use crate::vsphere::{Backend, Endpoint, InventoryDiscoverer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct VSphereExporter {
    endpoint: Arc<Endpoint>,
    discoverer: InventoryDiscoverer,
    scheduler: SamplingScheduler,
    metrics: MetricsCollector,
    discovery_interval: Duration,
}

impl VSphereExporter {
    pub fn new(config: &Config, backend: Arc<dyn Backend>, metrics: MetricsCollector) -> Self {
        let endpoint = Arc::new(Endpoint::new(config, backend));
        Self {
            discoverer: InventoryDiscoverer::new(endpoint.clone()),
            scheduler: SamplingScheduler::new(
                endpoint.clone(),
                &config.sampling,
                &config.metrics.prefix,
            ),
            endpoint,
            metrics,
            discovery_interval: config.discovery.interval(),
        }
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn scheduler(&self) -> &SamplingScheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Discovery runs before every scrape instead of on a timer.
    pub fn discovers_inline(&self) -> bool {
        self.discovery_interval.is_zero()
    }

    /// Run one discovery cycle.
    pub async fn ensure_inventory(&self, ctx: &CallContext) -> Result<DiscoverySummary> {
        let started = Instant::now();
        let summary = self.discoverer.discover(ctx).await?;
        self.metrics
            .record_discovery(&summary, started.elapsed().as_secs_f64());
        Ok(summary)
    }

    /// Produce the current metric set. Never fails; partial errors are logged.
    pub async fn collect(&self, ctx: &CallContext) -> ScrapeOutcome {
        if self.discovers_inline() {
            if let Err(e) = self.ensure_inventory(ctx).await {
                log_discovery_error(self.endpoint.url(), &e);
            }
        }
        let outcome = self.scheduler.collect(ctx).await;
        self.metrics.record_chunk_errors(&outcome.failed_chunks);
        outcome
    }

    /// Start periodic discovery, with one cycle right away.
    ///
    /// Returns `None` in inline mode.
    pub fn spawn_discovery(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if self.discovers_inline() {
            return None;
        }

        let exporter = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = interval(exporter.discovery_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.cancelled() => {
                        debug!("Stopping discovery for {}", exporter.endpoint.url());
                        return;
                    }
                }

                let ctx = CallContext::from_token(shutdown.child_token(), None);
                if let Err(e) = exporter.ensure_inventory(&ctx).await {
                    log_discovery_error(exporter.endpoint.url(), &e);
                }
            }
        }))
    }
}

fn log_discovery_error(url: &str, e: &crate::error::ExporterError) {
    if e.is_cancellation() {
        info!("Discovery of {} cancelled", url);
    } else {
        error!("Discovery error for {}: {}", url, e);
    }
}
