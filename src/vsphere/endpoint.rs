//! Endpoint State
//!
//! Everything the exporter knows about one monitored vCenter: its session,
//! counter catalog, resource-kind policies and the published inventory
//! generation. The endpoint is created once at startup and shared by handle
//! between the discoverer and the scheduler.
//!
//! # Locking
//!
//! - `inventory` (RwLock): discovery swaps a whole generation under the write
//!   side; the scheduler clones the current generation under the read side.
//! - `busy` (Mutex): single-flight discovery.
//! - the session and the catalog carry their own locks.

use crate::config::{Config, IpFamily};
use crate::vsphere::backend::{Backend, Credentials};
use crate::vsphere::catalog::MetricCatalog;
use crate::vsphere::inventory::{KindInventory, ResourceKind, ResourceKindId};
use crate::vsphere::session::SessionManager;
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

pub struct Endpoint {
    url: String,
    ip_families: Vec<IpFamily>,
    kinds: BTreeMap<ResourceKindId, ResourceKind>,
    sessions: SessionManager,
    catalog: MetricCatalog,
    inventory: RwLock<BTreeMap<ResourceKindId, KindInventory>>,
    busy: Mutex<()>,
}

impl Endpoint {
    pub fn new(config: &Config, backend: Arc<dyn Backend>) -> Self {
        let credentials = Credentials::new(
            config.vsphere.username.clone(),
            config.vsphere.password.expose_secret().to_string(),
        );
        let timeout = config.vsphere.timeout();

        let kinds = ResourceKindId::ALL
            .into_iter()
            .map(|id| {
                let kind = ResourceKind::new(
                    id,
                    id.config(&config.discovery.resources),
                    config.sampling.historical_interval(),
                );
                (id, kind)
            })
            .collect();

        let inventory = ResourceKindId::ALL
            .into_iter()
            .map(|id| (id, KindInventory::default()))
            .collect();

        Self {
            url: config.vsphere.url.clone(),
            ip_families: config.discovery.ip_addresses.clone(),
            kinds,
            sessions: SessionManager::new(backend, config.vsphere.url.clone(), credentials, timeout),
            catalog: MetricCatalog::new(),
            inventory: RwLock::new(inventory),
            busy: Mutex::new(()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ip_families(&self) -> &[IpFamily] {
        &self.ip_families
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn kind(&self, id: ResourceKindId) -> &ResourceKind {
        &self.kinds[&id]
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.kinds.values()
    }

    /// Acquire the discovery lock.
    pub async fn lock_discovery(&self) -> MutexGuard<'_, ()> {
        self.busy.lock().await
    }

    /// Current published generation of one kind.
    pub async fn inventory(&self, id: ResourceKindId) -> KindInventory {
        self.inventory
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Current published generation of every kind, taken under one read lock.
    pub async fn inventory_snapshot(&self) -> BTreeMap<ResourceKindId, KindInventory> {
        self.inventory.read().await.clone()
    }

    /// Replace the listed kinds' generations in one write-locked step.
    pub async fn publish(&self, staged: Vec<(ResourceKindId, KindInventory)>) {
        let mut inventory = self.inventory.write().await;
        for (id, generation) in staged {
            inventory.insert(id, generation);
        }
    }
}
