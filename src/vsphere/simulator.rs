//! In-Memory Simulator
//!
//! A [`Backend`] that serves a fixed inventory from memory. It backs the
//! binary's demo mode (loaded from a JSON fixture) and the test suite, where
//! faults and latency can be injected and call statistics inspected.
//!
//! # Fixture Format
//!
//! ```json
//! {
//!   "objects":  [ { "type": "Datacenter", "reference": {...}, "name": "DC0" } ],
//!   "entities": [ { "reference": {...}, "name": "host", "parent": {...} } ],
//!   "counters": [ { "key": 1, "group": "cpu", "name": "usage", "rollup": "average" } ],
//!   "samples":  { "vm-1": [ { "counter_id": 1, "instance": "", "values": [42] } ] }
//! }
//! ```
//!
//! `entities` holds hierarchy members that are not enumerated themselves
//! (folders). Path patterns are accepted but not evaluated: every object of
//! the requested type matches.

use crate::error::{ExporterError, Result};
use crate::vsphere::backend::{Backend, Connection, Credentials};
use crate::vsphere::types::{
    EntityMetricSeries, InventoryObject, ManagedEntity, ManagedObjectReference, MetricSeries,
    PerfCounterInfo, PerfQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorInventory {
    #[serde(default)]
    pub objects: Vec<InventoryObject>,
    #[serde(default)]
    pub entities: Vec<ManagedEntity>,
    #[serde(default)]
    pub counters: Vec<PerfCounterInfo>,
    /// Entity value → series returned for it
    #[serde(default)]
    pub samples: HashMap<String, Vec<MetricSeries>>,
}

impl SimulatorInventory {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn entity(&self, reference: &ManagedObjectReference) -> Option<ManagedEntity> {
        self.objects
            .iter()
            .find(|o| o.reference() == reference)
            .map(InventoryObject::as_entity)
            .or_else(|| {
                self.entities
                    .iter()
                    .find(|e| &e.reference == reference)
                    .cloned()
            })
    }
}

/// Injected failures. Counters decrement on each failure they cause.
#[derive(Debug, Default)]
pub struct SimulatorFaults {
    pub connect_failures: AtomicUsize,
    pub probe_failures: AtomicUsize,
    pub login_failures: AtomicUsize,
    /// Back-end type names whose enumeration fails
    pub failing_types: Mutex<HashSet<String>>,
    /// Entity values whose presence in a sample query fails the query
    pub failing_entities: Mutex<HashSet<String>>,
    /// Entity values whose `entity` lookup fails
    pub failing_lookups: Mutex<HashSet<String>>,
    pub sample_latency: Mutex<Duration>,
    pub counter_latency: Mutex<Duration>,
}

/// Call statistics.
#[derive(Debug, Default)]
pub struct SimulatorStats {
    pub connects: AtomicUsize,
    pub logins: AtomicUsize,
    pub probes: AtomicUsize,
    pub entity_lookups: AtomicUsize,
    pub in_flight_samples: AtomicUsize,
    pub peak_in_flight_samples: AtomicUsize,
    /// Entities covered by each sample query, in completion order
    pub sample_queries: Mutex<Vec<Vec<ManagedObjectReference>>>,
}

impl SimulatorStats {
    pub fn sample_query_count(&self) -> usize {
        self.sample_queries.lock().map(|q| q.len()).unwrap_or_default()
    }

    /// Sample queries whose entities are all of `object_type`.
    pub fn queries_for_type(&self, object_type: &str) -> Vec<Vec<ManagedObjectReference>> {
        self.sample_queries
            .lock()
            .map(|queries| {
                queries
                    .iter()
                    .filter(|q| q.iter().all(|r| r.kind == object_type))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn reset_sample_queries(&self) {
        if let Ok(mut queries) = self.sample_queries.lock() {
            queries.clear();
        }
    }
}

#[derive(Clone, Default)]
pub struct Simulator {
    inventory: Arc<RwLock<SimulatorInventory>>,
    faults: Arc<SimulatorFaults>,
    stats: Arc<SimulatorStats>,
}

impl Simulator {
    pub fn new(inventory: SimulatorInventory) -> Self {
        Self {
            inventory: Arc::new(RwLock::new(inventory)),
            faults: Arc::new(SimulatorFaults::default()),
            stats: Arc::new(SimulatorStats::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(SimulatorInventory::from_file(path)?))
    }

    pub fn faults(&self) -> &SimulatorFaults {
        &self.faults
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    /// Replace the served inventory, e.g. to simulate back-end changes.
    pub fn set_inventory(&self, inventory: SimulatorInventory) {
        if let Ok(mut current) = self.inventory.write() {
            *current = inventory;
        }
    }

    pub fn fail_type(&self, object_type: &str) {
        insert(&self.faults.failing_types, object_type);
    }

    pub fn clear_failing_types(&self) {
        if let Ok(mut types) = self.faults.failing_types.lock() {
            types.clear();
        }
    }

    pub fn fail_sampling_of(&self, entity_value: &str) {
        insert(&self.faults.failing_entities, entity_value);
    }

    pub fn fail_lookup_of(&self, entity_value: &str) {
        insert(&self.faults.failing_lookups, entity_value);
    }

    pub fn set_sample_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.faults.sample_latency.lock() {
            *current = latency;
        }
    }

    /// Delay both counter catalog lookups.
    pub fn set_counter_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.faults.counter_latency.lock() {
            *current = latency;
        }
    }
}

fn insert(set: &Mutex<HashSet<String>>, value: &str) {
    if let Ok(mut set) = set.lock() {
        set.insert(value.to_string());
    }
}

fn contains(set: &Mutex<HashSet<String>>, value: &str) -> bool {
    set.lock().map(|s| s.contains(value)).unwrap_or(false)
}

async fn delay(latency: &Mutex<Duration>) {
    let latency = latency.lock().map(|l| *l).unwrap_or_default();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Decrement `counter` if positive; true when a failure should be injected.
fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn poisoned() -> ExporterError {
    ExporterError::Api("simulator state poisoned".to_string())
}

#[async_trait]
impl Backend for Simulator {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Connection>> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.faults.connect_failures) {
            return Err(ExporterError::Api(format!("{} refused connection", url)));
        }
        Ok(Arc::new(SimulatorConnection {
            simulator: self.clone(),
        }))
    }
}

struct SimulatorConnection {
    simulator: Simulator,
}

/// Decrements the in-flight gauge when a sample query ends, however it ends.
struct InFlight<'a>(&'a SimulatorStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a SimulatorStats) -> Self {
        let now = stats.in_flight_samples.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_in_flight_samples.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight_samples.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for SimulatorConnection {
    async fn login(&self, credentials: &Credentials) -> Result<()> {
        self.simulator.stats.logins.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.simulator.faults.login_failures) {
            return Err(ExporterError::Api(format!(
                "login rejected for user {:?}",
                credentials.username
            )));
        }
        Ok(())
    }

    async fn current_time(&self) -> Result<DateTime<Utc>> {
        self.simulator.stats.probes.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.simulator.faults.probe_failures) {
            return Err(ExporterError::Api("NotAuthenticated".to_string()));
        }
        Ok(Utc::now())
    }

    async fn find_objects(
        &self,
        object_type: &str,
        _paths: &[String],
    ) -> Result<Vec<InventoryObject>> {
        if contains(&self.simulator.faults.failing_types, object_type) {
            return Err(ExporterError::Api(format!(
                "enumeration of {} failed",
                object_type
            )));
        }
        let inventory = self.simulator.inventory.read().map_err(|_| poisoned())?;
        Ok(inventory
            .objects
            .iter()
            .filter(|o| o.type_name() == object_type)
            .cloned()
            .collect())
    }

    async fn entity(&self, reference: &ManagedObjectReference) -> Result<ManagedEntity> {
        self.simulator
            .stats
            .entity_lookups
            .fetch_add(1, Ordering::SeqCst);
        if contains(&self.simulator.faults.failing_lookups, &reference.value) {
            return Err(ExporterError::Api(format!("lookup of {} failed", reference)));
        }
        let inventory = self.simulator.inventory.read().map_err(|_| poisoned())?;
        inventory
            .entity(reference)
            .ok_or_else(|| ExporterError::Api(format!("managed object {} not found", reference)))
    }

    async fn counters_by_key(&self) -> Result<HashMap<i32, PerfCounterInfo>> {
        delay(&self.simulator.faults.counter_latency).await;
        let inventory = self.simulator.inventory.read().map_err(|_| poisoned())?;
        Ok(inventory
            .counters
            .iter()
            .map(|c| (c.key, c.clone()))
            .collect())
    }

    async fn counters_by_name(&self) -> Result<HashMap<String, PerfCounterInfo>> {
        delay(&self.simulator.faults.counter_latency).await;
        let inventory = self.simulator.inventory.read().map_err(|_| poisoned())?;
        Ok(inventory
            .counters
            .iter()
            .map(|c| (c.full_name(), c.clone()))
            .collect())
    }

    async fn query_samples(&self, query: &PerfQuery) -> Result<Vec<EntityMetricSeries>> {
        let stats = &self.simulator.stats;
        let _in_flight = InFlight::enter(stats);

        delay(&self.simulator.faults.sample_latency).await;

        if let Ok(mut queries) = stats.sample_queries.lock() {
            queries.push(query.entities.clone());
        }

        if let Some(failing) = query
            .entities
            .iter()
            .find(|e| contains(&self.simulator.faults.failing_entities, &e.value))
        {
            return Err(ExporterError::Api(format!(
                "sample query including {} failed",
                failing
            )));
        }

        let inventory = self.simulator.inventory.read().map_err(|_| poisoned())?;
        let result = query
            .entities
            .iter()
            .filter_map(|entity| {
                let series = inventory.samples.get(&entity.value)?;
                let values: Vec<MetricSeries> = series
                    .iter()
                    .filter(|s| {
                        query.metrics.iter().any(|m| {
                            m.counter_id == s.counter_id
                                && (m.instance == "*" || m.instance == s.instance)
                        })
                    })
                    .cloned()
                    .collect();
                Some(EntityMetricSeries {
                    entity: entity.clone(),
                    values,
                })
            })
            .collect();
        Ok(result)
    }
}
