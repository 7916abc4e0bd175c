//! Counter Catalog
//!
//! Maps counter ids to dotted names and back. Both directions are fetched
//! in one refresh and published together as an immutable [`CounterTable`],
//! so a discovery cycle or a scrape that takes a snapshot sees one
//! consistent generation.

use crate::context::CallContext;
use crate::error::Result;
use crate::vsphere::session::ClientSession;
use crate::vsphere::types::PerfCounterInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CounterTable {
    by_key: HashMap<i32, Arc<PerfCounterInfo>>,
    by_name: HashMap<String, Arc<PerfCounterInfo>>,
}

impl CounterTable {
    pub fn from_maps(
        by_key: HashMap<i32, PerfCounterInfo>,
        by_name: HashMap<String, PerfCounterInfo>,
    ) -> Self {
        Self {
            by_key: by_key.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            by_name: by_name.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        }
    }

    pub fn by_key(&self, key: i32) -> Option<&PerfCounterInfo> {
        self.by_key.get(&key).map(|c| c.as_ref())
    }

    /// Keys of every counter known by name, ascending.
    pub fn keys(&self) -> Vec<i32> {
        let mut keys: Vec<i32> = self.by_name.values().map(|c| c.key).collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Endpoint-wide counter catalog.
#[derive(Default)]
pub struct MetricCatalog {
    table: RwLock<Arc<CounterTable>>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch both lookup directions and swap them in together. The lock is
    /// held only for the swap.
    pub async fn refresh(&self, ctx: &CallContext, session: &ClientSession) -> Result<()> {
        let by_key = session.counters_by_key(ctx).await?;
        let by_name = session.counters_by_name(ctx).await?;
        let table = Arc::new(CounterTable::from_maps(by_key, by_name));

        debug!("Counter catalog refreshed with {} counters", table.len());
        *self.table.write().await = table;
        Ok(())
    }

    /// The current generation; stays consistent however long it is held.
    pub async fn snapshot(&self) -> Arc<CounterTable> {
        self.table.read().await.clone()
    }
}
