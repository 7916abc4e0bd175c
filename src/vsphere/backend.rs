//! Back-End Capabilities
//!
//! The exporter treats vSphere as two abstract capabilities: a [`Backend`] that
//! opens connections, and a [`Connection`] that answers inventory and
//! performance queries. Wire protocol details live behind these traits.
//!
//! Implementations do not need to enforce timeouts; the session layer bounds
//! every call through [`crate::context::CallContext`].

use crate::error::Result;
use crate::vsphere::types::{
    EntityMetricSeries, InventoryObject, ManagedEntity, ManagedObjectReference, PerfCounterInfo,
    PerfQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;

/// Login credentials for one endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Anonymous connections skip the initial login.
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

/// Opens connections to one kind of back end.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open an unauthenticated connection to `url`.
    async fn connect(&self, url: &str) -> Result<Arc<dyn Connection>>;
}

/// One open connection. Shared by concurrent readers once authenticated.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Authenticate (or re-authenticate) this connection.
    async fn login(&self, credentials: &Credentials) -> Result<()>;

    /// Trivial call used to probe session liveness.
    async fn current_time(&self) -> Result<DateTime<Utc>>;

    /// Enumerate objects of `object_type` under the hierarchy `paths`.
    async fn find_objects(
        &self,
        object_type: &str,
        paths: &[String],
    ) -> Result<Vec<InventoryObject>>;

    /// Name and parent of any entity, folders included.
    async fn entity(&self, reference: &ManagedObjectReference) -> Result<ManagedEntity>;

    async fn counters_by_key(&self) -> Result<HashMap<i32, PerfCounterInfo>>;

    async fn counters_by_name(&self) -> Result<HashMap<String, PerfCounterInfo>>;

    async fn query_samples(&self, query: &PerfQuery) -> Result<Vec<EntityMetricSeries>>;
}
