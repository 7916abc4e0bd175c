//! Session Management
//!
//! This module owns the single authenticated connection of an endpoint.
//! The session is validated on every `get_client` call with a cheap probe,
//! re-authenticated in place when the probe fails, and rebuilt from scratch
//! (once per call) when re-authentication fails too.

use crate::context::CallContext;
use crate::error::{ExporterError, Result};
use crate::vsphere::backend::{Backend, Connection, Credentials};
use crate::vsphere::types::{
    EntityMetricSeries, InventoryObject, ManagedEntity, ManagedObjectReference, PerfCounterInfo,
    PerfQuery,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// An authenticated connection plus its per-call timeout.
///
/// Sessions are never mutated after creation; a stale session is dropped and
/// replaced by the [`SessionManager`].
pub struct ClientSession {
    connection: Arc<dyn Connection>,
    timeout: Duration,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn current_time(&self, ctx: &CallContext) -> Result<DateTime<Utc>> {
        ctx.bounded("current time probe", self.timeout, self.connection.current_time())
            .await
    }

    async fn login(&self, ctx: &CallContext, credentials: &Credentials) -> Result<()> {
        ctx.bounded("login", self.timeout, self.connection.login(credentials))
            .await
    }

    pub async fn find_objects(
        &self,
        ctx: &CallContext,
        object_type: &str,
        paths: &[String],
    ) -> Result<Vec<InventoryObject>> {
        ctx.bounded(
            "object enumeration",
            self.timeout,
            self.connection.find_objects(object_type, paths),
        )
        .await
    }

    pub async fn entity(
        &self,
        ctx: &CallContext,
        reference: &ManagedObjectReference,
    ) -> Result<ManagedEntity> {
        ctx.bounded("entity lookup", self.timeout, self.connection.entity(reference))
            .await
    }

    pub async fn counters_by_key(
        &self,
        ctx: &CallContext,
    ) -> Result<HashMap<i32, PerfCounterInfo>> {
        ctx.bounded("counter lookup by key", self.timeout, self.connection.counters_by_key())
            .await
    }

    pub async fn counters_by_name(
        &self,
        ctx: &CallContext,
    ) -> Result<HashMap<String, PerfCounterInfo>> {
        ctx.bounded(
            "counter lookup by name",
            self.timeout,
            self.connection.counters_by_name(),
        )
        .await
    }

    pub async fn query_samples(
        &self,
        ctx: &CallContext,
        query: &PerfQuery,
    ) -> Result<Vec<EntityMetricSeries>> {
        ctx.bounded("sample query", self.timeout, self.connection.query_samples(query))
            .await
    }
}

/// Hands out the endpoint's session, creating or repairing it as needed.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    url: String,
    credentials: Credentials,
    timeout: Duration,
    session: Mutex<Option<Arc<ClientSession>>>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            url: url.into(),
            credentials,
            timeout,
            session: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return a usable session.
    ///
    /// The lock only serializes creation and validation; callers share the
    /// returned session for concurrent reads.
    pub async fn get_client(&self, ctx: &CallContext) -> Result<Arc<ClientSession>> {
        let mut session_guard = self.session.lock().await;
        let mut retrying = false;

        loop {
            let session = match session_guard.as_ref() {
                Some(session) => session.clone(),
                None => {
                    let session = Arc::new(self.create_session(ctx).await?);
                    *session_guard = Some(session.clone());
                    session
                }
            };

            let stale = match session.current_time(ctx).await {
                Ok(_) => return Ok(session),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => ExporterError::SessionStale(e.to_string()),
            };

            debug!("{}, re-authenticating to {}", stale, self.url);
            match session.login(ctx, &self.credentials).await {
                Ok(()) => {
                    info!("Re-authenticated to {}", self.url);
                    return Ok(session);
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) if !retrying => {
                    // Probably a restarted vCenter. Start over with a fresh connection, once.
                    warn!(
                        "Re-authentication to {} failed, rebuilding session: {}",
                        self.url, e
                    );
                    retrying = true;
                    *session_guard = None;
                }
                Err(e) => {
                    *session_guard = None;
                    return Err(ExporterError::Connection(format!(
                        "renewing authentication failed: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Drop the cached session so the next `get_client` reconnects.
    pub async fn invalidate(&self) {
        let mut session_guard = self.session.lock().await;
        if session_guard.take().is_some() {
            info!("Session to {} discarded", self.url);
        }
    }

    async fn create_session(&self, ctx: &CallContext) -> Result<ClientSession> {
        info!("Establishing session to {}...", self.url);
        let connection = ctx
            .bounded("connect", self.timeout, self.backend.connect(&self.url))
            .await
            .map_err(|e| connection_error("connecting", e))?;

        let session = ClientSession {
            connection,
            timeout: self.timeout,
        };

        if !self.credentials.is_anonymous() {
            session
                .login(ctx, &self.credentials)
                .await
                .map_err(|e| connection_error("authenticating", e))?;
            info!("Successfully authenticated to {}", self.url);
        }

        Ok(session)
    }
}

fn connection_error(step: &str, e: ExporterError) -> ExporterError {
    match e {
        ExporterError::Cancelled | ExporterError::Connection(_) => e,
        other => ExporterError::Connection(format!("{} failed: {}", step, other)),
    }
}
