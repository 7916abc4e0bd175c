//! Ancestor Resolution
//!
//! Walks parent references upward one hop at a time until an entity of the
//! wanted type turns up. Every reference visited on the way is recorded in an
//! [`AncestorCache`] so sibling objects sharing a parent chain cost one lookup.

use crate::context::CallContext;
use crate::vsphere::session::ClientSession;
use crate::vsphere::types::ManagedObjectReference;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Discovery-scoped cache: reference → resolved ancestor name (empty when
/// unresolved).
#[derive(Debug, Default)]
pub struct AncestorCache {
    names: Mutex<HashMap<ManagedObjectReference, String>>,
}

impl AncestorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, reference: &ManagedObjectReference) -> Option<String> {
        self.names.lock().await.get(reference).cloned()
    }

    pub async fn record(&self, path: Vec<ManagedObjectReference>, name: &str) {
        let mut names = self.names.lock().await;
        for reference in path {
            names.insert(reference, name.to_string());
        }
    }
}

/// Name of the first entity of `target_type` at or above `start`.
///
/// Stops at a missing parent or at a lookup error; both leave the name
/// unresolved (`None`) rather than failing discovery.
pub async fn resolve_ancestor_name(
    ctx: &CallContext,
    session: &ClientSession,
    cache: &AncestorCache,
    target_type: &str,
    start: &ManagedObjectReference,
) -> Option<String> {
    let mut path = Vec::new();
    let mut here = start.clone();

    let resolved = loop {
        if let Some(name) = cache.get(&here).await {
            break name;
        }
        path.push(here.clone());

        let entity = match session.entity(ctx, &here).await {
            Ok(entity) => entity,
            Err(e) => {
                debug!("Could not resolve parent of {}, assuming none: {}", here, e);
                break String::new();
            }
        };
        if entity.reference.kind == target_type {
            break entity.name;
        }
        match entity.parent {
            Some(parent) => here = parent,
            None => {
                debug!("No {} above {} (reached {})", target_type, start, here);
                break String::new();
            }
        }
    };

    cache.record(path, &resolved).await;
    if resolved.is_empty() {
        None
    } else {
        Some(resolved)
    }
}
