//! Inventory Model
//!
//! The fixed set of resource kinds the exporter knows about, and the object
//! maps discovery publishes for each of them.
//!
//! # Resource Kinds
//!
//! | kind       | back-end type            | parent     | realtime |
//! |------------|--------------------------|------------|----------|
//! | datacenter | `Datacenter`             | -          | no       |
//! | cluster    | `ClusterComputeResource` | datacenter | no       |
//! | host       | `HostSystem`             | cluster    | yes      |
//! | vm         | `VirtualMachine`         | host       | yes      |
//! | datastore  | `Datastore`              | -          | no       |
//!
//! Static attributes live in a table ([`ResourceKindId::spec`]); the
//! configurable ones (enabled, per-instance, sampling interval) in
//! [`ResourceKind`].

use crate::config::{KindConfig, ResourcesConfig};
use crate::vsphere::types::{ManagedObjectReference, PerfMetricId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Realtime kinds are sampled at this fixed interval.
pub const REALTIME_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKindId {
    Datacenter,
    Cluster,
    Host,
    Vm,
    Datastore,
}

/// How a kind's objects are enumerated and projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enumeration {
    Datacenters,
    /// Clusters hang off a `host` folder; walk through it to the datacenter.
    ClustersViaFolder,
    Hosts,
    /// Powered-on machines only, with guest network details.
    PoweredOnVirtualMachines,
    Datastores,
}

/// Static description of a resource kind.
#[derive(Debug)]
pub struct KindSpec {
    pub id: ResourceKindId,
    pub name: &'static str,
    pub vc_name: &'static str,
    pub primary_key: &'static str,
    pub parent_tag: &'static str,
    pub parent: Option<ResourceKindId>,
    pub realtime: bool,
    pub paths: &'static [&'static str],
    pub enumeration: Enumeration,
}

static KIND_TABLE: [KindSpec; 5] = [
    KindSpec {
        id: ResourceKindId::Datacenter,
        name: "datacenter",
        vc_name: "Datacenter",
        primary_key: "dcname",
        parent_tag: "",
        parent: None,
        realtime: false,
        paths: &["/*"],
        enumeration: Enumeration::Datacenters,
    },
    KindSpec {
        id: ResourceKindId::Cluster,
        name: "cluster",
        vc_name: "ClusterComputeResource",
        primary_key: "clustername",
        parent_tag: "dcname",
        parent: Some(ResourceKindId::Datacenter),
        realtime: false,
        paths: &["/*/host/**"],
        enumeration: Enumeration::ClustersViaFolder,
    },
    KindSpec {
        id: ResourceKindId::Host,
        name: "host",
        vc_name: "HostSystem",
        primary_key: "esxhostname",
        parent_tag: "clustername",
        parent: Some(ResourceKindId::Cluster),
        realtime: true,
        paths: &["/*/host/**"],
        enumeration: Enumeration::Hosts,
    },
    KindSpec {
        id: ResourceKindId::Vm,
        name: "vm",
        vc_name: "VirtualMachine",
        primary_key: "vmname",
        parent_tag: "esxhostname",
        parent: Some(ResourceKindId::Host),
        realtime: true,
        paths: &["/*/vm/**"],
        enumeration: Enumeration::PoweredOnVirtualMachines,
    },
    KindSpec {
        id: ResourceKindId::Datastore,
        name: "datastore",
        vc_name: "Datastore",
        primary_key: "dsname",
        parent_tag: "",
        parent: None,
        realtime: false,
        paths: &["/*/datastore/**"],
        enumeration: Enumeration::Datastores,
    },
];

impl ResourceKindId {
    pub const ALL: [ResourceKindId; 5] = [
        ResourceKindId::Datacenter,
        ResourceKindId::Cluster,
        ResourceKindId::Host,
        ResourceKindId::Vm,
        ResourceKindId::Datastore,
    ];

    pub fn spec(self) -> &'static KindSpec {
        &KIND_TABLE[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    /// True when another kind names this one as its parent, so its objects
    /// are needed to resolve parent chains even with its metrics disabled.
    pub fn is_ancestor(self) -> bool {
        KIND_TABLE.iter().any(|k| k.parent == Some(self))
    }

    pub fn config(self, resources: &ResourcesConfig) -> KindConfig {
        match self {
            ResourceKindId::Datacenter => resources.datacenter,
            ResourceKindId::Cluster => resources.cluster,
            ResourceKindId::Host => resources.host,
            ResourceKindId::Vm => resources.vm,
            ResourceKindId::Datastore => resources.datastore,
        }
    }
}

impl fmt::Display for ResourceKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured policy of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    pub id: ResourceKindId,
    pub enabled: bool,
    pub collect_instances: bool,
    pub sampling: Duration,
}

impl ResourceKind {
    pub fn new(id: ResourceKindId, config: KindConfig, historical_interval: Duration) -> Self {
        let sampling = if id.spec().realtime {
            REALTIME_INTERVAL
        } else {
            historical_interval
        };
        Self {
            id,
            enabled: config.enabled,
            collect_instances: config.instances,
            sampling,
        }
    }

    pub fn spec(&self) -> &'static KindSpec {
        self.id.spec()
    }

    pub fn realtime(&self) -> bool {
        self.spec().realtime
    }

    /// Enumerated when enabled, or when needed for parent-chain resolution.
    pub fn needs_discovery(&self) -> bool {
        self.enabled || self.id.is_ancestor()
    }

    /// Instance selector for requested counters.
    pub fn instance_selector(&self) -> &'static str {
        if self.collect_instances {
            "*"
        } else {
            ""
        }
    }
}

/// One discovered inventory object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRef {
    pub name: String,
    pub alt_id: String,
    pub reference: ManagedObjectReference,
    /// `None` for roots
    pub parent_ref: Option<ManagedObjectReference>,
    pub dc_name: String,
    pub guest: String,
    pub lookup: HashMap<String, String>,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>, reference: ManagedObjectReference) -> Self {
        Self {
            name: name.into(),
            alt_id: String::new(),
            reference,
            parent_ref: None,
            dc_name: String::new(),
            guest: String::new(),
            lookup: HashMap::new(),
        }
    }
}

/// Back-end object id → object.
pub type ObjectMap = HashMap<String, ObjectRef>;

/// One published discovery generation of a kind.
#[derive(Debug, Clone, Default)]
pub struct KindInventory {
    pub objects: Arc<ObjectMap>,
    pub metrics: Arc<Vec<PerfMetricId>>,
}
