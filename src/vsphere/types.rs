//! vSphere Type Definitions
//!
//! Typed records exchanged with the back end. The remote object model is not
//! reproduced; these structs carry only what discovery and sampling consume.
//!
//! # Records Covered
//!
//! - object enumeration → [`InventoryObject`] and its per-type records
//! - parent resolution → [`ManagedEntity`]
//! - counter catalog → [`PerfCounterInfo`]
//! - sample queries → [`PerfQuery`], [`EntityMetricSeries`], [`MetricSeries`]
//!
//! All types derive serde so the simulator can load them from JSON fixtures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, back-end-assigned object handle (`type` + stable `value`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagedObjectReference {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectReference {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ManagedObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// The `name` and `parent` properties of any entity in the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedEntity {
    pub reference: ManagedObjectReference,
    pub name: String,
    #[serde(default)]
    pub parent: Option<ManagedObjectReference>,
}

/// One enumerated inventory record, tagged by back-end type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InventoryObject {
    Datacenter(DatacenterRecord),
    ClusterComputeResource(ClusterRecord),
    HostSystem(HostRecord),
    VirtualMachine(VirtualMachineRecord),
    Datastore(DatastoreRecord),
}

impl InventoryObject {
    pub fn reference(&self) -> &ManagedObjectReference {
        match self {
            InventoryObject::Datacenter(r) => &r.reference,
            InventoryObject::ClusterComputeResource(r) => &r.reference,
            InventoryObject::HostSystem(r) => &r.reference,
            InventoryObject::VirtualMachine(r) => &r.reference,
            InventoryObject::Datastore(r) => &r.reference,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            InventoryObject::Datacenter(r) => &r.name,
            InventoryObject::ClusterComputeResource(r) => &r.name,
            InventoryObject::HostSystem(r) => &r.name,
            InventoryObject::VirtualMachine(r) => &r.name,
            InventoryObject::Datastore(r) => &r.name,
        }
    }

    /// The hierarchy parent (folder, cluster, ...). VMs report their folder here;
    /// the runtime host is a separate field.
    pub fn parent(&self) -> Option<&ManagedObjectReference> {
        match self {
            InventoryObject::Datacenter(r) => r.parent.as_ref(),
            InventoryObject::ClusterComputeResource(r) => r.parent.as_ref(),
            InventoryObject::HostSystem(r) => r.parent.as_ref(),
            InventoryObject::VirtualMachine(r) => r.parent.as_ref(),
            InventoryObject::Datastore(r) => r.parent.as_ref(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            InventoryObject::Datacenter(_) => "Datacenter",
            InventoryObject::ClusterComputeResource(_) => "ClusterComputeResource",
            InventoryObject::HostSystem(_) => "HostSystem",
            InventoryObject::VirtualMachine(_) => "VirtualMachine",
            InventoryObject::Datastore(_) => "Datastore",
        }
    }

    pub fn as_entity(&self) -> ManagedEntity {
        ManagedEntity {
            reference: self.reference().clone(),
            name: self.name().to_string(),
            parent: self.parent().cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacenterRecord {
    pub reference: ManagedObjectReference,
    pub name: String,
    #[serde(default)]
    pub parent: Option<ManagedObjectReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub reference: ManagedObjectReference,
    pub name: String,
    /// Usually the datacenter's `host` folder
    #[serde(default)]
    pub parent: Option<ManagedObjectReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub reference: ManagedObjectReference,
    pub name: String,
    #[serde(default)]
    pub parent: Option<ManagedObjectReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineRecord {
    pub reference: ManagedObjectReference,
    pub name: String,
    #[serde(default)]
    pub parent: Option<ManagedObjectReference>,
    pub runtime: VirtualMachineRuntime,
    #[serde(default)]
    pub guest: Option<GuestInfo>,
    #[serde(default)]
    pub config: Option<VirtualMachineConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineRuntime {
    pub power_state: String,
    #[serde(default)]
    pub host: Option<ManagedObjectReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GuestInfo {
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub net: Vec<GuestNicInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestNicInfo {
    /// -1 for adapters not backed by a configured device
    pub device_config_id: i32,
    /// Absent when the guest tools report no IP stack for the adapter
    #[serde(default)]
    pub ip_addresses: Option<Vec<GuestIpAddress>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestIpAddress {
    pub ip_address: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineConfig {
    pub guest_id: String,
    #[serde(default)]
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreRecord {
    pub reference: ManagedObjectReference,
    pub name: String,
    #[serde(default)]
    pub parent: Option<ManagedObjectReference>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Performance counter definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfCounterInfo {
    pub key: i32,
    pub group: String,
    pub name: String,
    pub rollup: String,
    #[serde(default)]
    pub unit: String,
}

impl PerfCounterInfo {
    /// Dotted name, e.g. `cpu.usage.average`.
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.group, self.name, self.rollup)
    }
}

/// Counter selector. `instance` is `"*"` for every instance, `""` for the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerfMetricId {
    pub counter_id: i32,
    pub instance: String,
}

/// One sample request covering a chunk of entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfQuery {
    pub entities: Vec<ManagedObjectReference>,
    pub metrics: Vec<PerfMetricId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Sampling interval in seconds
    pub interval_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetricSeries {
    pub entity: ManagedObjectReference,
    #[serde(default)]
    pub values: Vec<MetricSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub counter_id: i32,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub values: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_display_is_type_colon_value() {
        let r = ManagedObjectReference::new("VirtualMachine", "vm-42");
        assert_eq!(r.to_string(), "VirtualMachine:vm-42");
    }

    #[test]
    fn counter_full_name_is_dotted() {
        let c = PerfCounterInfo {
            key: 6,
            group: "cpu".to_string(),
            name: "usage".to_string(),
            rollup: "average".to_string(),
            unit: "percent".to_string(),
        };
        assert_eq!(c.full_name(), "cpu.usage.average");
    }

    #[test]
    fn inventory_object_is_tagged_by_type() {
        let json = r#"{
            "type": "Datacenter",
            "reference": {"type": "Datacenter", "value": "datacenter-1"},
            "name": "DC0"
        }"#;
        let obj: InventoryObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.type_name(), "Datacenter");
        assert_eq!(obj.name(), "DC0");
        assert!(obj.parent().is_none());
    }
}
