//! Shared test fixtures: configuration and simulator inventories.

#![allow(dead_code)]

use secrecy::SecretString;
use std::sync::Arc;
use vsphere_exporter::config::{
    BackendConfig, Config, DiscoveryConfig, KindConfig, MetricsConfig, SamplingConfig,
    ServerConfig, VSphereConfig,
};
use vsphere_exporter::exporter::VSphereExporter;
use vsphere_exporter::metrics::MetricsCollector;
use vsphere_exporter::vsphere::simulator::SimulatorInventory;
use vsphere_exporter::vsphere::types::{
    ClusterRecord, DatacenterRecord, DatastoreRecord, HostRecord, InventoryObject,
    ManagedEntity, ManagedObjectReference, MetricSeries, PerfCounterInfo, VirtualMachineConfig,
    VirtualMachineRecord, VirtualMachineRuntime,
};
use vsphere_exporter::vsphere::Simulator;

pub const CPU_USAGE: i32 = 2;
pub const MEM_USAGE: i32 = 24;

pub fn test_config() -> Config {
    Config {
        vsphere: VSphereConfig {
            url: "https://vcsim.test/sdk".to_string(),
            username: "admin".to_string(),
            password: SecretString::from("secret".to_string()),
            timeout_seconds: 5,
        },
        server: ServerConfig::default(),
        discovery: DiscoveryConfig::default(),
        sampling: SamplingConfig::default(),
        metrics: MetricsConfig::default(),
        backend: BackendConfig::default(),
    }
}

/// Only `kind` enabled; every other kind disabled.
pub fn only(config: &mut Config, kind: &str) {
    let off = KindConfig {
        enabled: false,
        instances: false,
    };
    let resources = &mut config.discovery.resources;
    resources.datacenter = off;
    resources.cluster = off;
    resources.host = off;
    resources.vm = off;
    resources.datastore = off;
    match kind {
        "datacenter" => resources.datacenter = KindConfig::aggregate(),
        "cluster" => resources.cluster = KindConfig::aggregate(),
        "host" => resources.host = KindConfig::per_instance(),
        "vm" => resources.vm = KindConfig::per_instance(),
        "datastore" => resources.datastore = KindConfig::aggregate(),
        other => panic!("unknown kind {}", other),
    }
}

pub fn exporter(config: &Config, simulator: &Simulator) -> VSphereExporter {
    let metrics = MetricsCollector::new().expect("Failed to create metrics");
    VSphereExporter::new(config, Arc::new(simulator.clone()), metrics)
}

fn moref(kind: &str, value: &str) -> ManagedObjectReference {
    ManagedObjectReference::new(kind, value)
}

fn counter(key: i32, group: &str, name: &str, rollup: &str, unit: &str) -> PerfCounterInfo {
    PerfCounterInfo {
        key,
        group: group.to_string(),
        name: name.to_string(),
        rollup: rollup.to_string(),
        unit: unit.to_string(),
    }
}

/// Builds a one-datacenter inventory: `DC0` with its `host`, `vm` and
/// `datastore` folders and two counters (cpu and memory usage).
pub struct InventoryBuilder {
    inventory: SimulatorInventory,
}

impl InventoryBuilder {
    pub fn new() -> Self {
        let mut inventory = SimulatorInventory::default();
        inventory.objects.push(InventoryObject::Datacenter(DatacenterRecord {
            reference: moref("Datacenter", "datacenter-2"),
            name: "DC0".to_string(),
            parent: Some(moref("Folder", "group-d1")),
        }));
        inventory.entities = vec![
            ManagedEntity {
                reference: moref("Folder", "group-d1"),
                name: "Datacenters".to_string(),
                parent: None,
            },
            folder("group-h4", "host"),
            folder("group-v3", "vm"),
            folder("group-s5", "datastore"),
        ];
        inventory.counters = vec![
            counter(CPU_USAGE, "cpu", "usage", "average", "percent"),
            counter(MEM_USAGE, "mem", "usage", "average", "percent"),
        ];
        Self { inventory }
    }

    pub fn cluster(mut self, value: &str, name: &str) -> Self {
        self.inventory
            .objects
            .push(InventoryObject::ClusterComputeResource(ClusterRecord {
                reference: moref("ClusterComputeResource", value),
                name: name.to_string(),
                parent: Some(moref("Folder", "group-h4")),
            }));
        self
    }

    pub fn host(mut self, value: &str, name: &str, cluster: &str) -> Self {
        self.inventory.objects.push(InventoryObject::HostSystem(HostRecord {
            reference: moref("HostSystem", value),
            name: name.to_string(),
            parent: Some(moref("ClusterComputeResource", cluster)),
        }));
        self
    }

    pub fn vm(mut self, value: &str, name: &str, host: &str, power_state: &str) -> Self {
        self.inventory
            .objects
            .push(InventoryObject::VirtualMachine(VirtualMachineRecord {
                reference: moref("VirtualMachine", value),
                name: name.to_string(),
                parent: Some(moref("Folder", "group-v3")),
                runtime: VirtualMachineRuntime {
                    power_state: power_state.to_string(),
                    host: Some(moref("HostSystem", host)),
                },
                guest: None,
                config: Some(VirtualMachineConfig {
                    guest_id: "otherLinux64Guest".to_string(),
                    uuid: format!("uuid-{}", value),
                }),
            }));
        self
    }

    pub fn datastore(mut self, value: &str, name: &str) -> Self {
        self.inventory.objects.push(InventoryObject::Datastore(DatastoreRecord {
            reference: moref("Datastore", value),
            name: name.to_string(),
            parent: Some(moref("Folder", "group-s5")),
            url: Some(format!("ds:///vmfs/volumes/{}/", value)),
        }));
        self
    }

    /// `count` datastores `datastore-0..count`, each with a cpu sample.
    pub fn datastores(mut self, count: usize) -> Self {
        for i in 0..count {
            let value = format!("datastore-{}", i);
            self = self
                .datastore(&value, &format!("DS_{}", i))
                .sample(&value, CPU_USAGE, "", vec![i as i64]);
        }
        self
    }

    pub fn sample(mut self, entity: &str, counter_id: i32, instance: &str, values: Vec<i64>) -> Self {
        self.inventory
            .samples
            .entry(entity.to_string())
            .or_default()
            .push(MetricSeries {
                counter_id,
                instance: instance.to_string(),
                values,
            });
        self
    }

    pub fn build(self) -> SimulatorInventory {
        self.inventory
    }
}

impl Default for InventoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn folder(value: &str, name: &str) -> ManagedEntity {
    ManagedEntity {
        reference: moref("Folder", value),
        name: name.to_string(),
        parent: Some(moref("Datacenter", "datacenter-2")),
    }
}

/// One cluster, one host, one powered-on and one powered-off VM, one datastore.
pub fn small_inventory() -> SimulatorInventory {
    InventoryBuilder::new()
        .cluster("domain-c7", "DC0_C0")
        .host("host-21", "esx-01", "domain-c7")
        .vm("vm-41", "web-01", "host-21", "poweredOn")
        .vm("vm-43", "template-01", "host-21", "poweredOff")
        .datastore("datastore-15", "LocalDS_0")
        .sample("vm-41", CPU_USAGE, "", vec![512, 498])
        .sample("host-21", CPU_USAGE, "", vec![1834])
        .sample("datastore-15", CPU_USAGE, "", vec![7])
        .build()
}
