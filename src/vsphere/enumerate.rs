//! Kind-Specific Enumeration
//!
//! Each [`Enumeration`] variant fetches its typed records through the session
//! and projects them into [`ObjectRef`]s.

use crate::config::IpFamily;
use crate::context::CallContext;
use crate::error::{ExporterError, Result};
use crate::vsphere::inventory::{Enumeration, KindSpec, ObjectMap, ObjectRef};
use crate::vsphere::session::ClientSession;
use crate::vsphere::types::{GuestNicInfo, InventoryObject, ManagedObjectReference, VirtualMachineRecord};
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::warn;

const POWERED_ON: &str = "poweredOn";
const PREFERRED: &str = "preferred";

/// Inputs shared by every enumeration in one discovery cycle.
pub struct EnumerationOptions<'a> {
    pub ip_families: &'a [IpFamily],
}

impl Enumeration {
    pub async fn enumerate(
        self,
        ctx: &CallContext,
        session: &ClientSession,
        spec: &KindSpec,
        options: &EnumerationOptions<'_>,
    ) -> Result<ObjectMap> {
        let paths: Vec<String> = spec.paths.iter().map(|p| p.to_string()).collect();
        let records = session.find_objects(ctx, spec.vc_name, &paths).await?;

        match self {
            Enumeration::Datacenters => project(records, spec, |record| match record {
                InventoryObject::Datacenter(r) => {
                    let mut obj = ObjectRef::new(&r.name, r.reference);
                    obj.parent_ref = r.parent;
                    obj.dc_name = r.name;
                    Some(obj)
                }
                _ => None,
            }),
            Enumeration::ClustersViaFolder => project_clusters(ctx, session, records, spec).await,
            Enumeration::Hosts => project(records, spec, |record| match record {
                InventoryObject::HostSystem(r) => {
                    let mut obj = ObjectRef::new(r.name, r.reference);
                    obj.parent_ref = r.parent;
                    Some(obj)
                }
                _ => None,
            }),
            Enumeration::PoweredOnVirtualMachines => {
                let mut objects = ObjectMap::new();
                for record in records {
                    match record {
                        InventoryObject::VirtualMachine(r) => {
                            if let Some(obj) = project_vm(r, options.ip_families) {
                                objects.insert(obj.reference.value.clone(), obj);
                            }
                        }
                        other => return Err(unexpected(spec, &other)),
                    }
                }
                Ok(objects)
            }
            Enumeration::Datastores => project(records, spec, |record| match record {
                InventoryObject::Datastore(r) => {
                    let mut obj = ObjectRef::new(r.name, r.reference);
                    obj.parent_ref = r.parent;
                    obj.alt_id = r.url.unwrap_or_default();
                    Some(obj)
                }
                _ => None,
            }),
        }
    }
}

fn project<F>(records: Vec<InventoryObject>, spec: &KindSpec, mut projection: F) -> Result<ObjectMap>
where
    F: FnMut(InventoryObject) -> Option<ObjectRef>,
{
    let mut objects = ObjectMap::with_capacity(records.len());
    for record in records {
        let type_name = record.type_name();
        match projection(record) {
            Some(obj) => {
                objects.insert(obj.reference.value.clone(), obj);
            }
            None => {
                return Err(ExporterError::Discovery(format!(
                    "unexpected {} record while enumerating {}",
                    type_name, spec.name
                )))
            }
        }
    }
    Ok(objects)
}

fn unexpected(spec: &KindSpec, record: &InventoryObject) -> ExporterError {
    ExporterError::Discovery(format!(
        "unexpected {} record while enumerating {}",
        record.type_name(),
        spec.name
    ))
}

/// The immediate parent of a cluster is a folder; its parent is the datacenter.
async fn project_clusters(
    ctx: &CallContext,
    session: &ClientSession,
    records: Vec<InventoryObject>,
    spec: &KindSpec,
) -> Result<ObjectMap> {
    let mut folder_parents: HashMap<String, Option<ManagedObjectReference>> = HashMap::new();
    let mut objects = ObjectMap::with_capacity(records.len());

    for record in records {
        let r = match record {
            InventoryObject::ClusterComputeResource(r) => r,
            other => return Err(unexpected(spec, &other)),
        };

        let parent_ref = match &r.parent {
            Some(folder) => match folder_parents.get(&folder.value) {
                Some(cached) => cached.clone(),
                None => match session.entity(ctx, folder).await {
                    Ok(entity) => {
                        folder_parents.insert(folder.value.clone(), entity.parent.clone());
                        entity.parent
                    }
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(e) => {
                        warn!("Error while getting folder parent of {}: {}", folder, e);
                        None
                    }
                },
            },
            None => None,
        };

        let mut obj = ObjectRef::new(r.name, r.reference);
        obj.parent_ref = parent_ref;
        objects.insert(obj.reference.value.clone(), obj);
    }
    Ok(objects)
}

/// `None` for machines that are not powered on.
fn project_vm(r: VirtualMachineRecord, ip_families: &[IpFamily]) -> Option<ObjectRef> {
    if r.runtime.power_state != POWERED_ON {
        return None;
    }

    let mut lookup = HashMap::new();
    if let Some(guest) = &r.guest {
        if !guest.host_name.is_empty() {
            lookup.insert("guesthostname".to_string(), guest.host_name.clone());
        }
        for nic in &guest.net {
            collect_nic_addresses(nic, ip_families, &mut lookup);
        }
    }

    let mut obj = ObjectRef::new(r.name, r.reference);
    obj.parent_ref = r.runtime.host;
    obj.guest = "unknown".to_string();
    // Config is unknown for some machines
    if let Some(config) = r.config {
        obj.guest = config
            .guest_id
            .strip_suffix("Guest")
            .unwrap_or(&config.guest_id)
            .to_string();
        obj.alt_id = config.uuid;
    }
    obj.lookup = lookup;
    Some(obj)
}

/// Adds `nic/<id>/<family>` entries, preferred address first per family.
fn collect_nic_addresses(
    nic: &GuestNicInfo,
    ip_families: &[IpFamily],
    lookup: &mut HashMap<String, String>,
) {
    if nic.device_config_id == -1 {
        return;
    }
    let Some(addresses) = &nic.ip_addresses else {
        return;
    };

    let mut by_family: Vec<(IpFamily, Vec<String>)> = Vec::new();
    for ip in addresses {
        for family in ip_families {
            if !is_family(&ip.ip_address, *family) {
                continue;
            }
            let slot = match by_family.iter().position(|(f, _)| f == family) {
                Some(slot) => slot,
                None => {
                    by_family.push((*family, Vec::new()));
                    by_family.len() - 1
                }
            };
            let list = &mut by_family[slot].1;
            if ip.state == PREFERRED {
                list.insert(0, ip.ip_address.clone());
            } else {
                list.push(ip.ip_address.clone());
            }
        }
    }

    for (family, list) in by_family {
        lookup.insert(
            format!("nic/{}/{}", nic.device_config_id, family.as_str()),
            list.join(","),
        );
    }
}

fn is_family(address: &str, family: IpFamily) -> bool {
    match family {
        IpFamily::Ipv4 => address.parse::<Ipv4Addr>().is_ok(),
        IpFamily::Ipv6 => address.parse::<Ipv6Addr>().is_ok(),
    }
}
