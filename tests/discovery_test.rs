//! Inventory discovery tests
//!
//! Enumeration, datacenter resolution, atomic publication and idempotence.

mod common;

use common::{exporter, only, small_inventory, test_config, InventoryBuilder, CPU_USAGE};
use vsphere_exporter::context::CallContext;
use vsphere_exporter::vsphere::inventory::ResourceKindId;
use vsphere_exporter::vsphere::Simulator;

#[tokio::test]
async fn test_discovery_publishes_every_kind() {
    // Given: The small inventory and default configuration
    let simulator = Simulator::new(small_inventory());
    let exporter = exporter(&test_config(), &simulator);

    // When: Running discovery
    let summary = exporter.ensure_inventory(&CallContext::new()).await.unwrap();

    // Then: Every kind was published, powered-off machines excluded
    let endpoint = exporter.endpoint();
    assert_eq!(endpoint.inventory(ResourceKindId::Datacenter).await.objects.len(), 1);
    assert_eq!(endpoint.inventory(ResourceKindId::Cluster).await.objects.len(), 1);
    assert_eq!(endpoint.inventory(ResourceKindId::Host).await.objects.len(), 1);
    assert_eq!(endpoint.inventory(ResourceKindId::Vm).await.objects.len(), 1);
    assert_eq!(endpoint.inventory(ResourceKindId::Datastore).await.objects.len(), 1);
    assert_eq!(summary.total(), 5);
}

#[tokio::test]
async fn test_objects_resolve_their_datacenter() {
    // Given: A VM on a host inside a cluster inside DC0
    let simulator = Simulator::new(small_inventory());
    let exporter = exporter(&test_config(), &simulator);

    // When: Running discovery
    exporter.ensure_inventory(&CallContext::new()).await.unwrap();

    // Then: Each kind found DC0 through its parent chain
    let endpoint = exporter.endpoint();
    let vm = endpoint.inventory(ResourceKindId::Vm).await;
    let web = &vm.objects["vm-41"];
    assert_eq!(web.name, "web-01");
    assert_eq!(web.dc_name, "DC0");
    assert_eq!(web.guest, "otherLinux64");
    assert_eq!(web.alt_id, "uuid-vm-41");

    let host = endpoint.inventory(ResourceKindId::Host).await;
    assert_eq!(host.objects["host-21"].dc_name, "DC0");

    let cluster = endpoint.inventory(ResourceKindId::Cluster).await;
    let c0 = &cluster.objects["domain-c7"];
    assert_eq!(c0.dc_name, "DC0");
    assert_eq!(c0.parent_ref.as_ref().map(|r| r.value.as_str()), Some("datacenter-2"));

    let datastore = endpoint.inventory(ResourceKindId::Datastore).await;
    let ds = &datastore.objects["datastore-15"];
    assert_eq!(ds.dc_name, "DC0");
    assert_eq!(ds.alt_id, "ds:///vmfs/volumes/datastore-15/");
}

#[tokio::test]
async fn test_failed_parent_lookup_leaves_datacenter_empty() {
    // Given: The host folder cannot be looked up
    let simulator = Simulator::new(small_inventory());
    simulator.fail_lookup_of("group-h4");
    let exporter = exporter(&test_config(), &simulator);

    // When: Running discovery
    let result = exporter.ensure_inventory(&CallContext::new()).await;

    // Then: Discovery still succeeds; the cluster has no datacenter
    assert!(result.is_ok());
    let cluster = exporter.endpoint().inventory(ResourceKindId::Cluster).await;
    let c0 = &cluster.objects["domain-c7"];
    assert!(c0.parent_ref.is_none());
    assert_eq!(c0.dc_name, "");
}

#[tokio::test]
async fn test_disabled_kinds_get_no_counters() {
    // Given: Only virtual machines enabled
    let mut config = test_config();
    only(&mut config, "vm");
    let simulator = Simulator::new(small_inventory());
    let exporter = exporter(&config, &simulator);

    // When: Running discovery
    exporter.ensure_inventory(&CallContext::new()).await.unwrap();

    // Then: Ancestors were still enumerated, but only vm has counters
    let endpoint = exporter.endpoint();
    let host = endpoint.inventory(ResourceKindId::Host).await;
    assert_eq!(host.objects.len(), 1);
    assert!(host.metrics.is_empty());

    let vm = endpoint.inventory(ResourceKindId::Vm).await;
    assert_eq!(vm.objects["vm-41"].dc_name, "DC0");
    assert_eq!(vm.metrics.len(), 2);
    assert!(vm.metrics.iter().all(|m| m.instance == "*"));

    // Leaf kinds that are disabled are not enumerated at all
    let datastore = endpoint.inventory(ResourceKindId::Datastore).await;
    assert!(datastore.objects.is_empty());
}

#[tokio::test]
async fn test_aggregate_kinds_request_empty_instance() {
    // Given: Datastores configured without instances
    let mut config = test_config();
    only(&mut config, "datastore");
    let simulator = Simulator::new(small_inventory());
    let exporter = exporter(&config, &simulator);

    // When: Running discovery
    exporter.ensure_inventory(&CallContext::new()).await.unwrap();

    // Then: Every requested counter targets the aggregate
    let datastore = exporter.endpoint().inventory(ResourceKindId::Datastore).await;
    assert!(!datastore.metrics.is_empty());
    assert!(datastore.metrics.iter().all(|m| m.instance.is_empty()));
}

#[tokio::test]
async fn test_repeated_discovery_is_idempotent() {
    // Given: An unchanged back end
    let simulator = Simulator::new(small_inventory());
    let exporter = exporter(&test_config(), &simulator);
    let ctx = CallContext::new();

    // When: Discovering twice
    exporter.ensure_inventory(&ctx).await.unwrap();
    let first = exporter.endpoint().inventory_snapshot().await;
    exporter.ensure_inventory(&ctx).await.unwrap();
    let second = exporter.endpoint().inventory_snapshot().await;

    // Then: Both generations hold the same objects and counters
    for id in ResourceKindId::ALL {
        assert_eq!(first[&id].objects, second[&id].objects, "{id} objects differ");
        assert_eq!(first[&id].metrics, second[&id].metrics, "{id} counters differ");
    }
}

#[tokio::test]
async fn test_failed_kind_keeps_previous_generation() {
    // Given: A published generation, then a back end that grew and broke
    let simulator = Simulator::new(small_inventory());
    let exporter = exporter(&test_config(), &simulator);
    let ctx = CallContext::new();
    exporter.ensure_inventory(&ctx).await.unwrap();

    simulator.set_inventory(
        InventoryBuilder::new()
            .cluster("domain-c7", "DC0_C0")
            .host("host-21", "esx-01", "domain-c7")
            .host("host-22", "esx-02", "domain-c7")
            .vm("vm-41", "web-01", "host-21", "poweredOn")
            .vm("vm-42", "db-01", "host-22", "poweredOn")
            .datastore("datastore-15", "LocalDS_0")
            .sample("vm-41", CPU_USAGE, "", vec![1])
            .build(),
    );
    simulator.fail_type("Datastore");

    // When: Discovering again
    let result = exporter.ensure_inventory(&ctx).await;

    // Then: The cycle failed and no kind moved to the new generation
    assert!(result.is_err());
    let endpoint = exporter.endpoint();
    assert_eq!(endpoint.inventory(ResourceKindId::Host).await.objects.len(), 1);
    assert_eq!(endpoint.inventory(ResourceKindId::Vm).await.objects.len(), 1);

    // And: Once the fault clears, the new generation is published
    simulator.clear_failing_types();
    exporter.ensure_inventory(&ctx).await.unwrap();
    assert_eq!(endpoint.inventory(ResourceKindId::Host).await.objects.len(), 2);
    assert_eq!(endpoint.inventory(ResourceKindId::Vm).await.objects.len(), 2);
}

#[tokio::test]
async fn test_cancelled_discovery_publishes_nothing() {
    // Given: A cancelled context
    let simulator = Simulator::new(small_inventory());
    let exporter = exporter(&test_config(), &simulator);
    let ctx = CallContext::new();
    ctx.cancel();

    // When: Running discovery
    let result = exporter.ensure_inventory(&ctx).await;

    // Then: It reports cancellation and the inventory stays empty
    assert!(result.unwrap_err().is_cancellation());
    let snapshot = exporter.endpoint().inventory_snapshot().await;
    assert!(snapshot.values().all(|generation| generation.objects.is_empty()));
}

#[tokio::test]
async fn test_catalog_stays_readable_while_counters_are_fetched() {
    // Given: A discovered endpoint whose counter lookups have become slow
    let simulator = Simulator::new(small_inventory());
    let exporter = std::sync::Arc::new(exporter(&test_config(), &simulator));
    exporter.ensure_inventory(&CallContext::new()).await.unwrap();
    simulator.set_counter_latency(std::time::Duration::from_millis(300));

    // When: A second discovery is fetching counters
    let background = exporter.clone();
    let rediscovery =
        tokio::spawn(async move { background.ensure_inventory(&CallContext::new()).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Then: Readers still get the previous table without waiting on the fetch
    let snapshot = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        exporter.endpoint().catalog().snapshot(),
    )
    .await
    .expect("snapshot blocked behind a catalog refresh");
    assert!(snapshot.by_key(CPU_USAGE).is_some());
    assert!(!rediscovery.is_finished());

    rediscovery.await.unwrap().unwrap();
}
