use vsphere_exporter::config::{Config, SampleValuePolicy};
use vsphere_exporter::vsphere::simulator::SimulatorInventory;

#[test]
fn test_config_load() {
    // This assumes config/Default.toml exists relative to where cargo test is run
    let config = Config::load("config/Default.toml").expect("Failed to load default config");
    assert_eq!(config.server.port, 9237);
    assert_eq!(config.sampling.value_policy, SampleValuePolicy::First);
    assert!(config.discovery.resources.vm.instances);
    assert!(!config.discovery.resources.datastore.instances);
}

#[test]
fn test_simulator_fixture_parses() {
    let inventory = SimulatorInventory::from_file("config/simulator.json")
        .expect("Failed to load simulator fixture");
    assert_eq!(inventory.objects.len(), 8);
    assert_eq!(inventory.counters.len(), 4);
    assert!(inventory.samples.contains_key("vm-41"));
}

#[test]
fn test_missing_file_falls_back_to_environment_and_fails_without_url() {
    // No file and no VSPHERE_EXPORTER__VSPHERE__URL: the required url is missing
    let result = Config::load("config/does-not-exist");
    assert!(result.is_err());
}
