use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub vsphere: VSphereConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VSphereConfig {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: SecretString,
    /// Upper bound for every single remote call
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// 0 means discover inline before every scrape
    #[serde(default)]
    pub interval_seconds: u64,
    #[serde(default = "default_ip_families")]
    pub ip_addresses: Vec<IpFamily>,
    #[serde(default)]
    pub resources: ResourcesConfig,
}

/// Per-kind toggles.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct KindConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub instances: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResourcesConfig {
    #[serde(default = "KindConfig::aggregate")]
    pub datacenter: KindConfig,
    #[serde(default = "KindConfig::aggregate")]
    pub cluster: KindConfig,
    #[serde(default = "KindConfig::per_instance")]
    pub host: KindConfig,
    #[serde(default = "KindConfig::per_instance")]
    pub vm: KindConfig,
    #[serde(default = "KindConfig::aggregate")]
    pub datastore: KindConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    Ipv4,
    Ipv6,
}

impl IpFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamily::Ipv4 => "ipv4",
            IpFamily::Ipv6 => "ipv6",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Simultaneous sample queries across all kinds
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_historical_interval")]
    pub historical_interval_seconds: u64,
    #[serde(default = "default_lookback_multiplier")]
    pub lookback_multiplier: u32,
    #[serde(default)]
    pub value_policy: SampleValuePolicy,
}

/// Which element of a returned value series becomes the emitted value.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleValuePolicy {
    #[default]
    First,
    Latest,
}

impl SampleValuePolicy {
    pub fn pick(&self, values: &[i64]) -> Option<i64> {
        match self {
            SampleValuePolicy::First => values.first().copied(),
            SampleValuePolicy::Latest => values.last().copied(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Deadline for one whole scrape (inline discovery included)
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_fixture")]
    pub simulator_fixture: String,
}

fn default_password() -> SecretString {
    SecretString::from(String::new())
}

fn default_timeout() -> u64 {
    20
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9237
}

fn default_telemetry_path() -> String {
    "/metrics".to_string()
}

fn default_ip_families() -> Vec<IpFamily> {
    vec![IpFamily::Ipv4, IpFamily::Ipv6]
}

fn default_chunk_size() -> usize {
    256
}

fn default_concurrency() -> usize {
    4
}

fn default_historical_interval() -> u64 {
    300
}

fn default_lookback_multiplier() -> u32 {
    3
}

fn default_prefix() -> String {
    "vsphere".to_string()
}

fn default_scrape_timeout() -> u64 {
    60
}

fn default_fixture() -> String {
    "config/simulator.json".to_string()
}

fn default_true() -> bool {
    true
}

impl KindConfig {
    pub fn aggregate() -> Self {
        Self {
            enabled: true,
            instances: false,
        }
    }

    pub fn per_instance() -> Self {
        Self {
            enabled: true,
            instances: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 0,
            ip_addresses: default_ip_families(),
            resources: ResourcesConfig::default(),
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            datacenter: KindConfig::aggregate(),
            cluster: KindConfig::aggregate(),
            host: KindConfig::per_instance(),
            vm: KindConfig::per_instance(),
            datastore: KindConfig::aggregate(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrency: default_concurrency(),
            historical_interval_seconds: default_historical_interval(),
            lookback_multiplier: default_lookback_multiplier(),
            value_policy: SampleValuePolicy::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            scrape_timeout_seconds: default_scrape_timeout(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            simulator_fixture: default_fixture(),
        }
    }
}

impl VSphereConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl SamplingConfig {
    pub fn historical_interval(&self) -> Duration {
        Duration::from_secs(self.historical_interval_seconds)
    }
}

impl MetricsConfig {
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_seconds)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VSPHERE_EXPORTER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler and session layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.vsphere.timeout_seconds == 0 {
            anyhow::bail!("vsphere.timeout_seconds must be greater than zero");
        }
        if self.sampling.chunk_size == 0 {
            anyhow::bail!("sampling.chunk_size must be greater than zero");
        }
        if self.sampling.concurrency == 0 {
            anyhow::bail!("sampling.concurrency must be greater than zero");
        }
        if self.sampling.lookback_multiplier == 0 {
            anyhow::bail!("sampling.lookback_multiplier must be greater than zero");
        }
        if !self.server.telemetry_path.starts_with('/') {
            anyhow::bail!("server.telemetry_path must start with '/'");
        }
        if matches!(self.server.telemetry_path.as_str(), "/" | "/health") {
            anyhow::bail!(
                "server.telemetry_path must not be {}",
                self.server.telemetry_path
            );
        }
        Ok(())
    }
}
