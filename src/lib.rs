//! vSphere Prometheus Exporter
//!
//! Collects performance counters from a VMware vCenter and exposes them in
//! Prometheus format.
//!
//! # Overview
//!
//! The exporter keeps a cached inventory of datacenters, clusters, hosts,
//! powered-on virtual machines and datastores. On every scrape it asks
//! vCenter for the latest counter values of each resource kind, splitting
//! large inventories into chunks sampled in parallel under a global
//! concurrency bound.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    Backend trait     ┌─────────────────────────────┐
//! │   vCenter   │ ◄──────────────────► │  Endpoint                   │
//! │ (or sim)    │                      │  ├─ SessionManager          │
//! └─────────────┘                      │  ├─ MetricCatalog           │      HTTP      ┌────────────┐
//!                                      │  └─ inventory generations   │ ◄────────────► │ Prometheus │
//!                                      │  InventoryDiscoverer        │   /metrics     └────────────┘
//!                                      │  SamplingScheduler          │
//!                                      └─────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`vsphere`] - back end abstraction, session, catalog, inventory and discovery
//! - [`collectors`] - gating and chunked parallel sampling
//! - [`exporter`] - the two entry points, inventory refresh and collection
//! - [`metrics`] - Prometheus metric definitions and rendering
//! - [`server`] - HTTP server
//! - [`context`] - cancellation and deadlines for remote calls
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vsphere_exporter::{config::Config, server, vsphere::Simulator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     let backend = Simulator::from_file(&config.backend.simulator_fixture)?;
//!     server::start(config, Arc::new(backend)).await?;
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod context;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod server;
pub mod vsphere;
