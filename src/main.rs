use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vsphere_exporter::{config::Config, server, vsphere::Simulator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// vCenter SDK URL (overrides config)
    #[arg(long, env = "VSPHERE_URL")]
    vsphere_url: Option<String>,

    /// vCenter user name (overrides config)
    #[arg(long, env = "VSPHERE_USERNAME")]
    username: Option<String>,

    /// vCenter password (overrides config)
    #[arg(long, env = "VSPHERE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Port to listen on for metrics
    #[arg(short, long, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(short, long, env = "EXPORTER_ADDR")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting vSphere Prometheus Exporter v{}",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;

    if let Some(url) = args.vsphere_url {
        config.vsphere.url = url;
    }
    if let Some(username) = args.username {
        config.vsphere.username = username;
    }
    if let Some(password) = args.password {
        config.vsphere.password = secrecy::SecretString::new(password.into());
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    info!("Configuration loaded successfully");
    info!("vCenter: {}", config.vsphere.url);
    info!(
        "Simulator inventory: {}",
        config.backend.simulator_fixture
    );

    let backend = Simulator::from_file(&config.backend.simulator_fixture)?;

    if let Err(e) = server::start(config, Arc::new(backend)).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
