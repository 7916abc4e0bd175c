//! HTTP Server
//!
//! Axum-based server exposing the exporter over HTTP.
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page with links to metrics and health
//! - `GET <telemetry_path>` - runs one scrape and returns Prometheus text
//! - `GET /health` - 200 if the last scrape reached vCenter, 503 otherwise
//!
//! # Scrapes
//!
//! Every request to the telemetry path drives one collection under a
//! deadline of `metrics.scrape_timeout_seconds`. Chunk failures and
//! discovery errors are logged but never fail the response; the body always
//! carries the self-metrics plus whatever was sampled.

use crate::collectors::CollectionStatus;
use crate::config::Config;
use crate::context::CallContext;
use crate::exporter::VSphereExporter;
use crate::metrics::MetricsCollector;
use crate::vsphere::Backend;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct AppState {
    exporter: Arc<VSphereExporter>,
    telemetry_path: String,
    scrape_timeout: Duration,
}

impl AppState {
    pub fn new(config: &Config, exporter: Arc<VSphereExporter>) -> Self {
        Self {
            exporter,
            telemetry_path: config.server.telemetry_path.clone(),
            scrape_timeout: config.metrics.scrape_timeout(),
        }
    }

    pub fn exporter(&self) -> &Arc<VSphereExporter> {
        &self.exporter
    }
}

/// Build the router for a prepared state.
pub fn router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    Router::new()
        .route("/", get(root_handler))
        .route(&telemetry_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn start(config: Config, backend: Arc<dyn Backend>) -> anyhow::Result<()> {
    let metrics = MetricsCollector::new()?;
    let exporter = Arc::new(VSphereExporter::new(&config, backend, metrics));

    let shutdown = CancellationToken::new();
    let discovery = exporter.spawn_discovery(shutdown.clone());

    let app = router(AppState::new(&config, exporter));

    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Metrics server listening on {}", addr);
    info!(
        "Metrics available at http://{}{}",
        addr, config.server.telemetry_path
    );

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = discovery {
        if let Err(e) = handle.await {
            error!("Discovery task ended abnormally: {}", e);
        }
    }

    Ok(())
}

async fn root_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>vSphere Exporter</title></head>
<body>
<h1>vSphere Prometheus Exporter</h1>
<p><a href="{}">Metrics</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#,
        state.telemetry_path
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let ctx = CallContext::with_timeout(state.scrape_timeout);

    let outcome = state.exporter.collect(&ctx).await;
    let metrics = state.exporter.metrics();

    match outcome.status {
        CollectionStatus::Success => metrics.up.set(1.0),
        CollectionStatus::Failed => metrics.up.set(0.0),
    }
    metrics
        .scrape_duration_seconds
        .set(started.elapsed().as_secs_f64());

    debug!(
        "Scrape produced {} samples from {} kinds",
        outcome.samples.len(),
        outcome.sampled_kinds.len()
    );

    match metrics.render_with(&outcome.samples) {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.exporter.metrics().up.get() > 0.0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "vCenter unreachable")
    }
}
