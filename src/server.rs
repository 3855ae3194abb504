//! HTTP Server
//!
//! The front door Prometheus talks to. Every `/scrape` request builds a fresh
//! [`Exporter`] for the requested device, runs one scrape, and returns that
//! exporter's registry.
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page
//! - `GET /health` - liveness check
//! - `GET /scrape?target=&model=&credential_profile=&components=&plugins=&proxy=` -
//!   Prometheus metrics for one device
//! - `GET /ignored` - devices currently circuit-broken, as JSON
//! - `POST /ignored/remove?host=` - clear an entry
//! - `POST /ignored/test?host=` - re-test an entry with fresh credentials; clears it on success
//!
//! # Error Handling
//!
//! A bad device never produces a 5xx. When the exporter cannot be built, or the
//! scrape exceeds its deadline, the response carries only `<scope>_up 0`.
//! The deadline comes from `X-Prometheus-Scrape-Timeout-Seconds`, falling back to
//! `server.scrape_timeout_seconds`; dropping the scrape future cancels any request
//! still in flight.

use crate::bmc::Target;
use crate::config::Config;
use crate::discovery::Components;
use crate::error::{ExporterError, Result};
use crate::exporter::{Exporter, ScrapeRequest, Services};
use crate::ignored::IgnoredDevice;
use crate::metrics::{MetricsCollector, Reliability};
use crate::profile::DeviceProfile;
use axum::{
    extract::{Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

const TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout-seconds";

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    services: Arc<Services>,
}

impl AppState {
    pub fn new(config: Config, services: Arc<Services>) -> Self {
        Self {
            config: Arc::new(config),
            services,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrapeParams {
    pub target: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_profile")]
    pub credential_profile: String,
    #[serde(default)]
    pub components: String,
    #[serde(default)]
    pub plugins: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_model() -> String {
    "generic".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
struct HostParams {
    host: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoveResponse {
    pub host: String,
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResponse {
    pub host: String,
    pub reachable: bool,
}

/// Router with every endpoint; the listener is attached by [`start`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/scrape", get(scrape_handler))
        .route("/ignored", get(list_ignored_handler))
        .route("/ignored/remove", post(remove_ignored_handler))
        .route("/ignored/test", post(test_ignored_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn start(
    config: Config,
    services: Arc<Services>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let app = router(AppState::new(config, services));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Exporter listening on {}", addr);
    info!("Scrape endpoint: http://{}/scrape?target=<host>&model=<model>", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ExporterError::Server(e.to_string()))?;

    info!("HTTP server stopped");
    Ok(())
}

async fn root_handler() -> impl IntoResponse {
    r#"<html>
<head><title>BMC Exporter</title></head>
<body>
<h1>BMC Prometheus Exporter</h1>
<p><a href="/scrape?target=127.0.0.1&amp;model=generic">Scrape</a></p>
<p><a href="/ignored">Ignored devices</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn scrape_timeout(headers: &HeaderMap, fallback_seconds: u64) -> Duration {
    headers
        .get(TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or_else(|| Duration::from_secs(fallback_seconds))
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn metrics_response(body: String) -> Response {
    ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response()
}

/// `<scope>_up 0` and nothing else.
fn down_response(model: &str) -> Response {
    let scope = DeviceProfile::for_model(model)
        .map(|p| p.scope)
        .unwrap_or("redfish");
    let rendered = MetricsCollector::new(scope)
        .map_err(anyhow::Error::from)
        .and_then(|metrics| {
            metrics.publish(&[], Reliability::Down);
            metrics.render()
        });
    match rendered {
        Ok(body) => metrics_response(body),
        Err(e) => {
            error!("Failed to render fallback metrics: {}", e);
            metrics_response(format!("{}_up 0\n", scope))
        }
    }
}

async fn run_scrape(params: &ScrapeParams, services: Arc<Services>) -> Result<String> {
    let target = Target::parse(&params.target, &params.model, &params.credential_profile)?;
    let request = ScrapeRequest {
        components: Components::parse(&params.components)?,
        plugins: split_list(&params.plugins),
        proxy: params.proxy.clone().filter(|p| !p.is_empty()),
    };

    let exporter = Exporter::new(target, &request, services).await?;
    exporter.scrape().await;
    exporter
        .render()
        .map_err(|e| ExporterError::Server(e.to_string()))
}

async fn scrape_handler(
    State(state): State<AppState>,
    Query(params): Query<ScrapeParams>,
    headers: HeaderMap,
) -> Response {
    let deadline = scrape_timeout(&headers, state.config.server.scrape_timeout_seconds);
    let span = info_span!(
        "scrape",
        trace_id = %Uuid::new_v4(),
        target = %params.target,
        model = %params.model
    );

    async {
        match tokio::time::timeout(deadline, run_scrape(&params, Arc::clone(&state.services))).await {
            Ok(Ok(body)) => metrics_response(body),
            Ok(Err(e)) => {
                warn!("Scrape of {} failed: {}", params.target, e);
                down_response(&params.model)
            }
            Err(_) => {
                warn!("Scrape of {} exceeded {:?}", params.target, deadline);
                down_response(&params.model)
            }
        }
    }
    .instrument(span)
    .await
}

async fn list_ignored_handler(State(state): State<AppState>) -> Json<Vec<IgnoredDevice>> {
    Json(state.services.ignored.list())
}

async fn remove_ignored_handler(
    State(state): State<AppState>,
    Query(params): Query<HostParams>,
) -> Json<RemoveResponse> {
    let removed = state.services.ignored.remove(&params.host).is_some();
    Json(RemoveResponse {
        host: params.host,
        removed,
    })
}

async fn test_ignored_handler(
    State(state): State<AppState>,
    Query(params): Query<HostParams>,
) -> Json<TestResponse> {
    let reachable = state
        .services
        .ignored
        .test_connection(&params.host, &state.services.credentials, &state.services.fetch)
        .await;
    Json(TestResponse {
        host: params.host,
        reachable,
    })
}
