//! HTTP/JSON exporter for tunnel telemetry.
//!
//! Read-only view over a shared [`TelemetryStore`]; the collector runs
//! elsewhere and this server never writes.
//!
//! Routes:
//! 1. `GET /` API index
//! 2. `GET /metrics` current snapshots plus history (`?limit=N` trims history)
//! 3. `GET /health` `starting`, `ok` or `degraded`
//! 4. `GET /endpoints/{endpoint}` one endpoint's current snapshot, classified

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use tunnelwatch_core::{
    EndpointId, MetricId, Reading, Snapshot, StoreView, TelemetryStore, ThresholdTable,
    classify_snapshot,
};

/// Shared server state.
pub struct AppState {
    store: Arc<TelemetryStore>,
    thresholds: ThresholdTable,
    endpoints: Vec<EndpointId>,
    started: Instant,
}

impl AppState {
    /// `endpoints` is the configured set; `/health` reports on all of them
    /// even before they first publish.
    pub fn new(
        store: Arc<TelemetryStore>,
        thresholds: ThresholdTable,
        endpoints: Vec<EndpointId>,
    ) -> Self {
        Self {
            store,
            thresholds,
            endpoints,
            started: Instant::now(),
        }
    }
}

#[derive(Deserialize)]
struct MetricsParams {
    /// Keep only the newest `limit` history entries.
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cycles: u64,
    uptime_secs: f64,
    endpoints: Vec<EndpointHealth>,
}

#[derive(Serialize)]
struct EndpointHealth {
    name: EndpointId,
    collected: bool,
    stale: Vec<MetricId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_update: Option<f64>,
}

trait JsonWithStatus<T> {
    fn with_status(self, status: StatusCode) -> (StatusCode, Json<T>);
}

impl<T> JsonWithStatus<T> for Json<T> {
    fn with_status(self, status: StatusCode) -> (StatusCode, Json<T>) {
        (status, self)
    }
}

async fn handle_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricsParams>,
) -> Json<StoreView> {
    let mut view = state.store.view();
    if let Some(limit) = params.limit
        && view.history.len() > limit
    {
        view.history.drain(..view.history.len() - limit);
    }
    Json(view)
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let view = state.store.view();
    let endpoints: Vec<EndpointHealth> = state
        .endpoints
        .iter()
        .map(|id| match view.current.get(id) {
            Some(snap) => EndpointHealth {
                name: id.clone(),
                collected: true,
                stale: snap.stale_metrics().collect(),
                last_update: Some(snap.timestamp()),
            },
            None => EndpointHealth {
                name: id.clone(),
                collected: false,
                stale: Vec::new(),
                last_update: None,
            },
        })
        .collect();

    let status = if view.cycles == 0 {
        "starting"
    } else if endpoints.iter().all(|e| e.collected && e.stale.is_empty()) {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        cycles: view.cycles,
        uptime_secs: state.started.elapsed().as_secs_f64(),
        endpoints,
    })
}

fn describe(snapshot: &Snapshot, thresholds: &ThresholdTable) -> serde_json::Value {
    let metrics: serde_json::Map<String, serde_json::Value> = snapshot
        .values()
        .iter()
        .map(|(&metric, &value)| {
            let reading = classify_snapshot(snapshot, metric, thresholds);
            let entry = serde_json::json!({
                "value": value,
                "rate": snapshot.rate(metric),
                "unit": metric.unit(),
                "stale": matches!(reading, Reading::Stale),
                "severity": reading.severity(),
            });
            (metric.name().to_string(), entry)
        })
        .collect();

    serde_json::json!({
        "endpoint": snapshot.endpoint(),
        "timestamp": snapshot.timestamp(),
        "metrics": metrics,
    })
}

async fn handle_endpoint(
    State(state): State<Arc<AppState>>,
    Path(endpoint): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let id = EndpointId::new(&endpoint);
    match state.store.current(&id) {
        Some(snapshot) => (
            StatusCode::OK,
            Json(describe(&snapshot, &state.thresholds)),
        ),
        None => {
            let error = if state.endpoints.contains(&id) {
                format!("no data yet for endpoint '{endpoint}'")
            } else {
                format!("unknown endpoint '{endpoint}'. Use / to list endpoints.")
            };
            Json(serde_json::json!({ "error": error })).with_status(StatusCode::NOT_FOUND)
        }
    }
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let names: Vec<&str> = state.endpoints.iter().map(EndpointId::as_str).collect();

    Json(serde_json::json!({
        "name": "tunnelwatch",
        "version": tunnelwatch_core::VERSION,
        "monitored": names,
        "history_capacity": state.store.capacity(),
        "endpoints": {
            "/": "This API index",
            "/metrics": {
                "method": "GET",
                "description": "Current snapshot per endpoint and the shared history, oldest first",
                "params": {
                    "limit": "Only return the newest N history entries",
                }
            },
            "/health": "Collector status: starting, ok or degraded",
            "/endpoints/{endpoint}": format!("Classified current snapshot. Available: {}", names.join(", ")),
        },
    }))
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .route("/endpoints/{endpoint}", get(handle_endpoint))
        .with_state(Arc::new(state))
}

/// Serve until `cancel` fires.
pub async fn run_server(
    state: AppState,
    host: &str,
    port: u16,
    cancel: CancellationToken,
) -> io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("HTTP exporter listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
