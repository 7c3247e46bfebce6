//! REST API and WebSocket server for the control plane
//!
//! Thin transport over [`ControlPlane`](crate::control::ControlPlane): handlers
//! validate and serialize, nothing more.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Aggregate system health
//! - `GET /api/metrics` - Latest cached metrics per node
//! - `GET /api/metrics/summary` - Fleet averages and network totals
//! - `GET /api/nodes` - Per-node health
//! - `GET /api/alerts` - Active alerts (`?severity=`, `?node=`)
//! - `GET /api/alerts/stats` - Alert counters
//! - `POST /api/alerts/{id}/acknowledge` - Acknowledge an alert
//! - `POST /api/alerts/{id}/resolve` - Resolve an alert
//! - `GET /api/forecasts` - Latest forecasts
//! - `GET /api/forecasts/summary` - Per-metric forecast statistics
//! - `GET /api/anomalies` - Anomalies reported by the forecaster
//! - `GET /api/model-performance` - Forecast model accuracy
//! - `POST /api/scale` - Manual scaling request
//! - `GET /api/scaling/history` - Recent scaling actions
//! - `GET /api/scaling/actions/{id}` - One scaling action
//! - `GET /api/scaling/stats` - Scaling counters
//! - `WS /api/stream` - Live events, starting with `initialData`

pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::info;

use crate::config::ApiSettings;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:3000")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig::from(&ApiSettings::default())
    }
}

impl From<&ApiSettings> for ApiConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            bind_addr: settings.bind,
            enable_cors: settings.enable_cors,
        }
    }
}

/// Build the router with every route attached to `state`.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::system_health))
        .route("/api/metrics", get(routes::nodes::all_metrics))
        .route("/api/metrics/summary", get(routes::nodes::metrics_summary))
        .route("/api/nodes", get(routes::nodes::node_status))
        .route("/api/alerts", get(routes::alerts::list_alerts))
        .route("/api/alerts/stats", get(routes::alerts::alert_stats))
        .route(
            "/api/alerts/:id/acknowledge",
            post(routes::alerts::acknowledge_alert),
        )
        .route("/api/alerts/:id/resolve", post(routes::alerts::resolve_alert))
        .route("/api/forecasts", get(routes::forecasts::get_forecasts))
        .route(
            "/api/forecasts/summary",
            get(routes::forecasts::forecast_summary),
        )
        .route("/api/anomalies", get(routes::forecasts::get_anomalies))
        .route(
            "/api/model-performance",
            get(routes::forecasts::model_performance),
        )
        .route("/api/scale", post(routes::scaling::scale_node))
        .route("/api/scaling/history", get(routes::scaling::scaling_history))
        .route(
            "/api/scaling/actions/:id",
            get(routes::scaling::get_scaling_action),
        )
        .route("/api/scaling/stats", get(routes::scaling::scaling_stats))
        .route("/api/stream", get(websocket::websocket_handler))
        .with_state(state)
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
